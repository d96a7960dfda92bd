//! Scheduled directory size scanner.
//!
//! A full walk of one root produces a [`snapshot::Snapshot`] (total size,
//! per-extension sizes, per-folder direct sizes). Snapshots are appended to
//! SQLite and served over HTTP as latest and time-windowed history.

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod report;
pub mod scan;
pub mod scheduler;
pub mod snapshot;
pub mod store;
pub mod util;

pub use error::{Error, Result};
