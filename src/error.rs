use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the scanner, the snapshot store and startup.
///
/// Per-file stat failures during a scan are not represented here: they are
/// tallied and skipped, never propagated.
#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot read scan root {}: {source}", path.display())]
    ScanRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot store error: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("snapshot encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("unknown timeframe '{0}', expected one of: day, week, month, year")]
    InvalidTimeframe(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for errors caused by the caller's input rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::InvalidTimeframe(_))
    }
}
