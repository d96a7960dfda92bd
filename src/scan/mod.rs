//! Directory walker that aggregates one snapshot per run.
//!
//! The root must be listable; everything below it is best effort. Files whose
//! size cannot be read still count as items of their folder, and directories
//! that cannot be listed are skipped.

pub mod tally;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::snapshot::{now_millis, Snapshot};
use crate::util::whole_millis;
use tally::Tally;

/// Snapshot plus the bookkeeping of the walk that produced it.
#[derive(Debug)]
pub struct ScanOutcome {
    pub snapshot: Snapshot,
    pub files_seen: u64,
    pub unreadable_files: u64,
    pub skipped_dirs: u64,
    pub duration: Duration,
}

impl From<Snapshot> for ScanOutcome {
    /// An outcome with no walk bookkeeping, for snapshots built elsewhere.
    fn from(snapshot: Snapshot) -> Self {
        let files_seen = snapshot.folders.iter().map(|f| f.item_count).sum();
        ScanOutcome {
            snapshot,
            files_seen,
            unreadable_files: 0,
            skipped_dirs: 0,
            duration: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    follow_symlinks: bool,
    max_depth: Option<usize>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config) -> Self {
        Aggregator {
            follow_symlinks: config.follow_symlinks,
            max_depth: config.max_depth,
        }
    }

    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    pub fn max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn scan(&self, root: &Path) -> Result<Snapshot> {
        self.scan_with_stats(root).map(|outcome| outcome.snapshot)
    }

    pub fn scan_with_stats(&self, root: &Path) -> Result<ScanOutcome> {
        // all entries of one snapshot share the scan start time
        let timestamp = now_millis();
        let start = Instant::now();

        fs::read_dir(root).map_err(|source| Error::ScanRoot {
            path: root.to_path_buf(),
            source,
        })?;

        let mut tally = Tally::new();
        let mut walker = WalkDir::new(root).follow_links(self.follow_symlinks);
        if let Some(depth) = self.max_depth {
            walker = walker.max_depth(depth);
        }

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    record_walk_error(root, &e, &mut tally);
                    continue;
                }
            };

            if entry.depth() == 0 || entry.file_type().is_dir() {
                continue;
            }

            let folder = folder_key(root, entry.path());
            match probe(&entry) {
                Probe::Directory => {}
                Probe::Size(size) => tally.add_file(&folder, entry.file_name(), Some(size)),
                Probe::Unreadable(e) => {
                    debug!(path = %entry.path().display(), error = %e, "size unavailable, counting item only");
                    tally.add_file(&folder, entry.file_name(), None);
                }
            }
        }

        let duration = start.elapsed();
        info!(
            root = %root.display(),
            total_size = tally.total_size(),
            files = tally.files_seen,
            unreadable_files = tally.unreadable_files,
            skipped_dirs = tally.skipped_dirs,
            elapsed = %humantime::format_duration(whole_millis(duration)),
            "scan complete"
        );

        let files_seen = tally.files_seen;
        let unreadable_files = tally.unreadable_files;
        let skipped_dirs = tally.skipped_dirs;

        Ok(ScanOutcome {
            snapshot: tally.into_snapshot(timestamp),
            files_seen,
            unreadable_files,
            skipped_dirs,
            duration,
        })
    }
}

fn record_walk_error(root: &Path, e: &walkdir::Error, tally: &mut Tally) {
    if let Some(ancestor) = e.loop_ancestor() {
        warn!(
            path = %e.path().map(|p| p.display().to_string()).unwrap_or_default(),
            ancestor = %ancestor.display(),
            "symlink loop, not descending"
        );
        tally.skipped_dirs += 1;
        return;
    }

    // when following links a dangling one surfaces as a walk error, but it
    // is still a listed file of its folder
    if let Some(path) = e.path() {
        let is_link = fs::symlink_metadata(path)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);
        if is_link && e.depth() > 0 && fs::metadata(path).is_err() {
            if let Some(name) = path.file_name() {
                debug!(path = %path.display(), "dangling symlink, counting item only");
                tally.add_file(&folder_key(root, path), name, None);
                return;
            }
        }
    }

    warn!(
        path = %e.path().map(|p| p.display().to_string()).unwrap_or_default(),
        error = %e,
        "skipping unreadable directory"
    );
    tally.skipped_dirs += 1;
}

enum Probe {
    /// A symlink resolving to a directory that the walker does not descend into.
    Directory,
    Size(u64),
    Unreadable(io::Error),
}

fn probe(entry: &DirEntry) -> Probe {
    // sizes follow symlinks; walkdir only does so itself in follow mode
    let metadata = if entry.path_is_symlink() {
        fs::metadata(entry.path())
    } else {
        entry.metadata().map_err(io::Error::from)
    };

    match metadata {
        Ok(m) if m.is_dir() => Probe::Directory,
        Ok(m) => Probe::Size(m.len()),
        Err(e) => Probe::Unreadable(e),
    }
}

/// Relative path of the folder containing `file`, `"."` for the root.
/// Kept as a path so names that are not valid UTF-8 stay distinct.
fn folder_key(root: &Path, file: &Path) -> PathBuf {
    let parent = file.parent().unwrap_or(root);
    match parent.strip_prefix(root) {
        Ok(rel) if rel.as_os_str().is_empty() => PathBuf::from("."),
        Ok(rel) => rel.to_path_buf(),
        Err(_) => parent.to_path_buf(),
    }
}
