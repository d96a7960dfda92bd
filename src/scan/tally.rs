//! Running totals for a single scan.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::snapshot::{FolderRecord, Snapshot};

#[derive(Debug, Default, Clone, Copy)]
struct FolderTally {
    size: u64,
    items: u64,
}

#[derive(Debug, Default)]
pub struct Tally {
    total_size: u64,
    file_types: BTreeMap<String, u64>,
    folders: BTreeMap<PathBuf, FolderTally>,
    pub files_seen: u64,
    pub unreadable_files: u64,
    pub skipped_dirs: u64,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one listed file. `size` is `None` when the file could not be
    /// stat'd: it still counts as an item of its folder but adds no bytes.
    pub fn add_file(&mut self, folder: &Path, file_name: &OsStr, size: Option<u64>) {
        self.files_seen += 1;

        let folder_tally = self.folders.entry(folder.to_path_buf()).or_default();
        folder_tally.items += 1;

        let Some(size) = size else {
            self.unreadable_files += 1;
            return;
        };

        folder_tally.size = folder_tally.size.saturating_add(size);
        self.total_size = self.total_size.saturating_add(size);

        if let Some(ext) = extension_of(&file_name.to_string_lossy()) {
            let entry = self.file_types.entry(ext).or_insert(0);
            *entry = entry.saturating_add(size);
        }
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Folders whose direct files add up to zero bytes are dropped here.
    /// Paths become strings only here, so distinct non-UTF-8 folders keep
    /// separate records.
    pub fn into_snapshot(self, timestamp: DateTime<Utc>) -> Snapshot {
        let mut folders: Vec<FolderRecord> = self
            .folders
            .into_iter()
            .filter(|(_, tally)| tally.size > 0)
            .map(|(path, tally)| FolderRecord {
                relative_path: path.to_string_lossy().into_owned(),
                size: tally.size,
                item_count: tally.items,
            })
            .collect();
        folders.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

        Snapshot {
            timestamp,
            total_size: self.total_size,
            file_types: self.file_types,
            folders,
        }
    }
}

/// Lowercased extension including the leading dot, taken from the last `.`
/// in the name. Leading dots belong to the stem, so `.bashrc` has none.
pub fn extension_of(file_name: &str) -> Option<String> {
    let stem_start = file_name.len() - file_name.trim_start_matches('.').len();
    let rest = &file_name[stem_start..];
    let dot = rest.rfind('.')?;
    Some(rest[dot..].to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::now_millis;

    #[test]
    fn extension_is_lowercased_with_dot() {
        assert_eq!(extension_of("report.PDF").as_deref(), Some(".pdf"));
        assert_eq!(extension_of("archive.tar.gz").as_deref(), Some(".gz"));
        assert_eq!(extension_of(".hidden.log").as_deref(), Some(".log"));
    }

    #[test]
    fn extensionless_names_have_no_extension() {
        assert_eq!(extension_of("Makefile"), None);
        assert_eq!(extension_of(".bashrc"), None);
        assert_eq!(extension_of("..."), None);
        assert_eq!(extension_of(""), None);
    }

    #[test]
    fn trailing_dot_is_its_own_extension() {
        assert_eq!(extension_of("notes.").as_deref(), Some("."));
    }

    #[test]
    fn unreadable_file_counts_as_item_only() {
        let mut tally = Tally::new();
        tally.add_file(Path::new("."), OsStr::new("a.txt"), Some(10));
        tally.add_file(Path::new("."), OsStr::new("gone.txt"), None);

        assert_eq!(tally.unreadable_files, 1);
        let snapshot = tally.into_snapshot(now_millis());
        assert_eq!(snapshot.total_size, 10);
        assert_eq!(snapshot.file_types.get(".txt"), Some(&10));
        assert_eq!(snapshot.folders.len(), 1);
        assert_eq!(snapshot.folders[0].item_count, 2);
        assert_eq!(snapshot.folders[0].size, 10);
    }

    #[test]
    fn zero_byte_folders_are_dropped() {
        let mut tally = Tally::new();
        tally.add_file(Path::new("empty-files"), OsStr::new("a.txt"), Some(0));
        tally.add_file(Path::new("empty-files"), OsStr::new("b"), Some(0));
        tally.add_file(Path::new("unreadable"), OsStr::new("c.bin"), None);
        tally.add_file(Path::new("data"), OsStr::new("d.bin"), Some(1));

        let snapshot = tally.into_snapshot(now_millis());
        let paths: Vec<&str> = snapshot.folders.iter().map(|f| f.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["data"]);
        // zero-byte files still register their extension
        assert_eq!(snapshot.file_types.get(".txt"), Some(&0));
    }

    #[test]
    fn sizes_saturate_instead_of_overflowing() {
        let mut tally = Tally::new();
        tally.add_file(Path::new("."), OsStr::new("a.img"), Some(u64::MAX));
        tally.add_file(Path::new("."), OsStr::new("b.img"), Some(10));
        assert_eq!(tally.total_size(), u64::MAX);
    }
}
