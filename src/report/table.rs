//! Terminal table rendering.
//!
//! - Snapshot: totals, file types by size, largest folders
//! - History and snapshot listings: one row per snapshot
//! - Diff: grouped by scope, grew/shrank/new/gone

use crate::snapshot::{Snapshot, SnapshotSummary};
use crate::store::diff::{DiffEntry, DiffResult, DiffScope, DiffType};
use crate::util::{format_bytes, format_delta};

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn render(snapshot: &Snapshot) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "snapshot taken {} UTC\ntotal size: {}\n",
        snapshot.timestamp.format(DATE_FORMAT),
        format_bytes(snapshot.total_size)
    ));

    if snapshot.file_types.is_empty() && snapshot.folders.is_empty() {
        output.push_str("\nNo files with content found.\n");
        return output;
    }

    output.push_str("\nFile types\n");
    output.push_str(&"-".repeat(40));
    output.push('\n');
    for (ext, size) in snapshot.file_types_by_size() {
        output.push_str(&format!("  {:28} {:>10}\n", truncate(ext, 28), format_bytes(size)));
    }

    output.push_str("\nFolders\n");
    output.push_str(&"-".repeat(52));
    output.push('\n');

    // largest first
    let mut folders: Vec<_> = snapshot.folders.iter().collect();
    folders.sort_by_key(|f| std::cmp::Reverse(f.size));

    for folder in folders {
        output.push_str(&format!(
            "  {:30} {:>10} {:>8}\n",
            truncate(&folder.relative_path, 30),
            format_bytes(folder.size),
            format!("{} items", folder.item_count)
        ));
    }

    output
}

pub fn render_history(snapshots: &[Snapshot]) -> String {
    if snapshots.is_empty() {
        return String::from("No snapshots in this timeframe.\n");
    }

    let mut output = format!("{:<20} {:>12} {:>8} {:>8}\n", "Date", "Total", "Types", "Folders");
    output.push_str(&"-".repeat(51));
    output.push('\n');

    for snapshot in snapshots {
        output.push_str(&format!(
            "{:<20} {:>12} {:>8} {:>8}\n",
            snapshot.timestamp.format(DATE_FORMAT),
            format_bytes(snapshot.total_size),
            snapshot.file_types.len(),
            snapshot.folders.len()
        ));
    }

    output
}

pub fn render_list(summaries: &[SnapshotSummary]) -> String {
    if summaries.is_empty() {
        return String::from("No snapshots found. Run 'storewatch scan' to create one.\n");
    }

    let mut output = format!("{:<6} {:<20} {:>12} {:>8} {:>8}\n", "ID", "Date", "Total", "Types", "Folders");
    output.push_str(&"-".repeat(58));
    output.push('\n');

    for summary in summaries {
        output.push_str(&format!(
            "{:<6} {:<20} {:>12} {:>8} {:>8}\n",
            summary.id,
            summary.timestamp.format(DATE_FORMAT),
            format_bytes(summary.total_size),
            summary.file_type_count,
            summary.folder_count
        ));
    }

    output
}

fn scope_label(scope: DiffScope) -> &'static str {
    match scope {
        DiffScope::FileType => "File types",
        DiffScope::Folder => "Folders",
    }
}

pub fn render_diff(result: &DiffResult) -> String {
    let mut output = format!(
        "\nComparing snapshots:\n  From: #{} ({})\n  To:   #{} ({})\n\n",
        result.from_id,
        result.from_timestamp.format(DATE_FORMAT),
        result.to_id,
        result.to_timestamp.format(DATE_FORMAT)
    );

    if result.entries.is_empty() {
        output.push_str("No changes detected.\n");
        return output;
    }

    for scope in [DiffScope::FileType, DiffScope::Folder] {
        let mut entries: Vec<&DiffEntry> = result.entries.iter().filter(|e| e.scope == scope).collect();
        if entries.is_empty() {
            continue;
        }

        // biggest movers first within each kind
        entries.sort_by_key(|e| std::cmp::Reverse(e.delta.unsigned_abs()));

        output.push_str(&format!("{}:\n", scope_label(scope)));
        for kind in [DiffType::Grew, DiffType::Shrank, DiffType::New, DiffType::Gone] {
            for entry in entries.iter().filter(|e| e.diff_type == kind) {
                output.push_str(&diff_line(entry));
            }
        }
        output.push('\n');
    }

    if result.net_change >= 0 {
        output.push_str(&format!("Net change: {} total\n", format_delta(result.net_change)));
    } else {
        output.push_str(&format!("Net change: {} freed\n", format_bytes(result.net_change.unsigned_abs())));
    }

    output
}

fn diff_line(entry: &DiffEntry) -> String {
    match entry.diff_type {
        DiffType::Grew => format!(
            "  [+] {} grew {} -> {} ({})\n",
            entry.name,
            format_bytes(entry.old_size),
            format_bytes(entry.new_size),
            format_delta(entry.delta)
        ),
        DiffType::Shrank => format!(
            "  [-] {} shrank {} -> {} ({})\n",
            entry.name,
            format_bytes(entry.old_size),
            format_bytes(entry.new_size),
            format_delta(entry.delta)
        ),
        DiffType::New => format!("  [new] {} appeared ({})\n", entry.name, format_bytes(entry.new_size)),
        DiffType::Gone => format!("  [gone] {} disappeared (was {})\n", entry.name, format_bytes(entry.old_size)),
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{truncated}...")
    }
}
