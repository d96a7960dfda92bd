//! JSON output for snapshots, listings and diffs.
//!
//! Same shape as the http api so output can be piped into the same tooling.

use serde::Serialize;

pub fn render<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("{{\"error\": \"json encode error: {e}\"}}"))
}
