use std::time::Duration;

const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

/// Formats a byte count with binary multiples, e.g. `1.5 MB`.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

/// Signed variant for deltas: `+1.0 KB`, `-300 B`.
pub fn format_delta(delta: i64) -> String {
    let sign = if delta < 0 { "-" } else { "+" };
    format!("{sign}{}", format_bytes(delta.unsigned_abs()))
}

/// Drops the sub-millisecond part, for readable humantime output.
pub fn whole_millis(d: Duration) -> Duration {
    Duration::from_millis(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_values_stay_in_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
    }

    #[test]
    fn larger_values_scale() {
        assert_eq!(format_bytes(1024), "1.0 KB");
        assert_eq!(format_bytes(1536 * 1024), "1.5 MB");
        assert_eq!(format_bytes(u64::MAX), "16384.0 PB");
    }

    #[test]
    fn deltas_carry_sign() {
        assert_eq!(format_delta(2048), "+2.0 KB");
        assert_eq!(format_delta(-300), "-300 B");
    }

    #[test]
    fn whole_millis_drops_sub_millisecond_part() {
        assert_eq!(whole_millis(Duration::from_micros(1_500)), Duration::from_millis(1));
        assert_eq!(
            whole_millis(Duration::MAX),
            Duration::from_millis(u64::MAX),
            "out of range durations saturate instead of wrapping"
        );
    }
}
