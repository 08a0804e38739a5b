//! Human-readable formatting for terminal output.

const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

/// `1536` -> `1.5 KB`. Bytes have no decimals.
pub fn format_size(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

/// `75.4` -> `1:15`, `3725.0` -> `1:02:05`.
pub fn format_duration(secs: f64) -> String {
    if !secs.is_finite() || secs < 0.0 {
        return "0:00".to_string();
    }
    let total = secs.floor() as u64;
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

/// `4200` -> `~5s left`, `125000` -> `~2m 5s left`.
pub fn format_remaining(ms: u64) -> String {
    let secs = ms.div_ceil(1000);
    if secs < 60 {
        format!("~{secs}s left")
    } else {
        format!("~{}m {}s left", secs / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(10 * 1024 * 1024), "10.0 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.0), "0:00");
        assert_eq!(format_duration(12.0), "0:12");
        assert_eq!(format_duration(75.4), "1:15");
        assert_eq!(format_duration(3725.0), "1:02:05");
        assert_eq!(format_duration(f64::NAN), "0:00");
    }

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(4200), "~5s left");
        assert_eq!(format_remaining(125_000), "~2m 5s left");
        assert_eq!(format_remaining(0), "~0s left");
    }
}
