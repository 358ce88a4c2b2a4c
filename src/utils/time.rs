//! Time parsing and formatting utilities

use std::time::Duration;

/// Format milliseconds as an SRT timestamp `HH:MM:SS,mmm`
pub fn format_srt_time(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1000;
    let millis = ms % 1000;
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
}

/// Format a duration as `HH:MM:SS`, rounding down to whole seconds
pub fn format_clock(duration: Duration) -> String {
    let total = duration.as_secs();
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

/// Parse an ffmpeg `HH:MM:SS.micro` timestamp into seconds.
///
/// Returns `None` for `N/A` and anything else that is not three colon-separated numbers.
pub fn parse_clock(time_str: &str) -> Option<f64> {
    let time_str = time_str.trim();
    let negative = time_str.starts_with('-');
    let parts: Vec<&str> = time_str.trim_start_matches('-').split(':').collect();
    if parts.len() != 3 {
        return None;
    }

    let hours: f64 = parts[0].parse().ok()?;
    let minutes: f64 = parts[1].parse().ok()?;
    let seconds: f64 = parts[2].parse().ok()?;

    let total = hours * 3600.0 + minutes * 60.0 + seconds;
    Some(if negative { -total } else { total })
}

/// Convert fractional seconds to whole milliseconds, rounding to nearest
pub fn seconds_to_ms(seconds: f64) -> u64 {
    if seconds.is_finite() && seconds > 0.0 {
        (seconds * 1000.0).round() as u64
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_srt_time() {
        assert_eq!(format_srt_time(0), "00:00:00,000");
        assert_eq!(format_srt_time(1000), "00:00:01,000");
        assert_eq!(format_srt_time(3_723_456), "01:02:03,456");
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(Duration::from_secs(0)), "00:00:00");
        assert_eq!(format_clock(Duration::from_millis(3_725_900)), "01:02:05");
    }

    #[test]
    fn test_parse_clock() {
        assert_eq!(parse_clock("00:01:02.500000"), Some(62.5));
        assert_eq!(parse_clock("01:00:00"), Some(3600.0));
        assert_eq!(parse_clock("N/A"), None);
        assert_eq!(parse_clock("12.5"), None);
    }

    #[test]
    fn test_seconds_to_ms() {
        assert_eq!(seconds_to_ms(1.0), 1000);
        assert_eq!(seconds_to_ms(0.0015), 2);
        assert_eq!(seconds_to_ms(-3.0), 0);
        assert_eq!(seconds_to_ms(f64::NAN), 0);
    }
}
