//! Read-time display transforms for track fields
//!
//! Nothing here is stored back into the record set; the raw field text is
//! the source of truth and these functions are applied on every read.
//! Numeric-parse failures are the zero/absent case, never an error - the
//! database is mutated by external tooling we don't control.

use crate::time::serial_to_datetime;

/// Shown for tracks whose last-played serial is absent or non-positive
pub const NEVER_PLAYED: &str = "never played";

/// Convert a milliseconds field to `m:ss` display (`125000` -> `2:05`)
///
/// Non-numeric or non-positive input is returned unchanged.
pub fn format_duration(ms: &str) -> String {
    let total: i64 = match ms.trim().parse() {
        Ok(v) => v,
        Err(_) => return ms.to_string(),
    };
    if total <= 0 {
        return ms.to_string();
    }
    let secs = total / 1000;
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// Convert a serial day-count field to a short calendar date (`%m/%d/%y`)
///
/// Serials carry no timezone, so the date is rendered in UTC to keep the
/// display deterministic. Non-positive or unparsable serials display as
/// [`NEVER_PLAYED`].
pub fn format_last_played(serial: &str) -> String {
    let serial: f64 = match serial.trim().parse() {
        Ok(v) => v,
        Err(_) => return NEVER_PLAYED.to_string(),
    };
    match serial_to_datetime(serial) {
        Some(dt) => dt.format("%m/%d/%y").to_string(),
        None => NEVER_PLAYED.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_two_minutes_five_seconds() {
        assert_eq!(format_duration("125000"), "2:05");
    }

    #[test]
    fn test_duration_seconds_zero_padded() {
        assert_eq!(format_duration("60000"), "1:00");
        assert_eq!(format_duration("61000"), "1:01");
    }

    #[test]
    fn test_duration_under_a_minute() {
        assert_eq!(format_duration("45000"), "0:45");
    }

    #[test]
    fn test_duration_zero_and_negative_unchanged() {
        assert_eq!(format_duration("0"), "0");
        assert_eq!(format_duration("-500"), "-500");
    }

    #[test]
    fn test_duration_non_numeric_unchanged() {
        assert_eq!(format_duration("n/a"), "n/a");
        assert_eq!(format_duration(""), "");
    }

    #[test]
    fn test_last_played_valid_serial() {
        // 45000.5 serial days = 2023-03-15 12:00:00 UTC
        assert_eq!(format_last_played("45000.5"), "03/15/23");
    }

    #[test]
    fn test_last_played_unix_epoch() {
        assert_eq!(format_last_played("25569"), "01/01/70");
    }

    #[test]
    fn test_last_played_never() {
        assert_eq!(format_last_played("0"), NEVER_PLAYED);
        assert_eq!(format_last_played("-1.25"), NEVER_PLAYED);
        assert_eq!(format_last_played("soon"), NEVER_PLAYED);
        assert_eq!(format_last_played(""), NEVER_PLAYED);
    }
}
