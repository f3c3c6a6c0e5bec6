//! Serial day-count timestamp utilities
//!
//! The "last played" column of musiclib.dsv stores a fractional
//! day-since-epoch serial (day 0 = 1899-12-30), the format the external
//! accounting scripts write. Conversion to wall-clock time is the linear
//! formula `unix_seconds = (serial - 25569) * 86400`.

use chrono::{DateTime, TimeZone, Utc};

/// Days between the serial epoch (1899-12-30) and the Unix epoch (1970-01-01)
pub const SERIAL_UNIX_OFFSET_DAYS: f64 = 25569.0;

/// Seconds per serial day
pub const SECONDS_PER_DAY: f64 = 86400.0;

/// Convert a serial day-count to a UTC timestamp
///
/// Returns None for non-positive serials, which mean "never played".
pub fn serial_to_datetime(serial: f64) -> Option<DateTime<Utc>> {
    if serial <= 0.0 || !serial.is_finite() {
        return None;
    }
    let unix_secs = ((serial - SERIAL_UNIX_OFFSET_DAYS) * SECONDS_PER_DAY) as i64;
    Utc.timestamp_opt(unix_secs, 0).single()
}

/// Convert a UTC timestamp back to a serial day-count
pub fn datetime_to_serial(dt: DateTime<Utc>) -> f64 {
    dt.timestamp() as f64 / SECONDS_PER_DAY + SERIAL_UNIX_OFFSET_DAYS
}
