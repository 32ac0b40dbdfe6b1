//! Recovery time normalization.
//!
//! pgBackRest wants a full timestamp with zone. Operators type dates or
//! times of day, so short forms are completed with the local offset.

use chrono::{DateTime, FixedOffset, Local};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

static DATE_ONLY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());
static TIME_ONLY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{2}:\d{2}:\d{2}$").unwrap());
static DATE_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}").unwrap());

/// Render a UTC offset in seconds as `+08`, `-05` or `+05:30`
pub fn format_tz_offset(offset_secs: i32) -> String {
    let sign = if offset_secs < 0 { '-' } else { '+' };
    let abs = offset_secs.unsigned_abs();
    let hours = abs / 3600;
    let minutes = (abs % 3600) / 60;
    if minutes == 0 {
        format!("{sign}{hours:02}")
    } else {
        format!("{sign}{hours:02}:{minutes:02}")
    }
}

/// Normalize against the local clock
pub fn normalize_time(input: &str) -> String {
    normalize_time_at(input, Local::now().fixed_offset())
}

/// Normalize against a given instant.
///
/// - `YYYY-MM-DD` becomes `YYYY-MM-DD 00:00:00<offset>`
/// - `HH:MM:SS` becomes `<today> HH:MM:SS<offset>`
/// - anything else is returned unchanged
///
/// Applying it twice gives the same result as applying it once.
pub fn normalize_time_at(input: &str, now: DateTime<FixedOffset>) -> String {
    let input = input.trim();
    let tz = format_tz_offset(now.offset().local_minus_utc());

    if DATE_ONLY.is_match(input) {
        return format!("{input} 00:00:00{tz}");
    }
    if TIME_ONLY.is_match(input) {
        return format!("{} {input}{tz}", now.format("%Y-%m-%d"));
    }
    if !DATE_TIME.is_match(input) {
        warn!("Unrecognized time format '{}', passing it to pgBackRest as-is", input);
    }
    input.to_string()
}
