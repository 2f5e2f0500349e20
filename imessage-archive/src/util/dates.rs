/*!
 Contains date conversion helpers for Apple's epoch.
*/

use chrono::{DateTime, SecondsFormat};

/// Seconds between the Unix epoch and the Apple epoch, `2001-01-01T00:00:00Z`
pub const APPLE_EPOCH_OFFSET: f64 = 978_307_200.0;

/// Render seconds since the Unix epoch as an RFC 3339 UTC timestamp
///
/// Returns [`None`] if the value is not finite or is outside the range `chrono` can represent.
///
/// # Example:
///
/// ```
/// use imessage_archive::util::dates::{format_unix_seconds, APPLE_EPOCH_OFFSET};
///
/// assert_eq!(
///     format_unix_seconds(APPLE_EPOCH_OFFSET).as_deref(),
///     Some("2001-01-01T00:00:00Z")
/// );
/// ```
pub fn format_unix_seconds(seconds: f64) -> Option<String> {
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9).round().min(999_999_999.0) as u32;
    if whole < i64::MIN as f64 || whole > i64::MAX as f64 {
        return None;
    }
    DateTime::from_timestamp(whole as i64, nanos)
        .map(|date| date.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}
