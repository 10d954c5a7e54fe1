//! Human-readable time formatting for lesson progress labels
//!
//! Produces the `MM:SS` strings shown next to each lesson's scrub control.

/// Seconds per minute
const SECS_PER_MIN: u64 = 60;

/// Format seconds as `MM:SS`.
///
/// Both fields are zero-padded to two digits. Minutes do not wrap at an hour,
/// so a 75 minute lesson reads `75:00`. Fractional seconds are floored.
/// NaN, negative and infinite input map to `"00:00"`.
///
/// # Examples
///
/// ```
/// use rdl_common::human_time::format_time;
///
/// assert_eq!(format_time(65.0), "01:05");
/// assert_eq!(format_time(599.9), "09:59");
/// assert_eq!(format_time(f64::NAN), "00:00");
/// ```
pub fn format_time(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "00:00".to_string();
    }

    let whole = seconds.floor() as u64;
    let minutes = whole / SECS_PER_MIN;
    let secs = whole % SECS_PER_MIN;
    format!("{:02}:{:02}", minutes, secs)
}
