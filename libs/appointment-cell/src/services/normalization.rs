use std::sync::LazyLock;

use chrono::NaiveTime;
use regex::Regex;

use doctor_cell::models::SlotLabel;

use crate::models::AppointmentError;

static HOUR_MINUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2}:\d{2}$").expect("valid HH:MM pattern"));

static HOUR_MINUTE_SECOND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2}:\d{2}:\d{2}$").expect("valid HH:MM:SS pattern"));

/// Start time a requested slot is stored and counted under.
///
/// For a range the trimmed text before the first `-` is used; a bare time
/// is taken as written. `HH:MM` gains `:00`; anything that is not then
/// exactly `HH:MM:SS` and a real clock time is rejected.
pub fn normalize_time(label: &SlotLabel) -> Result<NaiveTime, AppointmentError> {
    let start = label.start();
    let invalid = || AppointmentError::InvalidTimeFormat(label.to_string());

    let canonical = if HOUR_MINUTE.is_match(start) {
        format!("{}:00", start)
    } else {
        start.to_string()
    };

    if !HOUR_MINUTE_SECOND.is_match(&canonical) {
        return Err(invalid());
    }

    NaiveTime::parse_from_str(&canonical, "%H:%M:%S").map_err(|_| invalid())
}

/// `HH:MM:SS` text of a normalized time, as persisted.
pub fn format_time(time: NaiveTime) -> String {
    time.format("%H:%M:%S").to_string()
}
