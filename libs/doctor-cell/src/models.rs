use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

// ==============================================================================
// SLOT LABELS
// ==============================================================================

/// A bookable window as the doctor wrote it: `09:00`, `09:00:00`,
/// `09:00-11:00` or `09:00:00-11:00:00`. Kept verbatim; interpretation
/// happens where capacity and start times are derived.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotLabel(String);

impl SlotLabel {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Start of the window: the trimmed text before the first `-` of a range,
    /// or a bare label exactly as written.
    pub fn start(&self) -> &str {
        match self.range_parts() {
            Some((start, _)) => start,
            None => &self.0,
        }
    }

    /// First two `-`-separated parts of a range label.
    pub fn range_parts(&self) -> Option<(&str, &str)> {
        let mut parts = self.0.split('-');
        match (parts.next(), parts.next()) {
            (Some(start), Some(end)) => Some((start.trim(), end.trim())),
            _ => None,
        }
    }
}

impl fmt::Display for SlotLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SlotLabel {
    fn from(raw: &str) -> Self {
        SlotLabel::new(raw)
    }
}

// ==============================================================================
// DOCTOR
// ==============================================================================

pub type DaySpecificAvailability = BTreeMap<String, Vec<SlotLabel>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub specialty: Option<String>,
    #[serde(default)]
    pub qualification: Option<String>,
    #[serde(default)]
    pub experience: Option<i32>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub consultation_fee: Option<f64>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default = "default_true")]
    pub is_available: bool,
    #[serde(default, deserialize_with = "json_column")]
    pub available_slots: Vec<SlotLabel>,
    #[serde(default, deserialize_with = "json_column")]
    pub available_days: Vec<String>,
    #[serde(default, deserialize_with = "json_column")]
    pub day_specific_availability: Option<DaySpecificAvailability>,
}

fn default_true() -> bool {
    true
}

/// Availability columns have been written both as JSON and as JSON-encoded
/// text. Either is accepted; unreadable text is treated as unset.
fn json_column<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Null => Ok(T::default()),
        Value::String(text) if text.trim().is_empty() => Ok(T::default()),
        Value::String(text) => Ok(serde_json::from_str(&text).unwrap_or_else(|e| {
            warn!("Ignoring unreadable availability column ({}): {}", e, text);
            T::default()
        })),
        other => serde_json::from_value(other).map_err(serde::de::Error::custom),
    }
}

impl Doctor {
    /// Day-specific availability counts only when it declares at least one day.
    pub fn has_day_specific_availability(&self) -> bool {
        self.day_specific_availability
            .as_ref()
            .map(|days| days.values().any(|slots| !slots.is_empty()))
            .unwrap_or(false)
    }

    /// Labels offered on `date`. Day-specific availability, when in use, is
    /// authoritative; otherwise the flat list applies on every declared day.
    pub fn slots_for_date(&self, date: NaiveDate) -> Vec<SlotLabel> {
        let day = weekday_name(date.weekday());

        if self.has_day_specific_availability() {
            return self
                .day_specific_availability
                .as_ref()
                .and_then(|days| days.get(day))
                .cloned()
                .unwrap_or_default();
        }

        let available_that_day = self
            .available_days
            .iter()
            .any(|declared| declared.trim().eq_ignore_ascii_case(day));

        if available_that_day {
            self.available_slots.clone()
        } else {
            Vec::new()
        }
    }
}

pub fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Canonical full weekday name for user input such as `monday` or `Mon`.
pub fn canonical_weekday(raw: &str) -> Option<&'static str> {
    raw.trim().parse::<Weekday>().ok().map(weekday_name)
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAvailabilityRequest {
    pub available_slots: Option<Vec<String>>,
    pub available_days: Option<Vec<String>>,
    pub day_specific_availability: Option<BTreeMap<String, Vec<String>>>,
    pub is_available: Option<bool>,
}

impl UpdateAvailabilityRequest {
    pub fn is_empty(&self) -> bool {
        self.available_slots.is_none()
            && self.available_days.is_none()
            && self.day_specific_availability.is_none()
            && self.is_available.is_none()
    }
}

/// Cleaned-up form of `UpdateAvailabilityRequest`, ready to persist.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AvailabilityUpdate {
    pub available_slots: Option<Vec<SlotLabel>>,
    pub available_days: Option<Vec<String>>,
    pub day_specific_availability: Option<DaySpecificAvailability>,
    pub is_available: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DoctorPath {
    pub doctor_id: i64,
}

/// `GET /doctors` filters. Blank text filters are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DoctorSearch {
    pub name: Option<String>,
    pub specialty: Option<String>,
    pub min_fee: Option<f64>,
    pub max_fee: Option<f64>,
}

impl DoctorSearch {
    pub fn name(&self) -> Option<&str> {
        non_blank(self.name.as_deref())
    }

    pub fn specialty(&self) -> Option<&str> {
        non_blank(self.specialty.as_deref())
    }

    pub fn validate(&self) -> Result<(), DoctorError> {
        for (field, fee) in [("min_fee", self.min_fee), ("max_fee", self.max_fee)] {
            if fee.is_some_and(|fee| !fee.is_finite() || fee < 0.0) {
                return Err(DoctorError::InvalidFilter {
                    message: format!("{} must be a non-negative number", field),
                    field: field.to_string(),
                });
            }
        }
        if let (Some(min), Some(max)) = (self.min_fee, self.max_fee) {
            if min > max {
                return Err(DoctorError::InvalidFilter {
                    message: "min_fee cannot exceed max_fee".to_string(),
                    field: "min_fee".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn matches(&self, doctor: &Doctor) -> bool {
        if let Some(name) = self.name() {
            if !doctor.name.to_lowercase().contains(&name.to_lowercase()) {
                return false;
            }
        }
        if let Some(specialty) = self.specialty() {
            if doctor.specialty.as_deref() != Some(specialty) {
                return false;
            }
        }

        let fee_bounded = self.min_fee.is_some() || self.max_fee.is_some();
        match doctor.consultation_fee {
            Some(fee) => {
                self.min_fee.map_or(true, |min| fee >= min) && self.max_fee.map_or(true, |max| fee <= max)
            }
            None => !fee_bounded,
        }
    }
}

fn non_blank(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|text| !text.is_empty())
}

/// Directory entry returned by the doctor search. Availability is served
/// by the per-doctor endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DoctorListing {
    pub id: i64,
    pub name: String,
    pub specialty: Option<String>,
    pub qualification: Option<String>,
    pub experience: Option<i32>,
    pub rating: Option<f64>,
    pub consultation_fee: Option<f64>,
    pub bio: Option<String>,
    pub is_available: bool,
}

impl From<Doctor> for DoctorListing {
    fn from(doctor: Doctor) -> Self {
        Self {
            id: doctor.id,
            name: doctor.name,
            specialty: doctor.specialty,
            qualification: doctor.qualification,
            experience: doctor.experience,
            rating: doctor.rating,
            consultation_fee: doctor.consultation_fee,
            bio: doctor.bio,
            is_available: doctor.is_available,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorSlotsResponse {
    pub doctor_id: i64,
    pub date: NaiveDate,
    pub weekday: String,
    pub slots: Vec<SlotLabel>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum DoctorError {
    #[error("Doctor not found")]
    NotFound,

    #[error("{message}")]
    Validation { message: String, fields: Vec<String> },

    #[error("{message}")]
    InvalidFilter { message: String, field: String },

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl DoctorError {
    pub fn validation(message: impl Into<String>, field: &str) -> Self {
        DoctorError::Validation {
            message: message.into(),
            fields: vec![field.to_string()],
        }
    }
}

impl From<DoctorError> for shared_models::error::AppError {
    fn from(error: DoctorError) -> Self {
        use shared_models::error::AppError;

        match error {
            DoctorError::NotFound => AppError::NotFound("Doctor not found".to_string()),
            DoctorError::Validation { message, fields } => AppError::ValidationError {
                reason: "invalid_availability".to_string(),
                message,
                fields,
            },
            DoctorError::InvalidFilter { message, field } => AppError::ValidationError {
                reason: "invalid_field".to_string(),
                message,
                fields: vec![field],
            },
            DoctorError::Unauthorized(msg) => AppError::Forbidden(msg),
            DoctorError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn legacy_doctor() -> Doctor {
        serde_json::from_value(json!({
            "id": 1,
            "name": "Dr. Legacy",
            "available_slots": "[\"09:00-11:00\", \"14:00-15:00\"]",
            "available_days": "[\"Monday\", \"Friday\"]",
            "day_specific_availability": null
        }))
        .unwrap()
    }

    #[test]
    fn test_slot_label_parts() {
        let range = SlotLabel::new("09:00 - 11:00");
        assert_eq!(range.start(), "09:00");
        assert_eq!(range.range_parts(), Some(("09:00", "11:00")));

        let bare = SlotLabel::new("09:30");
        assert_eq!(bare.start(), "09:30");
        assert_eq!(bare.range_parts(), None);

        // only range starts are trimmed
        assert_eq!(SlotLabel::new(" 09:30 ").start(), " 09:30 ");
    }

    #[test]
    fn test_legacy_availability_decoded_from_text_columns() {
        let doctor = legacy_doctor();
        assert!(doctor.is_available);
        assert_eq!(doctor.available_slots.len(), 2);

        // 2025-01-10 is a Friday, 2025-01-11 a Saturday
        assert_eq!(doctor.slots_for_date(date("2025-01-10")), vec![SlotLabel::new("09:00-11:00"), SlotLabel::new("14:00-15:00")]);
        assert!(doctor.slots_for_date(date("2025-01-11")).is_empty());
    }

    #[test]
    fn test_day_specific_availability_takes_precedence() {
        let mut doctor = legacy_doctor();
        let mut days = DaySpecificAvailability::new();
        days.insert("Saturday".to_string(), vec![SlotLabel::new("10:00-12:00")]);
        days.insert("Friday".to_string(), vec![]);
        doctor.day_specific_availability = Some(days);

        assert_eq!(doctor.slots_for_date(date("2025-01-11")), vec![SlotLabel::new("10:00-12:00")]);
        // Friday is declared empty in the day-specific map, the flat list no longer applies
        assert!(doctor.slots_for_date(date("2025-01-10")).is_empty());
    }

    #[test]
    fn test_empty_day_specific_map_falls_back_to_legacy() {
        let mut doctor = legacy_doctor();
        let mut days = DaySpecificAvailability::new();
        days.insert("Monday".to_string(), vec![]);
        doctor.day_specific_availability = Some(days);

        assert!(!doctor.has_day_specific_availability());
        assert_eq!(doctor.slots_for_date(date("2025-01-10")).len(), 2);
    }

    #[test]
    fn test_unreadable_column_is_treated_as_unset() {
        let doctor: Doctor = serde_json::from_value(json!({
            "id": 2,
            "name": "Dr. Broken",
            "available_slots": "not json",
            "is_available": false
        }))
        .unwrap();

        assert!(doctor.available_slots.is_empty());
        assert!(doctor.day_specific_availability.is_none());
        assert!(!doctor.is_available);
    }

    #[test]
    fn test_canonical_weekday() {
        assert_eq!(canonical_weekday("monday"), Some("Monday"));
        assert_eq!(canonical_weekday(" Sun "), Some("Sunday"));
        assert_eq!(canonical_weekday("Funday"), None);
    }

    #[test]
    fn test_search_filters() {
        let mut doctor = legacy_doctor();
        doctor.specialty = Some("Cardiology".to_string());
        doctor.consultation_fee = Some(500.0);

        let by_name = DoctorSearch { name: Some("legacy".to_string()), ..Default::default() };
        assert!(by_name.matches(&doctor));

        let wrong_specialty = DoctorSearch { specialty: Some("Dermatology".to_string()), ..Default::default() };
        assert!(!wrong_specialty.matches(&doctor));

        let fee_window = DoctorSearch { min_fee: Some(300.0), max_fee: Some(500.0), ..Default::default() };
        assert!(fee_window.matches(&doctor));

        let too_cheap = DoctorSearch { max_fee: Some(499.0), ..Default::default() };
        assert!(!too_cheap.matches(&doctor));

        // blank text filters are ignored
        let blank = DoctorSearch { name: Some("  ".to_string()), ..Default::default() };
        assert!(blank.matches(&doctor));
    }

    #[test]
    fn test_unpriced_doctors_drop_out_of_fee_searches() {
        let doctor = legacy_doctor();
        assert!(DoctorSearch::default().matches(&doctor));
        assert!(!DoctorSearch { min_fee: Some(0.0), ..Default::default() }.matches(&doctor));
    }

    #[test]
    fn test_search_validation() {
        assert!(DoctorSearch::default().validate().is_ok());
        assert!(matches!(
            DoctorSearch { min_fee: Some(600.0), max_fee: Some(500.0), ..Default::default() }.validate(),
            Err(DoctorError::InvalidFilter { ref field, .. }) if field == "min_fee"
        ));
        assert!(DoctorSearch { max_fee: Some(-1.0), ..Default::default() }.validate().is_err());
    }
}
