use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use doctor_cell::models::SlotLabel;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: i64,
    pub user_id: i64,
    pub doctor_id: i64,
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub symptoms: Option<String>,
    #[serde(default)]
    pub is_emergency: bool,
    #[serde(deserialize_with = "utc_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "optional_utc_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Timestamps arrive with an offset from `timestamptz` columns and without
/// one from legacy `timestamp` columns; the latter are read as UTC.
fn parse_utc_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(stamped) = DateTime::parse_from_rfc3339(raw) {
        return Ok(stamped.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| format!("invalid timestamp: {}", raw))
}

fn utc_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_utc_timestamp(&raw).map_err(serde::de::Error::custom)
}

fn optional_utc_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) => parse_utc_timestamp(&raw).map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

impl Appointment {
    pub fn slot_key(&self) -> SlotKey {
        SlotKey {
            doctor_id: self.doctor_id,
            appointment_date: self.appointment_date,
            appointment_time: self.appointment_time,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl AppointmentStatus {
    /// Pending and confirmed appointments occupy their slot.
    pub fn is_active(&self) -> bool {
        matches!(self, AppointmentStatus::Pending | AppointmentStatus::Confirmed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The occupancy key: one doctor, one day, one normalized start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey {
    pub doctor_id: i64,
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "doctor {} on {} at {}",
            self.doctor_id,
            self.appointment_date,
            self.appointment_time.format("%H:%M:%S")
        )
    }
}

/// A validated appointment that has not been written yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAppointment {
    pub user_id: i64,
    pub doctor_id: i64,
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
    pub status: AppointmentStatus,
    pub symptoms: Option<String>,
    pub is_emergency: bool,
}

impl NewAppointment {
    pub fn slot_key(&self) -> SlotKey {
        SlotKey {
            doctor_id: self.doctor_id,
            appointment_date: self.appointment_date,
            appointment_time: self.appointment_time,
        }
    }
}

/// How an insert is gated against the slot's occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Insert only while fewer than this many active appointments hold the slot.
    Capacity(u32),
    /// Insert unconditionally (emergency bookings).
    Bypass,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdmissionOutcome {
    /// `current_count` is the occupancy seen before the insert.
    Admitted { appointment: Appointment, current_count: u32 },
    SlotFull { current_count: u32 },
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

/// Fields stay optional so missing ones can be reported together. Any
/// `user_id` a client sends is dropped: the patient is always the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub doctor_id: Option<Value>,
    pub appointment_date: Option<String>,
    pub appointment_time: Option<String>,
    pub symptoms: Option<String>,
    pub is_emergency: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckAvailabilityRequest {
    pub doctor_id: Option<Value>,
    pub appointment_date: Option<String>,
    pub appointment_time: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppointmentPath {
    pub appointment_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppointmentListQuery {
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotDateQuery {
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AvailabilitySnapshot {
    pub is_available: bool,
    pub max_appointments: u32,
    pub current_count: u32,
    pub available_slots: u32,
    pub duration_hours: f64,
}

impl AvailabilitySnapshot {
    pub fn new(max_appointments: u32, current_count: u32, duration_hours: f64) -> Self {
        Self {
            is_available: current_count < max_appointments,
            max_appointments,
            current_count,
            available_slots: max_appointments.saturating_sub(current_count),
            duration_hours,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotOccupancy {
    pub slot: SlotLabel,
    pub appointment_time: NaiveTime,
    #[serde(flatten)]
    pub availability: AvailabilitySnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorSlotsOccupancy {
    pub doctor_id: i64,
    pub date: NaiveDate,
    pub slots: Vec<SlotOccupancy>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DoctorStats {
    pub total_appointments: u32,
    pub completed_appointments: u32,
    pub pending_appointments: u32,
    pub total_patients: u32,
    pub today_appointments: u32,
}

/// Result of a confirm call; `changed` is false for the idempotent case.
#[derive(Debug, Clone)]
pub struct ConfirmOutcome {
    pub appointment: Appointment,
    pub changed: bool,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum AppointmentError {
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("{message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid time format '{0}'. Use HH:MM, HH:MM:SS or HH:MM-HH:MM")]
    InvalidTimeFormat(String),

    #[error("Cannot book an appointment in the past")]
    InPast,

    #[error("Appointment not found")]
    NotFound,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Caller is not a registered patient")]
    NotAPatient,

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("This time slot is full ({current_count}/{max_appointments} booked)")]
    SlotFull { max_appointments: u32, current_count: u32 },

    #[error("{message}")]
    InvalidTransition { message: String, current_status: AppointmentStatus },

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl AppointmentError {
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        AppointmentError::InvalidField {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn invalid_transition(message: impl Into<String>, current_status: AppointmentStatus) -> Self {
        AppointmentError::InvalidTransition {
            message: message.into(),
            current_status,
        }
    }
}

impl From<doctor_cell::models::DoctorError> for AppointmentError {
    fn from(error: doctor_cell::models::DoctorError) -> Self {
        use doctor_cell::models::DoctorError;

        match error {
            DoctorError::NotFound => AppointmentError::DoctorNotFound,
            DoctorError::DatabaseError(msg) => AppointmentError::DatabaseError(msg),
            other => AppointmentError::DatabaseError(other.to_string()),
        }
    }
}

impl From<AppointmentError> for shared_models::error::AppError {
    fn from(error: AppointmentError) -> Self {
        use shared_models::error::AppError;

        let message = error.to_string();
        match error {
            AppointmentError::MissingFields(fields) => AppError::ValidationError {
                reason: "missing_fields".to_string(),
                message,
                fields,
            },
            AppointmentError::InvalidField { field, .. } => AppError::ValidationError {
                reason: "invalid_field".to_string(),
                message,
                fields: vec![field],
            },
            AppointmentError::InvalidTimeFormat(_) => {
                AppError::validation("invalid_time_format", message, &["appointment_time"])
            }
            AppointmentError::InPast => {
                AppError::validation("appointment_in_past", message, &["appointment_date", "appointment_time"])
            }
            AppointmentError::NotFound | AppointmentError::DoctorNotFound => AppError::NotFound(message),
            AppointmentError::NotAPatient | AppointmentError::Unauthorized(_) => AppError::Forbidden(message),
            AppointmentError::SlotFull { max_appointments, current_count } => AppError::ConflictWithDetails {
                message,
                details: json!({
                    "slot_full": true,
                    "max_appointments": max_appointments,
                    "current_count": current_count
                }),
            },
            AppointmentError::InvalidTransition { current_status, .. } => AppError::ConflictWithDetails {
                message,
                details: json!({ "current_status": current_status }),
            },
            AppointmentError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}
