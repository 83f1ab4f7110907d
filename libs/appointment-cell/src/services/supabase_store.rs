use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    Admission, AdmissionOutcome, Appointment, AppointmentError, AppointmentStatus, NewAppointment,
    SlotKey,
};
use crate::services::normalization::format_time;
use crate::services::store::AppointmentStore;

/// Postgres function that locks the slot, counts and inserts in one transaction.
pub const BOOKING_FUNCTION: &str = "book_appointment_slot";

const ACTIVE_STATUSES: &str = "in.(pending,confirmed)";
const LISTING_ORDER: &str = "appointment_date.desc,appointment_time.asc,id.asc";

#[derive(Debug, Deserialize)]
struct BookingResult {
    admitted: bool,
    current_count: i64,
    appointment: Option<Appointment>,
}

/// Appointments in the Supabase `appointments` table.
pub struct SupabaseAppointmentStore {
    supabase: SupabaseClient,
}

impl SupabaseAppointmentStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    fn db_error(context: &str, e: anyhow::Error) -> AppointmentError {
        error!("{}: {}", context, e);
        AppointmentError::DatabaseError(e.to_string())
    }

    fn parse_rows(rows: Vec<Value>) -> Result<Vec<Appointment>, AppointmentError> {
        rows.into_iter()
            .map(|row| {
                serde_json::from_value(row).map_err(|e| {
                    AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e))
                })
            })
            .collect()
    }

    async fn list(&self, filter: String, date: Option<NaiveDate>) -> Result<Vec<Appointment>, AppointmentError> {
        let mut path = format!("/rest/v1/appointments?{}", filter);
        if let Some(date) = date {
            path.push_str(&format!("&appointment_date=eq.{}", date));
        }
        path.push_str(&format!("&order={}", LISTING_ORDER));

        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None, None).await
            .map_err(|e| Self::db_error("Failed to list appointments", e))?;

        Self::parse_rows(rows)
    }
}

fn to_count(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn insert_with_admission(
        &self,
        new: NewAppointment,
        admission: Admission,
    ) -> Result<AdmissionOutcome, AppointmentError> {
        let max_appointments = match admission {
            Admission::Capacity(max) => Some(max),
            Admission::Bypass => None,
        };

        let args = json!({
            "p_user_id": new.user_id,
            "p_doctor_id": new.doctor_id,
            "p_appointment_date": new.appointment_date,
            "p_appointment_time": format_time(new.appointment_time),
            "p_status": new.status,
            "p_symptoms": new.symptoms,
            "p_is_emergency": new.is_emergency,
            "p_max_appointments": max_appointments,
        });

        debug!("Booking {} through {}", new.slot_key(), BOOKING_FUNCTION);

        let result: BookingResult = self.supabase.rpc(BOOKING_FUNCTION, args).await
            .map_err(|e| Self::db_error("Booking function failed", e))?;

        let current_count = to_count(result.current_count);
        match (result.admitted, result.appointment) {
            (true, Some(appointment)) => Ok(AdmissionOutcome::Admitted { appointment, current_count }),
            (false, _) => Ok(AdmissionOutcome::SlotFull { current_count }),
            (true, None) => Err(AppointmentError::DatabaseError(
                "Booking function admitted without returning the appointment".to_string(),
            )),
        }
    }

    async fn count_active(&self, key: SlotKey) -> Result<u32, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?select=id&doctor_id=eq.{}&appointment_date=eq.{}&appointment_time=eq.{}&status={}",
            key.doctor_id,
            key.appointment_date,
            format_time(key.appointment_time),
            ACTIVE_STATUSES
        );

        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None, None).await
            .map_err(|e| Self::db_error("Failed to count slot occupancy", e))?;

        Ok(rows.len() as u32)
    }

    async fn find_by_id(&self, appointment_id: i64) -> Result<Option<Appointment>, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None, None).await
            .map_err(|e| Self::db_error("Failed to fetch appointment", e))?;

        Ok(Self::parse_rows(rows)?.into_iter().next())
    }

    async fn update_status(
        &self,
        appointment_id: i64,
        expected: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}&status=eq.{}", appointment_id, expected);
        let body = json!({
            "status": new_status,
            "updated_at": Utc::now().to_rfc3339()
        });

        let rows: Vec<Value> = self.supabase.request_returning(Method::PATCH, &path, Some(body)).await
            .map_err(|e| Self::db_error("Failed to update appointment status", e))?;

        Ok(Self::parse_rows(rows)?.into_iter().next())
    }

    async fn delete_cancelled(&self, appointment_id: i64) -> Result<bool, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&status=eq.{}",
            appointment_id,
            AppointmentStatus::Cancelled
        );

        let rows: Vec<Value> = self.supabase.request_returning(Method::DELETE, &path, None).await
            .map_err(|e| Self::db_error("Failed to delete appointment", e))?;

        Ok(!rows.is_empty())
    }

    async fn list_for_patient(
        &self,
        user_id: i64,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.list(format!("user_id=eq.{}", user_id), date).await
    }

    async fn list_for_doctor(
        &self,
        doctor_id: i64,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.list(format!("doctor_id=eq.{}", doctor_id), date).await
    }
}
