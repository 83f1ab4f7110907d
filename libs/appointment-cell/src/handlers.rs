use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::WithRejection;
use serde_json::{json, Value};

use doctor_cell::models::DoctorPath;
use security_cell::RateLimitState;
use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    AppointmentListQuery, AppointmentPath, CheckAvailabilityRequest, CreateAppointmentRequest,
    SlotDateQuery,
};
use crate::services::booking::AppointmentBookingService;

#[derive(Clone)]
pub struct AppointmentState {
    pub config: Arc<AppConfig>,
    pub booking: Arc<AppointmentBookingService>,
    pub rate_limit: RateLimitState,
}

impl AppointmentState {
    pub fn new(
        config: Arc<AppConfig>,
        booking: Arc<AppointmentBookingService>,
        rate_limit: RateLimitState,
    ) -> Self {
        Self { config, booking, rate_limit }
    }
}

// ==============================================================================
// BOOKING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_appointment(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    WithRejection(Json(request), _): WithRejection<Json<CreateAppointmentRequest>, AppError>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let caller = user.identity()?;

    let appointment = state
        .booking
        .create_appointment(&caller, user.has_role("doctor"), request)
        .await?;

    let message = if appointment.is_emergency {
        "Emergency appointment requested. Awaiting doctor confirmation"
    } else {
        "Appointment booked successfully"
    };

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": message,
            "appointment": appointment
        })),
    ))
}

#[axum::debug_handler]
pub async fn check_availability(
    State(state): State<AppointmentState>,
    WithRejection(Json(request), _): WithRejection<Json<CheckAvailabilityRequest>, AppError>,
) -> Result<Json<Value>, AppError> {
    let snapshot = state.booking.check_availability(request).await?;
    Ok(Json(json!(snapshot)))
}

#[axum::debug_handler]
pub async fn get_doctor_slot_occupancy(
    State(state): State<AppointmentState>,
    WithRejection(Path(DoctorPath { doctor_id }), _): WithRejection<Path<DoctorPath>, AppError>,
    WithRejection(Query(query), _): WithRejection<Query<SlotDateQuery>, AppError>,
) -> Result<Json<Value>, AppError> {
    let slots = state.booking.doctor_slots(doctor_id, query.date).await?;
    Ok(Json(json!(slots)))
}

// ==============================================================================
// LIFECYCLE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn confirm_appointment(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    WithRejection(Path(AppointmentPath { appointment_id }), _): WithRejection<Path<AppointmentPath>, AppError>,
) -> Result<Json<Value>, AppError> {
    let caller = user.identity()?;
    let outcome = state.booking.confirm_appointment(&caller, appointment_id).await?;

    let message = if outcome.changed {
        "Appointment confirmed successfully"
    } else {
        "Appointment is already confirmed"
    };

    Ok(Json(json!({
        "message": message,
        "appointment": outcome.appointment
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    WithRejection(Path(AppointmentPath { appointment_id }), _): WithRejection<Path<AppointmentPath>, AppError>,
) -> Result<Json<Value>, AppError> {
    let caller = user.identity()?;
    let appointment = state.booking.cancel_appointment(&caller, appointment_id).await?;

    Ok(Json(json!({
        "message": "Appointment cancelled successfully",
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn delete_appointment(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    WithRejection(Path(AppointmentPath { appointment_id }), _): WithRejection<Path<AppointmentPath>, AppError>,
) -> Result<Json<Value>, AppError> {
    let caller = user.identity()?;
    state.booking.delete_appointment(&caller, appointment_id).await?;

    Ok(Json(json!({
        "message": "Appointment deleted successfully",
        "appointment_id": appointment_id
    })))
}

// ==============================================================================
// READ HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    WithRejection(Path(AppointmentPath { appointment_id }), _): WithRejection<Path<AppointmentPath>, AppError>,
) -> Result<Json<Value>, AppError> {
    let caller = user.identity()?;
    let appointment = state.booking.get_appointment(&caller, appointment_id).await?;
    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn get_user_appointments(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    WithRejection(Query(query), _): WithRejection<Query<AppointmentListQuery>, AppError>,
) -> Result<Json<Value>, AppError> {
    let caller = user.identity()?;
    let appointments = state.booking.patient_appointments(&caller, query.date).await?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn get_doctor_appointments(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    WithRejection(Query(query), _): WithRejection<Query<AppointmentListQuery>, AppError>,
) -> Result<Json<Value>, AppError> {
    let caller = user.identity()?;
    let appointments = state.booking.doctor_appointments(&caller, query.date).await?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn get_doctor_stats(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let caller = user.identity()?;
    let stats = state.booking.doctor_stats(&caller).await?;
    Ok(Json(json!(stats)))
}
