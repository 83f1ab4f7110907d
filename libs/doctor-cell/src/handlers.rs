use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::extract::WithRejection;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};

use shared_config::AppConfig;
use shared_models::auth::{CallerIdentity, User};
use shared_models::error::AppError;

use crate::models::{DoctorError, DoctorPath, DoctorSearch, UpdateAvailabilityRequest};
use crate::services::{AvailabilityService, DoctorRepository};

#[derive(Clone)]
pub struct DoctorState {
    pub config: Arc<AppConfig>,
    pub doctors: Arc<dyn DoctorRepository>,
}

impl DoctorState {
    pub fn new(config: Arc<AppConfig>, doctors: Arc<dyn DoctorRepository>) -> Self {
        Self { config, doctors }
    }

    fn availability(&self) -> AvailabilityService {
        AvailabilityService::new(self.doctors.clone(), self.config.schema_version)
    }
}

#[derive(Debug, Deserialize)]
pub struct SlotsQuery {
    pub date: NaiveDate,
}

// ==============================================================================
// PUBLIC HANDLERS (NO AUTHENTICATION REQUIRED)
// ==============================================================================

#[axum::debug_handler]
pub async fn search_doctors_public(
    State(state): State<DoctorState>,
    WithRejection(Query(filters), _): WithRejection<Query<DoctorSearch>, AppError>,
) -> Result<Json<Value>, AppError> {
    let doctors = state.availability().search(&filters).await?;

    Ok(Json(json!({
        "doctors": doctors,
        "total": doctors.len()
    })))
}

#[axum::debug_handler]
pub async fn get_doctor_public(
    State(state): State<DoctorState>,
    WithRejection(Path(DoctorPath { doctor_id }), _): WithRejection<Path<DoctorPath>, AppError>,
) -> Result<Json<Value>, AppError> {
    let doctor = state.availability().get_doctor(doctor_id).await?;
    Ok(Json(json!(doctor)))
}

#[axum::debug_handler]
pub async fn get_doctor_slots_public(
    State(state): State<DoctorState>,
    WithRejection(Path(DoctorPath { doctor_id }), _): WithRejection<Path<DoctorPath>, AppError>,
    WithRejection(Query(query), _): WithRejection<Query<SlotsQuery>, AppError>,
) -> Result<Json<Value>, AppError> {
    let slots = state.availability().slots_for_date(doctor_id, query.date).await?;
    Ok(Json(json!(slots)))
}

// ==============================================================================
// PROTECTED HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn update_my_availability(
    State(state): State<DoctorState>,
    Extension(user): Extension<User>,
    WithRejection(Json(request), _): WithRejection<Json<UpdateAvailabilityRequest>, AppError>,
) -> Result<Json<Value>, AppError> {
    let doctor_id = match user.identity()? {
        CallerIdentity::Account(id) => id,
        CallerIdentity::Admin(_) => {
            return Err(AppError::Forbidden("Only doctors can update availability".to_string()));
        }
    };

    let service = state.availability();

    // The caller's id has to belong to a doctor record.
    service.get_doctor(doctor_id).await.map_err(|e| match e {
        DoctorError::NotFound => AppError::Forbidden("Only doctors can update availability".to_string()),
        other => other.into(),
    })?;

    let doctor = service.update_availability(doctor_id, request).await?;

    Ok(Json(json!({
        "message": "Availability updated successfully",
        "doctor": doctor
    })))
}
