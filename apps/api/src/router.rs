use axum::{routing::get, Json, Router};
use serde_json::json;

use appointment_cell::router::appointment_routes;
use appointment_cell::AppointmentState;
use doctor_cell::router::doctor_routes;
use doctor_cell::DoctorState;

pub fn create_router(doctors: DoctorState, appointments: AppointmentState) -> Router {
    let api = Router::new()
        .merge(doctor_routes(doctors))
        .merge(appointment_routes(appointments));

    Router::new()
        .route("/", get(|| async { "PocketCare API is running!" }))
        .route("/health", get(|| async { Json(json!({ "status": "ok" })) }))
        .nest("/api", api)
}
