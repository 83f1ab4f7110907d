use axum::{
    middleware,
    routing::{get, put},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, DoctorState};

pub fn doctor_routes(state: DoctorState) -> Router {
    let public_routes = Router::new()
        .route("/doctors", get(handlers::search_doctors_public))
        .route("/doctors/{doctor_id}", get(handlers::get_doctor_public))
        .route("/doctors/{doctor_id}/slots", get(handlers::get_doctor_slots_public));

    let protected_routes = Router::new()
        .route("/doctor/availability", put(handlers::update_my_availability))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
