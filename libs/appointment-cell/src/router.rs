use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use security_cell::booking_rate_limit;
use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, AppointmentState};

pub fn appointment_routes(state: AppointmentState) -> Router {
    // Only booking itself is rate limited.
    let booking_routes = Router::new()
        .route("/appointments", post(handlers::create_appointment))
        .route_layer(middleware::from_fn_with_state(state.rate_limit.clone(), booking_rate_limit));

    let appointment_routes = Router::new()
        .route("/appointments/check-availability", post(handlers::check_availability))
        .route(
            "/appointments/{appointment_id}",
            get(handlers::get_appointment).delete(handlers::delete_appointment),
        )
        .route("/appointments/{appointment_id}/confirm", put(handlers::confirm_appointment))
        .route("/appointments/{appointment_id}/cancel", put(handlers::cancel_appointment))
        .route("/appointments/doctors/{doctor_id}/slots", get(handlers::get_doctor_slot_occupancy))
        .route("/user/appointments", get(handlers::get_user_appointments))
        .route("/doctor/appointments", get(handlers::get_doctor_appointments))
        .route("/doctor/stats", get(handlers::get_doctor_stats));

    Router::new()
        .merge(booking_routes)
        .merge(appointment_routes)
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}
