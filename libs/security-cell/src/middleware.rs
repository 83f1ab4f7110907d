use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use tracing::warn;

use shared_config::AppConfig;
use shared_models::error::AppError;
use shared_utils::extractor::extract_user;

use crate::models::{retry_after_seconds, RateDecision};
use crate::services::RateLimitStore;

#[derive(Clone)]
pub struct RateLimitState {
    pub store: Arc<dyn RateLimitStore>,
    pub limit: u32,
    pub window: Duration,
}

impl RateLimitState {
    pub fn new(store: Arc<dyn RateLimitStore>, limit: u32, window: Duration) -> Self {
        Self { store, limit, window }
    }

    pub fn from_config(store: Arc<dyn RateLimitStore>, config: &AppConfig) -> Self {
        Self::new(
            store,
            config.booking_rate_limit,
            Duration::from_secs(config.booking_rate_window_seconds),
        )
    }
}

/// Per-caller limit on booking attempts. Runs after `auth_middleware`; a
/// limit of 0 disables it.
pub async fn booking_rate_limit(
    State(limiter): State<RateLimitState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    if limiter.limit == 0 {
        return Ok(next.run(request).await);
    }

    let user = extract_user(&request)?;
    let key = format!("book:{}", user.id);

    match limiter.store.hit(&key, limiter.limit, limiter.window).await? {
        RateDecision::Allowed { .. } => Ok(next.run(request).await),
        RateDecision::Limited { retry_after } => {
            warn!("Booking rate limit exceeded for {}", user.id);
            Err(AppError::TooManyRequests {
                message: "Too many booking attempts. Please try again later.".to_string(),
                retry_after_seconds: retry_after_seconds(retry_after),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, middleware, routing::post, Router};
    use tower::ServiceExt;

    use shared_utils::test_utils::TestUser;

    use crate::services::InMemoryRateLimitStore;

    fn app(limit: u32) -> Router {
        let limiter = RateLimitState::new(Arc::new(InMemoryRateLimitStore::new()), limit, Duration::from_secs(60));

        Router::new()
            .route("/appointments", post(|| async { "booked" }))
            .route_layer(middleware::from_fn_with_state(limiter, booking_rate_limit))
    }

    fn request_as(user_id: i64) -> Request<Body> {
        let mut request = Request::builder()
            .method("POST")
            .uri("/appointments")
            .body(Body::empty())
            .unwrap();
        request.extensions_mut().insert(TestUser::patient(user_id).to_user());
        request
    }

    #[tokio::test]
    async fn test_limit_is_per_caller() {
        let app = app(2);

        for _ in 0..2 {
            let response = app.clone().oneshot(request_as(1)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let limited = app.clone().oneshot(request_as(1)).await.unwrap();
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(limited.headers().contains_key("retry-after"));

        let other = app.oneshot(request_as(2)).await.unwrap();
        assert_eq!(other.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_zero_limit_disables() {
        let app = app(0);
        for _ in 0..5 {
            let response = app.clone().oneshot(request_as(1)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn test_requires_authenticated_user() {
        let request = Request::builder()
            .method("POST")
            .uri("/appointments")
            .body(Body::empty())
            .unwrap();

        let response = app(2).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
