use std::time::Duration;

use thiserror::Error;

use shared_models::error::AppError;

/// Outcome of recording one hit against a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

#[derive(Error, Debug)]
pub enum RateLimitError {
    #[error("Redis connection error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Rate limit store unavailable: {0}")]
    Unavailable(String),
}

impl From<RateLimitError> for AppError {
    fn from(error: RateLimitError) -> Self {
        AppError::ExternalService(format!("Rate limiter unavailable: {}", error))
    }
}

/// Whole seconds a client should wait, never less than one.
pub fn retry_after_seconds(retry_after: Duration) -> u64 {
    let seconds = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    seconds.max(1)
}
