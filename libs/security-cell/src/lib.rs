// =====================================================================================
// SECURITY CELL - REQUEST RATE LIMITING
// =====================================================================================
//
// Sliding-window rate limiting behind an injected store (process memory or Redis)
// and the middleware that guards the booking endpoint.
//
// =====================================================================================

pub mod middleware;
pub mod models;
pub mod services;

pub use middleware::{booking_rate_limit, RateLimitState};
pub use models::{RateDecision, RateLimitError};
pub use services::{spawn_sweeper, InMemoryRateLimitStore, RateLimitStore, RedisRateLimitStore};
