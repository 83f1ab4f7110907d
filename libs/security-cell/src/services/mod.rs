pub mod rate_limit;
pub mod redis_store;

pub use rate_limit::{spawn_sweeper, InMemoryRateLimitStore, RateLimitStore};
pub use redis_store::RedisRateLimitStore;
