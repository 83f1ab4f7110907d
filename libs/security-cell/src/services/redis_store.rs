use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{RateDecision, RateLimitError};
use crate::services::rate_limit::RateLimitStore;

const KEY_PREFIX: &str = "rate_limit:";

/// Sliding window over a Redis sorted set per key: members are hits, scores
/// are their timestamps in milliseconds.
pub struct RedisRateLimitStore {
    pool: Pool,
}

impl RedisRateLimitStore {
    pub async fn new(redis_url: &str) -> Result<Self, RateLimitError> {
        let pool = Config::from_url(redis_url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| RateLimitError::Unavailable(format!("Pool creation error: {}", e)))?;

        let store = Self { pool };

        let mut conn = store.get_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("Redis rate limit store initialized");

        Ok(store)
    }

    async fn get_connection(&self) -> Result<Connection, RateLimitError> {
        self.pool
            .get()
            .await
            .map_err(|e| RateLimitError::Unavailable(e.to_string()))
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn hit(&self, key: &str, limit: u32, window: Duration) -> Result<RateDecision, RateLimitError> {
        let redis_key = format!("{}{}", KEY_PREFIX, key);
        let member = Uuid::new_v4().to_string();
        let now = now_millis();
        let window_ms = window.as_millis() as i64;

        let mut conn = self.get_connection().await?;

        // Trim, record and count in one MULTI so concurrent hits see each other.
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .cmd("ZREMRANGEBYSCORE").arg(&redis_key).arg(0).arg(now - window_ms).ignore()
            .cmd("ZADD").arg(&redis_key).arg(now).arg(&member).ignore()
            .cmd("ZCARD").arg(&redis_key)
            .cmd("PEXPIRE").arg(&redis_key).arg(window_ms).ignore()
            .query_async(&mut conn)
            .await?;

        if count <= u64::from(limit) {
            return Ok(RateDecision::Allowed {
                remaining: (u64::from(limit) - count) as u32,
            });
        }

        // Over the limit: this hit does not count.
        let _: i64 = redis::cmd("ZREM").arg(&redis_key).arg(&member).query_async(&mut conn).await?;

        let oldest: Vec<(String, i64)> = redis::cmd("ZRANGE")
            .arg(&redis_key)
            .arg(0)
            .arg(0)
            .arg("WITHSCORES")
            .query_async(&mut conn)
            .await?;

        let retry_after_ms = oldest
            .first()
            .map(|(_, score)| (score + window_ms - now).max(0))
            .unwrap_or(window_ms);

        debug!("Rate limit reached for {}", key);
        Ok(RateDecision::Limited {
            retry_after: Duration::from_millis(retry_after_ms as u64),
        })
    }

    async fn sweep(&self) -> Result<usize, RateLimitError> {
        // Keys carry a TTL equal to their window; Redis expires them.
        Ok(0)
    }
}
