use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument};

use crate::models::{RateDecision, RateLimitError};

/// Sliding-window hit counter. State is not durable: it lives as long as
/// the process (memory) or the key TTL (Redis).
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Record a hit for `key` unless `limit` hits already fall inside `window`.
    async fn hit(&self, key: &str, limit: u32, window: Duration) -> Result<RateDecision, RateLimitError>;

    /// Drop expired state. Returns how many keys were removed.
    async fn sweep(&self) -> Result<usize, RateLimitError>;
}

struct Bucket {
    hits: VecDeque<Instant>,
    window: Duration,
}

impl Bucket {
    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.hits.front() {
            if now.duration_since(*oldest) >= self.window {
                self.hits.pop_front();
            } else {
                break;
            }
        }
    }
}

#[derive(Default)]
pub struct InMemoryRateLimitStore {
    buckets: RwLock<HashMap<String, Bucket>>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn tracked_keys(&self) -> usize {
        self.buckets.read().await.len()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn hit(&self, key: &str, limit: u32, window: Duration) -> Result<RateDecision, RateLimitError> {
        let now = Instant::now();
        let mut buckets = self.buckets.write().await;
        let bucket = buckets.entry(key.to_string()).or_insert_with(|| Bucket {
            hits: VecDeque::new(),
            window,
        });
        bucket.window = window;
        bucket.prune(now);

        if bucket.hits.len() >= limit as usize {
            let retry_after = bucket
                .hits
                .front()
                .map(|oldest| window.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or(window);
            debug!("Rate limit reached for {}", key);
            return Ok(RateDecision::Limited { retry_after });
        }

        bucket.hits.push_back(now);
        let remaining = limit.saturating_sub(bucket.hits.len() as u32);
        Ok(RateDecision::Allowed { remaining })
    }

    #[instrument(skip(self))]
    async fn sweep(&self) -> Result<usize, RateLimitError> {
        let now = Instant::now();
        let mut buckets = self.buckets.write().await;
        let before = buckets.len();

        buckets.retain(|_, bucket| {
            bucket.prune(now);
            !bucket.hits.is_empty()
        });

        let removed = before - buckets.len();
        if removed > 0 {
            debug!("Swept {} idle rate-limit keys", removed);
        }
        Ok(removed)
    }
}

/// Periodically sweeps `store` until the runtime shuts down.
pub fn spawn_sweeper(store: Arc<dyn RateLimitStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;

        loop {
            interval.tick().await;
            if let Err(e) = store.sweep().await {
                error!("Rate limit sweep failed: {}", e);
            }
        }
    })
}
