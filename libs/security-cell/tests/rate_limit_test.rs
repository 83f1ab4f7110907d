use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use security_cell::{InMemoryRateLimitStore, RateDecision, RateLimitStore, RedisRateLimitStore};

#[tokio::test]
async fn concurrent_hits_never_exceed_limit() {
    let store: Arc<dyn RateLimitStore> = Arc::new(InMemoryRateLimitStore::new());
    let limit = 5;

    let attempts = (0..20).map(|_| {
        let store = store.clone();
        tokio::spawn(async move { store.hit("book:42", limit, Duration::from_secs(60)).await })
    });

    let decisions: Vec<RateDecision> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    let allowed = decisions.iter().filter(|decision| decision.is_allowed()).count();
    assert_eq!(allowed, limit as usize);
    assert_eq!(decisions.len() - allowed, 15);
}

#[tokio::test]
async fn redis_store_limits_when_available() {
    // Only runs against a live Redis.
    let Ok(redis_url) = std::env::var("REDIS_URL") else {
        return;
    };
    let Ok(store) = RedisRateLimitStore::new(&redis_url).await else {
        return;
    };

    let key = format!("test:{}", uuid::Uuid::new_v4());
    let window = Duration::from_secs(5);

    assert!(store.hit(&key, 2, window).await.unwrap().is_allowed());
    assert!(store.hit(&key, 2, window).await.unwrap().is_allowed());

    match store.hit(&key, 2, window).await.unwrap() {
        RateDecision::Limited { retry_after } => assert!(retry_after <= window),
        other => panic!("expected a limited decision, got {:?}", other),
    }
}
