//! Rate limiter integration tests
//!
//! Uses tokio's paused clock so timing assertions are exact.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use quire::ratelimit::RateLimiter;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_spawned_tasks_share_one_queue() {
    let limiter = RateLimiter::new(2.0).unwrap();
    let admitted = Arc::new(Mutex::new(Vec::new()));
    let start = Instant::now();

    let mut handles = Vec::new();
    for i in 0..4 {
        let limiter = limiter.clone();
        let admitted = admitted.clone();
        handles.push(tokio::spawn(async move {
            limiter
                .with_rate_limit(|| async move {
                    admitted.lock().unwrap().push((i, Instant::now()));
                })
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let admitted = admitted.lock().unwrap();
    assert_eq!(admitted.len(), 4);
    let order: Vec<i32> = admitted.iter().map(|(i, _)| *i).collect();
    assert_eq!(order, vec![0, 1, 2, 3]);
    for pair in admitted.windows(2) {
        assert!(pair[1].1 - pair[0].1 >= Duration::from_millis(500));
    }
    assert!(admitted[3].1 - start >= Duration::from_millis(1500));
}

#[tokio::test(start_paused = true)]
async fn test_limiter_idles_then_admits_immediately() {
    let limiter = RateLimiter::new(1.0).unwrap();
    limiter.acquire().await.unwrap();

    tokio::time::sleep(Duration::from_secs(5)).await;
    let start = Instant::now();
    limiter.acquire().await.unwrap();
    assert!(start.elapsed() < Duration::from_millis(1));
}
