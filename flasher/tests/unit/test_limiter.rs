//! Concurrency limiter tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use flasher::limiter::{ConcurrencyLimiter, LimiterError};

#[tokio::test]
async fn test_never_more_than_limit_running() {
    let limiter = ConcurrencyLimiter::new(3, Duration::from_millis(5));
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut accepted = 0;
    let mut rejected = 0;
    for _ in 0..10 {
        let running = running.clone();
        let peak = peak.clone();
        let job = async move {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            running.fetch_sub(1, Ordering::SeqCst);
        };

        match limiter.dispatch(job).await {
            Ok(()) => accepted += 1,
            Err(LimiterError::LimitReached) => rejected += 1,
            Err(e) => panic!("unexpected dispatch error: {e}"),
        }
    }

    assert_eq!(accepted, 3);
    assert_eq!(rejected, 7);
    assert!(limiter.active_count() <= 3);

    limiter.stop_wait().await;
    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert_eq!(limiter.active_count(), 0);
}

#[tokio::test]
async fn test_dispatch_at_limit_does_not_block() {
    let limiter = ConcurrencyLimiter::new(1, Duration::from_millis(5));
    let release = Arc::new(Notify::new());

    let hold = release.clone();
    limiter
        .dispatch(async move { hold.notified().await })
        .await
        .unwrap();

    let second = tokio::time::timeout(Duration::from_secs(1), limiter.dispatch(async {})).await;
    assert!(matches!(second, Ok(Err(LimiterError::LimitReached))));

    release.notify_one();
    limiter.stop_wait().await;
    assert_eq!(limiter.active_count(), 0);
}

#[tokio::test]
async fn test_slot_frees_when_job_finishes() {
    let limiter = ConcurrencyLimiter::new(1, Duration::from_millis(5));
    limiter.dispatch(async {}).await.unwrap();

    let mut accepted = false;
    for _ in 0..50 {
        match limiter.dispatch(async {}).await {
            Ok(()) => {
                accepted = true;
                break;
            }
            Err(LimiterError::LimitReached) => tokio::time::sleep(Duration::from_millis(5)).await,
            Err(e) => panic!("unexpected dispatch error: {e}"),
        }
    }
    assert!(accepted);

    limiter.stop_wait().await;
}

#[tokio::test]
async fn test_stop_wait_drains_then_rejects() {
    let limiter = ConcurrencyLimiter::new(2, Duration::from_millis(5));
    let done = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
        let done = done.clone();
        limiter
            .dispatch(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                done.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();
    }

    limiter.stop_wait().await;
    assert_eq!(done.load(Ordering::SeqCst), 2);
    assert_eq!(limiter.active_count(), 0);
    assert!(limiter.is_draining());
    assert!(limiter.dispatch(async {}).await.is_err());
}
