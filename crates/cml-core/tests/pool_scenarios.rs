//! Scenario-level tests for the client pool, exercising it the way the
//! ingress layer does: acquire, use, release, repeat.

use std::sync::Arc;
use std::time::Duration;

use cml_core::{ClientPool, TransportMode};

fn pool() -> ClientPool {
    ClientPool::new(3, 2, Duration::from_secs(30), TransportMode::Http)
}

#[tokio::test]
async fn sequential_requests_to_the_same_host_reuse_one_client() {
    let pool = pool();
    let key = ("https://cml1.example.com".to_string(), true);

    for _ in 0..5 {
        let lease = pool.acquire(key.clone(), "alice", "secret").await.unwrap();
        pool.release(&lease.key).await;
    }

    assert_eq!(pool.len().await, 1);
}

#[tokio::test]
async fn concurrent_requests_within_the_per_key_cap_all_succeed() {
    let pool = Arc::new(pool());
    let key = ("https://cml1.example.com".to_string(), true);

    let mut handles = Vec::new();
    for _ in 0..2 {
        let pool = pool.clone();
        let key = key.clone();
        handles.push(tokio::spawn(async move {
            let lease = pool.acquire(key.clone(), "alice", "secret").await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            pool.release(&lease.key).await;
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    assert_eq!(pool.len().await, 1);
}

#[tokio::test]
async fn a_third_concurrent_request_beyond_the_cap_is_rejected() {
    let pool = pool();
    let key = ("https://cml1.example.com".to_string(), true);

    let lease1 = pool.acquire(key.clone(), "alice", "secret").await.unwrap();
    let lease2 = pool.acquire(key.clone(), "bob", "secret").await.unwrap();
    let err = pool.acquire(key.clone(), "carol", "secret").await.unwrap_err();
    assert!(err.to_string().contains("too many concurrent requests"));

    pool.release(&lease1.key).await;
    pool.release(&lease2.key).await;
}

#[tokio::test]
async fn lru_eviction_keeps_the_pool_within_max_entries() {
    let pool = pool();
    for host in ["a", "b", "c", "d"] {
        let key = (format!("https://{host}.example.com"), true);
        let lease = pool.acquire(key.clone(), "alice", "secret").await.unwrap();
        pool.release(&lease.key).await;
    }

    assert!(pool.len().await <= 3);
}

#[tokio::test]
async fn distinct_tls_settings_for_the_same_host_get_distinct_entries() {
    let pool = pool();
    let verified = ("https://cml1.example.com".to_string(), true);
    let unverified = ("https://cml1.example.com".to_string(), false);

    let lease1 = pool.acquire(verified.clone(), "alice", "secret").await.unwrap();
    let lease2 = pool.acquire(unverified.clone(), "alice", "secret").await.unwrap();

    assert!(!Arc::ptr_eq(&lease1.client, &lease2.client));
    assert_eq!(pool.len().await, 2);

    pool.release(&lease1.key).await;
    pool.release(&lease2.key).await;
}
