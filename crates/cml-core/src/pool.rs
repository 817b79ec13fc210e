//! Upstream client pool: LRU + TTL + per-key concurrency cap (C3).

use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use tokio::sync::Mutex;

use crate::client::{TransportMode, UpstreamClient};
use crate::error::{GatewayError, GatewayResult};

/// `(normalized host, tls_verification)` — two entries for the same host
/// with different TLS settings are never the same pooled client, since
/// `reqwest::Client` bakes certificate verification in at construction.
pub type PoolKey = (String, bool);

struct PooledClient {
    client: Arc<UpstreamClient>,
    last_used: Instant,
    active_leases: u32,
}

struct PoolInner {
    entries: IndexMap<PoolKey, PooledClient>,
}

/// A leased client handle. Releases its lease back to the pool on drop is
/// NOT implemented here (async release needs the pool lock); callers must
/// call [`ClientPool::release`] explicitly on every exit path.
pub struct Lease {
    pub key: PoolKey,
    pub client: Arc<UpstreamClient>,
}

/// Bounded pool of [`UpstreamClient`]s keyed by target host and TLS mode.
///
/// Evicts the least-recently-used entry once `max_entries` is reached for a
/// new key (forcibly, if every entry is leased), and separately sweeps
/// entries idle past `ttl`. The TTL sweep only ever touches zero-lease
/// entries; an in-flight request is never silently cut off by it (§5).
pub struct ClientPool {
    inner: Mutex<PoolInner>,
    max_entries: usize,
    max_per_key: u32,
    ttl: Duration,
    transport_mode: TransportMode,
}

impl ClientPool {
    pub fn new(max_entries: usize, max_per_key: u32, ttl: Duration, transport_mode: TransportMode) -> Self {
        Self {
            inner: Mutex::new(PoolInner { entries: IndexMap::new() }),
            max_entries,
            max_per_key,
            ttl,
            transport_mode,
        }
    }

    /// Acquire a lease on the client for `key`, creating one with the given
    /// credentials if none is pooled yet, or rebinding credentials onto a
    /// reused entry. Sweeps TTL-expired idle entries first (§4.3 step 3),
    /// then enforces the per-key concurrency cap and, for a new key, evicts
    /// room under LRU pressure (forcibly if every entry is leased) before
    /// inserting.
    pub async fn acquire(&self, key: PoolKey, username: &str, password: &str) -> GatewayResult<Lease> {
        let (result, mut victims) = {
            let mut inner = self.inner.lock().await;
            let mut victims = self.ttl_sweep(&mut inner);

            let result = if let Some(entry) = inner.entries.shift_remove(&key) {
                let mut entry = entry;
                if entry.active_leases >= self.max_per_key {
                    inner.entries.insert(key.clone(), entry);
                    Err(GatewayError::PerKeyLimit(key.0, self.max_per_key))
                } else {
                    entry.active_leases += 1;
                    entry.last_used = Instant::now();
                    let client = entry.client.clone();
                    inner.entries.insert(key.clone(), entry);

                    if self.transport_mode == TransportMode::Http {
                        client.rebind(username, password).await;
                    }
                    Ok(Lease { key, client })
                }
            } else {
                if let Some(victim) = self.make_room(&mut inner) {
                    victims.push(victim);
                }

                match UpstreamClient::new(&key.0, username, password, self.transport_mode, key.1) {
                    Ok(client) => {
                        let client = Arc::new(client);
                        inner.entries.insert(
                            key.clone(),
                            PooledClient {
                                client: client.clone(),
                                last_used: Instant::now(),
                                active_leases: 1,
                            },
                        );
                        Ok(Lease { key, client })
                    }
                    Err(e) => Err(e),
                }
            };

            (result, victims)
        };

        for victim in victims.drain(..) {
            victim.close().await;
        }
        result
    }

    /// Make room for a new entry if the pool is at capacity: evict the LRU
    /// idle entry, or if every entry is leased, force-evict the LRU entry
    /// regardless (§4.3 step 5a). Holders of a forcibly evicted client keep
    /// working; only the pool's ability to reuse it for new leases is lost.
    fn make_room(&self, inner: &mut PoolInner) -> Option<Arc<UpstreamClient>> {
        if inner.entries.len() < self.max_entries {
            return None;
        }

        let idle_lru = inner
            .entries
            .iter()
            .filter(|(_, e)| e.active_leases == 0)
            .min_by_key(|(_, e)| e.last_used)
            .map(|(k, _)| k.clone());

        let victim_key = idle_lru.or_else(|| {
            tracing::warn!("forcing eviction of an actively-leased pool entry under capacity pressure");
            inner.entries.iter().min_by_key(|(_, e)| e.last_used).map(|(k, _)| k.clone())
        })?;

        inner.entries.shift_remove(&victim_key).map(|entry| entry.client)
    }

    /// Release a previously acquired lease. A no-op if the key is no longer
    /// pooled (e.g. it was evicted between acquire and release, which can
    /// only happen if `active_leases` reached zero first -- meaning the
    /// caller already released via another path).
    pub async fn release(&self, key: &PoolKey) {
        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner.entries.get_mut(key) {
            entry.active_leases = entry.active_leases.saturating_sub(1);
            // last_used is intentionally left alone: TTL is measured from
            // acquisition, not release, so a long-running call never keeps
            // an entry artificially fresh once it's back in the idle pool.
        }
    }

    /// Sweep TTL-expired idle entries. Collects victims under the lock and
    /// closes their clients after releasing it, since `close` is async and
    /// must not be awaited while holding the pool mutex.
    async fn evict(&self) {
        let victims = {
            let mut inner = self.inner.lock().await;
            self.ttl_sweep(&mut inner)
        };
        for client in victims {
            client.close().await;
        }
    }

    fn ttl_sweep(&self, inner: &mut PoolInner) -> Vec<Arc<UpstreamClient>> {
        let now = Instant::now();
        let stale: Vec<PoolKey> = inner
            .entries
            .iter()
            .filter(|(_, e)| e.active_leases == 0 && now.duration_since(e.last_used) >= self.ttl)
            .map(|(k, _)| k.clone())
            .collect();

        let mut victims = Vec::with_capacity(stale.len());
        for k in stale {
            if let Some(entry) = inner.entries.shift_remove(&k) {
                victims.push(entry.client);
            }
        }
        victims
    }

    /// Number of entries currently pooled, for diagnostics and tests.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    /// Run a single idle-eviction pass. Intended to be called periodically
    /// by a background task in addition to the inline pass on `acquire`.
    pub async fn sweep(&self) {
        self.evict().await;
    }

    /// Close every pooled client and clear the map (shutdown path).
    pub async fn close_all(&self) {
        let mut inner = self.inner.lock().await;
        for (_, entry) in inner.entries.drain(..) {
            entry.client.close().await;
        }
    }

    /// Read-only observability snapshot: size, configured max, and a
    /// per-key view of TLS mode, active lease count, and idle time.
    pub async fn stats(&self) -> PoolStats {
        let inner = self.inner.lock().await;
        let now = Instant::now();
        let entries = inner
            .entries
            .iter()
            .map(|(key, entry)| PoolEntryStats {
                key: key.0.clone(),
                tls_verification: key.1,
                active_leases: entry.active_leases,
                idle_seconds: now.duration_since(entry.last_used).as_secs(),
            })
            .collect();
        PoolStats {
            size: inner.entries.len(),
            max_entries: self.max_entries,
            entries,
        }
    }
}

/// Per-key observability view returned by [`ClientPool::stats`].
#[derive(Debug, Clone)]
pub struct PoolEntryStats {
    pub key: String,
    pub tls_verification: bool,
    pub active_leases: u32,
    pub idle_seconds: u64,
}

/// Pool-wide observability snapshot returned by [`ClientPool::stats`].
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub size: usize,
    pub max_entries: usize,
    pub entries: Vec<PoolEntryStats>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(max_entries: usize, max_per_key: u32, ttl: Duration) -> ClientPool {
        ClientPool::new(max_entries, max_per_key, ttl, TransportMode::Http)
    }

    #[tokio::test]
    async fn sequential_acquire_release_reuses_entry() {
        let pool = pool(4, 2, Duration::from_secs(60));
        let key: PoolKey = ("https://cml1.example.com".into(), true);

        let lease1 = pool.acquire(key.clone(), "u", "p").await.unwrap();
        pool.release(&lease1.key).await;
        let lease2 = pool.acquire(key.clone(), "u", "p").await.unwrap();

        assert!(Arc::ptr_eq(&lease1.client, &lease2.client));
        assert_eq!(pool.len().await, 1);
    }

    #[tokio::test]
    async fn per_key_limit_rejects_beyond_cap() {
        let pool = pool(4, 1, Duration::from_secs(60));
        let key: PoolKey = ("https://cml1.example.com".into(), true);

        let _lease1 = pool.acquire(key.clone(), "u", "p").await.unwrap();
        let err = pool.acquire(key.clone(), "u", "p").await.unwrap_err();
        assert!(matches!(err, GatewayError::PerKeyLimit(_, 1)));
    }

    #[tokio::test]
    async fn per_key_limit_allows_again_after_release() {
        let pool = pool(4, 1, Duration::from_secs(60));
        let key: PoolKey = ("https://cml1.example.com".into(), true);

        let lease1 = pool.acquire(key.clone(), "u", "p").await.unwrap();
        pool.release(&lease1.key).await;
        assert!(pool.acquire(key.clone(), "u", "p").await.is_ok());
    }

    #[tokio::test]
    async fn lru_evicts_idle_entry_under_pressure() {
        let pool = pool(2, 4, Duration::from_secs(60));
        let a: PoolKey = ("https://a.example.com".into(), true);
        let b: PoolKey = ("https://b.example.com".into(), true);
        let c: PoolKey = ("https://c.example.com".into(), true);

        let lease_a = pool.acquire(a.clone(), "u", "p").await.unwrap();
        pool.release(&lease_a.key).await;
        let lease_b = pool.acquire(b.clone(), "u", "p").await.unwrap();
        pool.release(&lease_b.key).await;

        // Pool at capacity (2); acquiring c should evict the LRU entry (a).
        let _lease_c = pool.acquire(c.clone(), "u", "p").await.unwrap();
        assert_eq!(pool.len().await, 2);
    }

    #[tokio::test]
    async fn forced_eviction_when_every_entry_is_leased() {
        let pool = pool(1, 4, Duration::from_secs(60));
        let a: PoolKey = ("https://a.example.com".into(), true);
        let b: PoolKey = ("https://b.example.com".into(), true);

        let lease_a = pool.acquire(a.clone(), "u", "p").await.unwrap();
        // a is still leased (never released); acquiring b must force-evict a
        // rather than block or grow past max_entries. a's holder keeps working.
        let _lease_b = pool.acquire(b.clone(), "u", "p").await.unwrap();
        assert_eq!(pool.len().await, 1);
        assert!(lease_a.client.base_url().contains("a.example.com"));
    }

    #[tokio::test]
    async fn ttl_sweep_evicts_only_idle_expired_entries() {
        let pool = pool(4, 4, Duration::from_millis(1));
        let a: PoolKey = ("https://a.example.com".into(), true);
        let b: PoolKey = ("https://b.example.com".into(), true);

        let lease_a = pool.acquire(a.clone(), "u", "p").await.unwrap();
        pool.release(&lease_a.key).await;
        let _lease_b = pool.acquire(b.clone(), "u", "p").await.unwrap(); // stays leased

        tokio::time::sleep(Duration::from_millis(5)).await;
        pool.sweep().await;

        assert_eq!(pool.len().await, 1); // a evicted, b survives (leased)
    }

    #[tokio::test]
    async fn release_on_unknown_key_is_a_noop() {
        let pool = pool(4, 4, Duration::from_secs(60));
        let key: PoolKey = ("https://never-acquired.example.com".into(), true);
        pool.release(&key).await;
        assert_eq!(pool.len().await, 0);
    }

    #[tokio::test]
    async fn acquire_sweeps_ttl_expired_entries_inline() {
        let pool = pool(4, 4, Duration::from_millis(1));
        let a: PoolKey = ("https://a.example.com".into(), true);
        let b: PoolKey = ("https://b.example.com".into(), true);

        let lease_a = pool.acquire(a.clone(), "u", "p").await.unwrap();
        pool.release(&lease_a.key).await;

        tokio::time::sleep(Duration::from_millis(5)).await;

        // No explicit sweep() call: acquiring b alone must reclaim a.
        let _lease_b = pool.acquire(b.clone(), "u", "p").await.unwrap();
        assert_eq!(pool.len().await, 1);
    }

    #[tokio::test]
    async fn close_all_empties_the_pool() {
        let pool = pool(4, 4, Duration::from_secs(60));
        let a: PoolKey = ("https://a.example.com".into(), true);
        let b: PoolKey = ("https://b.example.com".into(), true);

        let lease_a = pool.acquire(a.clone(), "u", "p").await.unwrap();
        pool.release(&lease_a.key).await;
        let _lease_b = pool.acquire(b.clone(), "u", "p").await.unwrap();

        pool.close_all().await;
        assert_eq!(pool.len().await, 0);
    }

    #[tokio::test]
    async fn stats_reports_size_max_and_per_key_detail() {
        let pool = pool(5, 3, Duration::from_secs(60));
        let a: PoolKey = ("https://a.example.com".into(), true);

        let lease_a = pool.acquire(a.clone(), "u", "p").await.unwrap();

        let stats = pool.stats().await;
        assert_eq!(stats.size, 1);
        assert_eq!(stats.max_entries, 5);
        let entry = stats.entries.iter().find(|e| e.key == "https://a.example.com").unwrap();
        assert!(entry.tls_verification);
        assert_eq!(entry.active_leases, 1);

        pool.release(&lease_a.key).await;
    }

    #[tokio::test]
    async fn rebind_in_http_mode_swaps_credentials_on_reuse() {
        let pool = pool(4, 4, Duration::from_secs(60));
        let key: PoolKey = ("https://cml1.example.com".into(), true);

        let lease1 = pool.acquire(key.clone(), "alice", "pw1").await.unwrap();
        assert_eq!(lease1.client.username().await, "alice");
        pool.release(&lease1.key).await;

        let lease2 = pool.acquire(key.clone(), "bob", "pw2").await.unwrap();
        assert_eq!(lease2.client.username().await, "bob");
    }
}
