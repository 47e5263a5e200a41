//! In-process fixed-window counters backed by `moka`.
//!
//! Counts are per instance. Deployments running several replicas behind a
//! load balancer should put a shared [`CounterStore`] behind `AppState`
//! instead.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::future::Cache;

use miniapp_core::{CounterSnapshot, CounterStore, StoreError};

use crate::config::MAX_RATE_WINDOW_SECS;

/// Maximum number of distinct keys tracked at once.
const MAX_KEYS: u64 = 100_000;

/// Keys idle this long are evicted. Windows are clamped to it so an
/// evicted key never had time left on its window.
const IDLE_EVICTION: Duration = Duration::from_secs(MAX_RATE_WINDOW_SECS);

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u64,
    reset_at: DateTime<Utc>,
}

/// Counter store held in process memory.
#[derive(Clone)]
pub struct MemoryCounterStore {
    windows: Cache<String, Window>,
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCounterStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            windows: Cache::builder()
                .max_capacity(MAX_KEYS)
                .time_to_idle(IDLE_EVICTION)
                .build(),
        }
    }

    async fn increment_at(
        &self,
        key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<CounterSnapshot, StoreError> {
        let length = chrono::Duration::from_std(window.min(IDLE_EVICTION))
            .map_err(|_| StoreError::Unavailable("rate-limit window out of range".to_owned()))?;
        let fresh_reset = now
            .checked_add_signed(length)
            .ok_or_else(|| StoreError::Unavailable("rate-limit window out of range".to_owned()))?;

        let entry = self
            .windows
            .entry(key.to_owned())
            .and_upsert_with(|existing| async move {
                match existing.map(|e| e.into_value()) {
                    Some(current) if current.reset_at > now => Window {
                        count: current.count.saturating_add(1),
                        reset_at: current.reset_at,
                    },
                    _ => Window {
                        count: 1,
                        reset_at: fresh_reset,
                    },
                }
            })
            .await;

        let current = entry.into_value();
        Ok(CounterSnapshot {
            count: current.count,
            reset_at: current.reset_at,
        })
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<CounterSnapshot, StoreError> {
        self.increment_at(key, window, Utc::now()).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_counts_within_window() {
        let store = MemoryCounterStore::new();
        let window = Duration::from_secs(60);

        let first = store.increment_at("login:1.2.3.4", window, t0()).await.unwrap();
        assert_eq!(first.count, 1);
        assert_eq!(first.reset_at, t0() + chrono::Duration::seconds(60));

        let later = t0() + chrono::Duration::seconds(30);
        let second = store.increment_at("login:1.2.3.4", window, later).await.unwrap();
        assert_eq!(second.count, 2);
        assert_eq!(second.reset_at, first.reset_at);
    }

    #[tokio::test]
    async fn test_window_resets_after_expiry() {
        let store = MemoryCounterStore::new();
        let window = Duration::from_secs(60);

        store.increment_at("k", window, t0()).await.unwrap();
        store.increment_at("k", window, t0()).await.unwrap();

        let after = t0() + chrono::Duration::seconds(60);
        let snapshot = store.increment_at("k", window, after).await.unwrap();
        assert_eq!(snapshot.count, 1);
        assert_eq!(snapshot.reset_at, after + chrono::Duration::seconds(60));
    }

    #[tokio::test]
    async fn test_long_window_is_clamped_to_eviction() {
        let store = MemoryCounterStore::new();

        let snapshot = store
            .increment_at("login:1.2.3.4", Duration::from_secs(7200), t0())
            .await
            .unwrap();
        assert_eq!(snapshot.reset_at, t0() + chrono::Duration::hours(1));

        // Out of chrono's range: still counted, never an error
        let snapshot = store
            .increment_at("api:huge", Duration::MAX, t0())
            .await
            .unwrap();
        assert_eq!(snapshot.count, 1);
        assert_eq!(snapshot.reset_at, t0() + chrono::Duration::hours(1));
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let store = MemoryCounterStore::new();
        let window = Duration::from_secs(60);

        store.increment_at("a", window, t0()).await.unwrap();
        store.increment_at("a", window, t0()).await.unwrap();
        let b = store.increment_at("b", window, t0()).await.unwrap();
        assert_eq!(b.count, 1);
    }
}
