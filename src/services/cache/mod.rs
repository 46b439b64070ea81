//! Tiered cache with single-flight
//!
//! Three tiers behind one operation, `get_or_fetch`:
//! - L0: in-flight map; concurrent callers for one key attach to the same
//!   pending computation, so the fetch runs exactly once.
//! - L1: bounded in-process map, FIFO eviction, TTL capped at 60 s, lazily
//!   expired on read.
//! - L2: shared key-value store with the caller's TTL.
//!
//! Tier failures never escape this module; only the fetch's own failure
//! propagates to the caller.

mod l2;

pub use l2::{KvError, MemoryKv, RedisKv, SharedKv};

use rand::Rng;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;

use crate::config::CacheConfig;

/// Outcome broadcast to single-flight followers.
#[derive(Clone)]
enum FlightOutcome {
    Hit(Value),
    Failed(String),
}

struct L1Entry {
    value: Value,
    expires_at: Instant,
}

/// FIFO-bounded L1 state. One mutex; every operation is a short map touch.
struct L1Inner {
    map: HashMap<String, L1Entry>,
    order: VecDeque<String>,
}

pub struct TieredCache {
    config: CacheConfig,
    l2: Arc<dyn SharedKv>,
    l1: Mutex<L1Inner>,
    inflight: dashmap::DashMap<String, watch::Receiver<Option<FlightOutcome>>>,
}

impl TieredCache {
    pub fn new(config: CacheConfig, l2: Arc<dyn SharedKv>) -> Self {
        Self {
            config,
            l2,
            l1: Mutex::new(L1Inner { map: HashMap::new(), order: VecDeque::new() }),
            inflight: dashmap::DashMap::new(),
        }
    }

    /// Look up `key`, or run `fetch` exactly once across all concurrent
    /// callers and populate both local and shared tiers.
    ///
    /// `ttl_s` applies to L2 (empty arrays get the shorter negative-result
    /// TTL); L1 is capped independently.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: &str,
        ttl_s: u64,
        fetch: F,
    ) -> Result<Value, anyhow::Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, anyhow::Error>>,
    {
        if key.is_empty() {
            anyhow::bail!("cache key must not be empty");
        }

        // L0: attach to an in-flight computation if one exists.
        if let Some(rx) = self.inflight.get(key).map(|e| e.value().clone()) {
            return self.await_flight(key, rx).await;
        }

        // L1.
        if let Some(value) = self.l1_get(key) {
            self.sampled_debug(key, "l1_hit");
            return Ok(value);
        }

        // L2, promoting hits to L1.
        match self.l2.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str::<Value>(&raw) {
                Ok(value) => {
                    self.sampled_debug(key, "l2_hit");
                    self.l1_put(key, value.clone());
                    return Ok(value);
                }
                Err(e) => {
                    tracing::warn!("cache_l2_error corrupt entry for {}: {}", key, e);
                }
            },
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("cache_l2_error get {}: {}", key, e);
            }
        }

        // Become the leader, unless someone beat us to it while we were in
        // the L1/L2 checks.
        let (tx, rx) = watch::channel(None);
        match self.inflight.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                let rx = existing.get().clone();
                drop(existing);
                return self.await_flight(key, rx).await;
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(rx);
            }
        }

        let result = fetch().await;

        // Terminal branch: publish to followers and release L0 before
        // returning anything.
        match &result {
            Ok(value) => {
                let _ = tx.send(Some(FlightOutcome::Hit(value.clone())));
                self.populate(key, value, ttl_s).await;
            }
            Err(e) => {
                let _ = tx.send(Some(FlightOutcome::Failed(e.to_string())));
            }
        }
        self.inflight.remove(key);

        result
    }

    /// Drop a key from both local tiers and the shared store.
    pub async fn invalidate(&self, key: &str) {
        {
            let mut l1 = self.l1.lock().expect("l1 mutex poisoned");
            l1.map.remove(key);
        }
        if let Err(e) = self.l2.del(key).await {
            tracing::warn!("cache_l2_error del {}: {}", key, e);
        }
    }

    async fn await_flight(
        &self,
        key: &str,
        mut rx: watch::Receiver<Option<FlightOutcome>>,
    ) -> Result<Value, anyhow::Error> {
        self.sampled_debug(key, "l0_join");
        loop {
            {
                let outcome = rx.borrow();
                match &*outcome {
                    Some(FlightOutcome::Hit(value)) => return Ok(value.clone()),
                    Some(FlightOutcome::Failed(msg)) => {
                        anyhow::bail!("shared fetch for '{key}' failed: {msg}")
                    }
                    None => {}
                }
            }
            if rx.changed().await.is_err() {
                // Leader vanished without publishing; treat as a miss and
                // let the caller's own fetch path run on retry.
                anyhow::bail!("shared fetch for '{key}' was abandoned");
            }
        }
    }

    async fn populate(&self, key: &str, value: &Value, ttl_s: u64) {
        let is_empty = matches!(value, Value::Array(items) if items.is_empty());
        let l1_ttl_s = if is_empty {
            self.config.l1_empty_ttl_s
        } else {
            self.config.l1_max_ttl_s
        };
        let l2_ttl_s = if is_empty {
            self.config.l2_empty_ttl_s
        } else {
            ttl_s
        };

        self.l1_put_with_ttl(key, value.clone(), Duration::from_secs(l1_ttl_s));

        match serde_json::to_string(value) {
            Ok(raw) => {
                if let Err(e) = self.l2.set_ex(key, &raw, l2_ttl_s).await {
                    tracing::warn!("cache_l2_error set {}: {}", key, e);
                }
            }
            Err(e) => tracing::warn!("cache_l2_error serialize {}: {}", key, e),
        }
    }

    fn l1_get(&self, key: &str) -> Option<Value> {
        let mut l1 = self.l1.lock().expect("l1 mutex poisoned");
        match l1.map.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                l1.map.remove(key);
                None
            }
            None => None,
        }
    }

    fn l1_put(&self, key: &str, value: Value) {
        self.l1_put_with_ttl(key, value, Duration::from_secs(self.config.l1_max_ttl_s));
    }

    fn l1_put_with_ttl(&self, key: &str, value: Value, ttl: Duration) {
        let ttl = ttl.min(Duration::from_secs(self.config.l1_max_ttl_s));
        let mut l1 = self.l1.lock().expect("l1 mutex poisoned");
        while l1.map.len() >= self.config.l1_max_entries {
            match l1.order.pop_front() {
                Some(oldest) => {
                    l1.map.remove(&oldest);
                }
                None => break,
            }
        }
        if l1.map
            .insert(key.to_string(), L1Entry { value, expires_at: Instant::now() + ttl })
            .is_none()
        {
            l1.order.push_back(key.to_string());
        }
    }

    fn sampled_debug(&self, key: &str, event: &str) {
        if rand::thread_rng().r#gen::<f64>() < self.config.sampling_rate {
            tracing::debug!("cache_{} key={}", event, key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn cache() -> TieredCache {
        TieredCache::new(CacheConfig::default(), Arc::new(MemoryKv::new()))
    }

    #[tokio::test]
    async fn fetch_populates_and_second_call_hits() {
        let cache = cache();
        let calls = AtomicU32::new(0);

        for _ in 0..2 {
            let value = cache
                .get_or_fetch("k", 900, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(json!({"hello": "world"}))
                })
                .await
                .unwrap();
            assert_eq!(value["hello"], "world");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_fetch() {
        let cache = Arc::new(cache());
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_fetch("shared", 900, || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(25)).await;
                        Ok(json!([1, 2, 3]))
                    })
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), json!([1, 2, 3]));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1, "fetch ran more than once");
    }

    #[tokio::test]
    async fn fetch_failure_propagates_and_releases_flight() {
        let cache = cache();
        let result = cache
            .get_or_fetch("bad", 900, || async { anyhow::bail!("upstream down") })
            .await;
        assert!(result.is_err());

        // The key is fetchable again immediately.
        let value = cache
            .get_or_fetch("bad", 900, || async { Ok(json!("recovered")) })
            .await
            .unwrap();
        assert_eq!(value, json!("recovered"));
    }

    #[tokio::test]
    async fn l2_failure_is_swallowed() {
        struct BrokenKv;
        #[async_trait::async_trait]
        impl SharedKv for BrokenKv {
            async fn get(&self, _: &str) -> Result<Option<String>, KvError> {
                Err(KvError::Connection("down".into()))
            }
            async fn set_ex(&self, _: &str, _: &str, _: u64) -> Result<(), KvError> {
                Err(KvError::Connection("down".into()))
            }
            async fn del(&self, _: &str) -> Result<(), KvError> {
                Err(KvError::Connection("down".into()))
            }
            async fn take(&self, _: &str) -> Result<Option<String>, KvError> {
                Err(KvError::Connection("down".into()))
            }
            async fn set_nx_ex(&self, _: &str, _: &str, _: u64) -> Result<bool, KvError> {
                Err(KvError::Connection("down".into()))
            }
            async fn keys_with_prefix(&self, _: &str) -> Result<Vec<String>, KvError> {
                Err(KvError::Connection("down".into()))
            }
        }

        let cache = TieredCache::new(CacheConfig::default(), Arc::new(BrokenKv));
        let value = cache
            .get_or_fetch("k", 900, || async { Ok(json!(7)) })
            .await
            .unwrap();
        assert_eq!(value, json!(7));
    }

    #[tokio::test]
    async fn l1_evicts_fifo_on_overflow() {
        let config = CacheConfig { l1_max_entries: 2, ..CacheConfig::default() };
        let kv = Arc::new(MemoryKv::new());
        let cache = TieredCache::new(config, kv.clone());

        for key in ["a", "b", "c"] {
            cache
                .get_or_fetch(key, 900, || async move { Ok(json!(key)) })
                .await
                .unwrap();
        }

        // "a" was evicted from L1; it still lives in L2, so the next read
        // promotes it without another fetch.
        assert!(cache.l1_get("a").is_none());
        assert!(cache.l1_get("c").is_some());
        let value = cache
            .get_or_fetch("a", 900, || async { anyhow::bail!("should not fetch") })
            .await
            .unwrap();
        assert_eq!(value, json!("a"));
    }

    #[tokio::test]
    async fn empty_arrays_get_short_ttls() {
        let cache = cache();
        cache
            .get_or_fetch("empty", 900, || async { Ok(json!([])) })
            .await
            .unwrap();
        // The entry is present now (short TTL, not zero).
        assert_eq!(cache.l1_get("empty"), Some(json!([])));
    }
}
