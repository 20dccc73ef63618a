//! Process-local token buckets.
//!
//! State lives in a [`DashMap`] keyed by the caller's key; concurrent takes on
//! the same key serialize on the map's shard lock. Nothing survives a restart
//! and nothing is shared between processes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::task::JoinHandle;

use super::{validate_bucket, Budget, Store, TakeOutcome};
use crate::error::{RateLimitError, RateLimitResult};

/// How often idle buckets are swept.
const SWEEP_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

/// Minimum idle time before a bucket is evicted.
const SWEEP_MIN_TTL: Duration = Duration::from_secs(12 * 60 * 60);

#[derive(Debug, Clone)]
struct Bucket {
    start: Instant,
    interval: Duration,
    size: u64,
    available: u64,
    window: u64,
    last_seen: Instant,
}

impl Bucket {
    fn new(size: u64, interval: Duration, now: Instant) -> Self {
        Self {
            start: now,
            interval,
            size,
            available: size,
            window: 0,
            last_seen: now,
        }
    }

    fn window_at(&self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.start).as_nanos();
        (elapsed / self.interval.as_nanos()) as u64
    }

    /// Refills to `size` once `now` has entered a later window.
    fn refill(&mut self, now: Instant) {
        let window = self.window_at(now);
        if window > self.window {
            self.available = self.size;
            self.window = window;
        }
    }

    /// Time left until the current window ends.
    fn reset_in(&self, now: Instant) -> Duration {
        let elapsed = now.saturating_duration_since(self.start).as_nanos();
        let into_window = elapsed % self.interval.as_nanos();
        self.interval
            .saturating_sub(Duration::from_nanos(into_window as u64))
    }

    fn take(&mut self, now: Instant) -> bool {
        self.refill(now);
        self.last_seen = now;
        if self.available > 0 {
            self.available -= 1;
            true
        } else {
            false
        }
    }

    fn is_idle(&self, now: Instant) -> bool {
        let ttl = self.interval.max(SWEEP_MIN_TTL);
        now.saturating_duration_since(self.last_seen) > ttl
    }
}

/// Removes idle buckets and returns how many were dropped.
fn sweep(buckets: &DashMap<String, Bucket>, now: Instant) -> usize {
    let before = buckets.len();
    buckets.retain(|_, bucket| !bucket.is_idle(now));
    before.saturating_sub(buckets.len())
}

/// In-memory [`Store`].
pub struct MemoryStore {
    tokens: u64,
    interval: Duration,
    buckets: Arc<DashMap<String, Bucket>>,
    closed: AtomicBool,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryStore {
    /// Creates a store whose buckets hold `tokens` tokens per `interval`.
    ///
    /// When called inside a tokio runtime a background task evicts idle
    /// buckets every few hours.
    ///
    /// # Errors
    ///
    /// [`RateLimitError::InvalidConfig`] when `tokens` or `interval` is zero.
    pub fn new(tokens: u64, interval: Duration) -> RateLimitResult<Self> {
        validate_bucket(tokens, interval)?;

        let buckets = Arc::new(DashMap::new());
        let sweeper = tokio::runtime::Handle::try_current().ok().map(|handle| {
            let buckets = Arc::clone(&buckets);
            handle.spawn(async move {
                let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    let removed = sweep(&buckets, Instant::now());
                    if removed > 0 {
                        tracing::debug!("Swept {removed} idle rate limit buckets");
                    }
                }
            })
        });
        if sweeper.is_none() {
            tracing::warn!("No tokio runtime; idle rate limit buckets will not be swept");
        }

        Ok(Self {
            tokens,
            interval,
            buckets,
            closed: AtomicBool::new(false),
            sweeper: Mutex::new(sweeper),
        })
    }

    fn ensure_open(&self) -> RateLimitResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RateLimitError::Closed);
        }
        Ok(())
    }

    fn stop_sweeper(&self) {
        if let Ok(mut guard) = self.sweeper.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }

    fn take_at(&self, key: &str, now: Instant) -> TakeOutcome {
        let mut bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket::new(self.tokens, self.interval, now));
        let allowed = bucket.take(now);
        TakeOutcome {
            limit: bucket.size,
            remaining: bucket.available,
            reset: SystemTime::now() + bucket.reset_in(now),
            allowed,
        }
    }

    fn burst_at(&self, key: &str, tokens: u64, now: Instant) {
        let mut bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket::new(self.tokens, self.interval, now));
        bucket.refill(now);
        bucket.last_seen = now;
        bucket.available = bucket.available.saturating_add(tokens);
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        self.stop_sweeper();
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn take(&self, key: &str) -> RateLimitResult<TakeOutcome> {
        self.ensure_open()?;
        Ok(self.take_at(key, Instant::now()))
    }

    async fn get(&self, key: &str) -> RateLimitResult<Option<Budget>> {
        self.ensure_open()?;
        let now = Instant::now();
        Ok(self.buckets.get_mut(key).map(|mut bucket| {
            bucket.refill(now);
            Budget {
                limit: bucket.size,
                remaining: bucket.available,
            }
        }))
    }

    async fn set(&self, key: &str, tokens: u64, interval: Duration) -> RateLimitResult<()> {
        self.ensure_open()?;
        validate_bucket(tokens, interval)?;
        self.buckets
            .insert(key.to_string(), Bucket::new(tokens, interval, Instant::now()));
        Ok(())
    }

    async fn burst(&self, key: &str, tokens: u64) -> RateLimitResult<()> {
        self.ensure_open()?;
        self.burst_at(key, tokens, Instant::now());
        Ok(())
    }

    async fn close(&self) -> RateLimitResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.stop_sweeper();
        self.buckets.clear();
        tracing::debug!("Memory rate limit store closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn bucket_starts_full_and_drains() {
        let t0 = Instant::now();
        let mut bucket = Bucket::new(3, MINUTE, t0);

        assert!(bucket.take(t0));
        assert!(bucket.take(t0));
        assert!(bucket.take(t0));
        assert!(!bucket.take(t0));
        assert_eq!(bucket.available, 0);
    }

    #[test]
    fn bucket_refills_at_window_boundary() {
        let t0 = Instant::now();
        let mut bucket = Bucket::new(2, MINUTE, t0);
        bucket.take(t0);
        bucket.take(t0);

        assert!(!bucket.take(t0 + Duration::from_secs(59)));
        assert!(bucket.take(t0 + MINUTE));
        assert_eq!(bucket.available, 1);
    }

    #[test]
    fn bucket_refill_does_not_accumulate_across_windows() {
        let t0 = Instant::now();
        let mut bucket = Bucket::new(2, MINUTE, t0);

        assert!(bucket.take(t0 + MINUTE * 5));
        assert_eq!(bucket.available, 1);
    }

    #[test]
    fn bucket_reset_is_end_of_window() {
        let t0 = Instant::now();
        let bucket = Bucket::new(1, MINUTE, t0);

        assert_eq!(bucket.reset_in(t0), MINUTE);
        assert_eq!(bucket.reset_in(t0 + Duration::from_secs(45)), Duration::from_secs(15));
        assert_eq!(bucket.reset_in(t0 + Duration::from_secs(75)), Duration::from_secs(45));
    }

    #[test]
    fn sweep_evicts_only_idle_buckets() {
        let t0 = Instant::now();
        let buckets = DashMap::new();
        buckets.insert("idle".to_string(), Bucket::new(1, MINUTE, t0));
        buckets.insert(
            "long-interval".to_string(),
            Bucket::new(1, Duration::from_secs(48 * 3600), t0),
        );
        buckets.insert(
            "recent".to_string(),
            Bucket::new(1, MINUTE, t0 + Duration::from_secs(12 * 3600)),
        );

        let removed = sweep(&buckets, t0 + Duration::from_secs(13 * 3600));

        assert_eq!(removed, 1);
        assert!(!buckets.contains_key("idle"));
        assert!(buckets.contains_key("long-interval"));
        assert!(buckets.contains_key("recent"));
    }

    #[test]
    fn new_rejects_zero_tokens() {
        let err = MemoryStore::new(0, MINUTE).err().unwrap();
        assert!(matches!(err, RateLimitError::InvalidConfig(_)));
    }

    #[test]
    fn new_without_runtime_has_no_sweeper() {
        let store = MemoryStore::new(1, MINUTE).unwrap();
        assert!(store.sweeper.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let store = MemoryStore::new(1, MINUTE).unwrap();

        assert!(store.take("a").await.unwrap().allowed);
        assert!(!store.take("a").await.unwrap().allowed);
        assert!(store.take("b").await.unwrap().allowed);
    }

    #[tokio::test]
    async fn take_reports_limit_remaining_and_reset() {
        let store = MemoryStore::new(5, MINUTE).unwrap();
        let before = SystemTime::now();

        let outcome = store.take("client").await.unwrap();

        assert!(outcome.allowed);
        assert_eq!(outcome.limit, 5);
        assert_eq!(outcome.remaining, 4);
        assert!(outcome.reset > before);
        assert!(outcome.reset <= SystemTime::now() + MINUTE);
    }

    #[tokio::test]
    async fn tokens_return_after_interval() {
        let store = MemoryStore::new(1, Duration::from_millis(50)).unwrap();

        assert!(store.take("client").await.unwrap().allowed);
        assert!(!store.take("client").await.unwrap().allowed);
        tokio::time::sleep(Duration::from_millis(70)).await;
        assert!(store.take("client").await.unwrap().allowed);
    }

    #[tokio::test]
    async fn get_does_not_consume() {
        let store = MemoryStore::new(3, MINUTE).unwrap();
        assert_eq!(store.get("client").await.unwrap(), None);

        store.take("client").await.unwrap();
        let budget = store.get("client").await.unwrap().unwrap();
        assert_eq!(budget, Budget { limit: 3, remaining: 2 });
        assert_eq!(store.get("client").await.unwrap(), Some(budget));
    }

    #[tokio::test]
    async fn set_replaces_bucket() {
        let store = MemoryStore::new(1, MINUTE).unwrap();
        store.take("vip").await.unwrap();

        store.set("vip", 10, MINUTE).await.unwrap();

        let outcome = store.take("vip").await.unwrap();
        assert!(outcome.allowed);
        assert_eq!(outcome.limit, 10);
        assert_eq!(outcome.remaining, 9);
    }

    #[tokio::test]
    async fn set_rejects_zero_interval() {
        let store = MemoryStore::new(1, MINUTE).unwrap();
        assert!(store.set("vip", 1, Duration::ZERO).await.is_err());
    }

    #[tokio::test]
    async fn burst_exceeds_bucket_size() {
        let store = MemoryStore::new(1, MINUTE).unwrap();
        store.take("client").await.unwrap();

        store.burst("client", 2).await.unwrap();

        assert!(store.take("client").await.unwrap().allowed);
        assert!(store.take("client").await.unwrap().allowed);
        assert!(!store.take("client").await.unwrap().allowed);
    }

    #[tokio::test]
    async fn burst_on_unknown_key_adds_to_default_bucket() {
        let store = MemoryStore::new(2, MINUTE).unwrap();
        store.burst("new", 3).await.unwrap();

        let budget = store.get("new").await.unwrap().unwrap();
        assert_eq!(budget, Budget { limit: 2, remaining: 5 });
    }

    #[tokio::test]
    async fn close_stops_sweeper_and_rejects_calls() {
        let store = MemoryStore::new(1, MINUTE).unwrap();
        assert!(store.sweeper.lock().unwrap().is_some());

        store.close().await.unwrap();
        store.close().await.unwrap();

        assert!(store.sweeper.lock().unwrap().is_none());
        assert!(matches!(store.take("client").await, Err(RateLimitError::Closed)));
        assert!(matches!(store.burst("client", 1).await, Err(RateLimitError::Closed)));
    }

    #[tokio::test]
    async fn drop_aborts_sweeper() {
        let store = MemoryStore::new(1, MINUTE).unwrap();
        let sweeper = store.sweeper.lock().unwrap().as_ref().unwrap().abort_handle();
        let buckets = Arc::clone(&store.buckets);
        assert_eq!(Arc::strong_count(&buckets), 3);

        drop(store);
        for _ in 0..100 {
            if sweeper.is_finished() {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert!(sweeper.is_finished());
        assert_eq!(Arc::strong_count(&buckets), 1);
    }

    #[tokio::test]
    async fn burst_keeps_bucket_from_being_swept() {
        let store = MemoryStore::new(1, MINUTE).unwrap();
        let t0 = Instant::now();
        store.take_at("client", t0);

        store.burst_at("client", 5, t0 + Duration::from_secs(10 * 3600));
        let removed = sweep(&store.buckets, t0 + Duration::from_secs(13 * 3600));

        assert_eq!(removed, 0);
        assert_eq!(store.buckets.get("client").unwrap().available, 6);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_takes_never_overspend() {
        let store = Arc::new(MemoryStore::new(20, MINUTE).unwrap());

        let handles: Vec<_> = (0..100)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.take("shared").await.unwrap().allowed })
            })
            .collect();

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 20);
    }
}
