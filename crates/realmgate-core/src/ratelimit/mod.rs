//! Token-bucket rate limiting with pluggable storage.
//!
//! A [`Store`] hands out one token per call to [`Store::take`] for a given
//! key. Every bucket holds `tokens` tokens and refills completely at each
//! `interval` boundary counted from the bucket's first use.
//!
//! [`rate_limiter_for`] maps a [`Config`] to one of three backends:
//!
//! - [`NoopStore`]: never denies.
//! - [`MemoryStore`]: process-local buckets.
//! - [`RedisStore`]: buckets shared through a Redis server.

pub mod config;
pub mod memory;
pub mod noop;
pub mod redis;

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;

use crate::error::RateLimitResult;

pub use config::{Config, RateLimitType, RedisConfig};
pub use memory::MemoryStore;
pub use noop::NoopStore;
pub use redis::RedisStore;

/// Outcome of a single [`Store::take`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TakeOutcome {
    /// Bucket size for the key.
    pub limit: u64,
    /// Tokens left after this call.
    pub remaining: u64,
    /// When the bucket next refills.
    pub reset: SystemTime,
    /// Whether a token was consumed.
    pub allowed: bool,
}

/// Snapshot of a key's bucket returned by [`Store::get`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    pub limit: u64,
    pub remaining: u64,
}

/// Check-and-consume rate limiting capability shared by all requests.
#[async_trait]
pub trait Store: Send + Sync {
    /// Consumes one token for `key`, creating a full bucket on first use.
    async fn take(&self, key: &str) -> RateLimitResult<TakeOutcome>;

    /// Inspects `key` without consuming. `None` when the key has no bucket.
    async fn get(&self, key: &str) -> RateLimitResult<Option<Budget>>;

    /// Replaces the bucket for `key` with a full one of the given size and
    /// interval.
    async fn set(&self, key: &str, tokens: u64, interval: Duration) -> RateLimitResult<()>;

    /// Adds `tokens` to the current budget of `key`. The extra tokens may
    /// exceed the bucket size and last until the next refill.
    async fn burst(&self, key: &str, tokens: u64) -> RateLimitResult<()>;

    /// Releases the store's resources. Every later call fails with
    /// [`RateLimitError::Closed`](crate::RateLimitError::Closed).
    async fn close(&self) -> RateLimitResult<()>;
}

/// Builds the store selected by `config.kind`.
///
/// # Errors
///
/// - [`RateLimitError::InvalidConfig`](crate::RateLimitError::InvalidConfig)
///   when the memory or Redis backend is given zero tokens or a zero interval.
/// - Redis pool construction errors are returned unchanged.
pub fn rate_limiter_for(config: &Config) -> RateLimitResult<Arc<dyn Store>> {
    let store: Arc<dyn Store> = match config.kind {
        RateLimitType::Noop => Arc::new(NoopStore::new()),
        RateLimitType::Memory => Arc::new(MemoryStore::new(config.tokens, config.interval)?),
        RateLimitType::Redis => {
            Arc::new(RedisStore::new(config.tokens, config.interval, &config.redis)?)
        }
    };

    tracing::info!(
        "Rate limiter ready: type={}, tokens={}, interval={:?}",
        config.kind,
        config.tokens,
        config.interval
    );
    Ok(store)
}

/// Shared validation for the backends that actually count tokens.
pub(crate) fn validate_bucket(tokens: u64, interval: Duration) -> RateLimitResult<()> {
    if tokens == 0 {
        return Err(crate::RateLimitError::InvalidConfig(
            "tokens must be greater than zero".to_string(),
        ));
    }
    if interval.is_zero() {
        return Err(crate::RateLimitError::InvalidConfig(
            "interval must be greater than zero".to_string(),
        ));
    }
    Ok(())
}
