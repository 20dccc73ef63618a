//! Redis-backed token buckets shared by every process pointed at the same
//! server.
//!
//! Each key is a hash holding `start`, `interval` (ms), `size`, `available`
//! and `window`. Lua scripts read and update the hash atomically using the
//! server clock, so instances need not agree on wall time. Requires Redis 5
//! or later (effects replication for `TIME` inside scripts).
//!
//! Connections come from a `deadpool-redis` pool capped at
//! [`RedisConfig::max_pool`]. The pool dials lazily and validates idle
//! connections with a `PING` round trip when recycling them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use deadpool_redis::redis::{FromRedisValue, Script};
use deadpool_redis::{Pool, PoolConfig, Runtime};
use tracing::Instrument;

use super::config::RedisConfig;
use super::{validate_bucket, Budget, Store, TakeOutcome};
use crate::error::{RateLimitError, RateLimitResult};

const LOAD_BUCKET: &str = r"
local key = KEYS[1]
local clock = redis.call('TIME')
local now = tonumber(clock[1]) * 1000 + math.floor(tonumber(clock[2]) / 1000)
local state = redis.call('HMGET', key, 'start', 'interval', 'size', 'available', 'window')
local start = tonumber(state[1])
local interval = tonumber(state[2])
local size = tonumber(state[3])
local available = tonumber(state[4])
local window = tonumber(state[5])
";

const INIT_DEFAULT: &str = r"
if start == nil then
  start = now
  size = tonumber(ARGV[1])
  interval = tonumber(ARGV[2])
  available = size
  window = 0
end
local current = math.floor((now - start) / interval)
if current > window then
  available = size
  window = current
end
";

const STORE_BUCKET: &str = r"
redis.call('HSET', key, 'start', start, 'interval', interval, 'size', size, 'available', available, 'window', window)
redis.call('PEXPIRE', key, interval)
";

/// ARGV: default size, default interval ms. Returns size, remaining, reset ms, allowed.
const TAKE_BODY: &str = r"
local allowed = 0
if available > 0 then
  available = available - 1
  allowed = 1
end
local reset = start + (current + 1) * interval
";

/// ARGV: size, interval ms.
const SET_BODY: &str = r"
start = now
size = tonumber(ARGV[1])
interval = tonumber(ARGV[2])
available = size
window = 0
";

/// ARGV: default size, default interval ms, extra tokens.
const BURST_BODY: &str = r"
available = available + tonumber(ARGV[3])
";

const GET_BODY: &str = r"
if start == nil then
  return nil
end
if math.floor((now - start) / interval) > window then
  available = size
end
return {size, available}
";

fn take_script() -> Script {
    Script::new(&format!(
        "{LOAD_BUCKET}{INIT_DEFAULT}{TAKE_BODY}{STORE_BUCKET}return {{size, available, reset, allowed}}"
    ))
}

fn set_script() -> Script {
    Script::new(&format!("{LOAD_BUCKET}{SET_BODY}{STORE_BUCKET}return 1"))
}

fn burst_script() -> Script {
    Script::new(&format!(
        "{LOAD_BUCKET}{INIT_DEFAULT}{BURST_BODY}{STORE_BUCKET}return available"
    ))
}

fn get_script() -> Script {
    Script::new(&format!("{LOAD_BUCKET}{GET_BODY}"))
}

fn interval_millis(interval: Duration) -> u64 {
    u64::try_from(interval.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Creates the connection pool for `config` without dialing.
fn build_pool(config: &RedisConfig) -> RateLimitResult<Pool> {
    if config.max_pool == 0 {
        return Err(RateLimitError::InvalidConfig(
            "redis max_pool must be greater than zero".to_string(),
        ));
    }
    if !config.username.is_empty() {
        tracing::warn!(
            "Redis username {:?} is configured but not used; authenticating with password only",
            config.username
        );
    }

    let mut pool_config = deadpool_redis::Config::from_url(config.connection_url()?);
    pool_config.pool = Some(PoolConfig::new(config.max_pool));
    let pool = pool_config.create_pool(Some(Runtime::Tokio1))?;

    tracing::info!(
        "Redis pool configured for {} (max_pool: {})",
        config.addr(),
        config.max_pool
    );
    Ok(pool)
}

/// Redis [`Store`].
pub struct RedisStore {
    pool: Pool,
    tokens: u64,
    interval_ms: u64,
    take: Script,
    get: Script,
    set: Script,
    burst: Script,
    closed: AtomicBool,
}

impl RedisStore {
    /// Creates a store whose buckets hold `tokens` tokens per `interval`,
    /// kept on the server described by `config`.
    ///
    /// # Errors
    ///
    /// - [`RateLimitError::InvalidConfig`] for zero tokens, interval or pool size.
    /// - [`RateLimitError::CreatePool`] when the pool cannot be built.
    pub fn new(tokens: u64, interval: Duration, config: &RedisConfig) -> RateLimitResult<Self> {
        validate_bucket(tokens, interval)?;
        let pool = build_pool(config)?;

        Ok(Self {
            pool,
            tokens,
            interval_ms: interval_millis(interval),
            take: take_script(),
            get: get_script(),
            set: set_script(),
            burst: burst_script(),
            closed: AtomicBool::new(false),
        })
    }

    /// Maximum number of pooled connections.
    pub fn pool_max_size(&self) -> usize {
        self.pool.status().max_size
    }

    fn ensure_open(&self) -> RateLimitResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RateLimitError::Closed);
        }
        Ok(())
    }

    async fn invoke<T>(
        &self,
        op: &'static str,
        script: &Script,
        key: &str,
        args: &[u64],
    ) -> RateLimitResult<T>
    where
        T: FromRedisValue + Send,
    {
        self.ensure_open()?;

        let span = tracing::debug_span!("redis", span.type = "DB", op, key);
        async {
            let mut conn = self.pool.get().await?;
            let mut invocation = script.prepare_invoke();
            invocation.key(key);
            for arg in args {
                invocation.arg(*arg);
            }
            let value: T = invocation.invoke_async(&mut conn).await?;
            Ok(value)
        }
        .instrument(span)
        .await
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn take(&self, key: &str) -> RateLimitResult<TakeOutcome> {
        let (limit, remaining, reset_ms, allowed): (u64, u64, u64, u8) = self
            .invoke("take", &self.take, key, &[self.tokens, self.interval_ms])
            .await?;

        Ok(TakeOutcome {
            limit,
            remaining,
            reset: SystemTime::UNIX_EPOCH + Duration::from_millis(reset_ms),
            allowed: allowed == 1,
        })
    }

    async fn get(&self, key: &str) -> RateLimitResult<Option<Budget>> {
        let state: Option<(u64, u64)> = self.invoke("get", &self.get, key, &[]).await?;
        Ok(state.map(|(limit, remaining)| Budget { limit, remaining }))
    }

    async fn set(&self, key: &str, tokens: u64, interval: Duration) -> RateLimitResult<()> {
        validate_bucket(tokens, interval)?;
        let _: u8 = self
            .invoke("set", &self.set, key, &[tokens, interval_millis(interval)])
            .await?;
        Ok(())
    }

    async fn burst(&self, key: &str, tokens: u64) -> RateLimitResult<()> {
        let available: u64 = self
            .invoke("burst", &self.burst, key, &[self.tokens, self.interval_ms, tokens])
            .await?;
        tracing::debug!("Burst {key}: {available} tokens available");
        Ok(())
    }

    async fn close(&self) -> RateLimitResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.pool.close();
        tracing::debug!("Redis rate limit store closed");
        Ok(())
    }
}
