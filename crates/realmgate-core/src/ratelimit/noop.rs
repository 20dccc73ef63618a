//! Pass-through store that never denies.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;

use super::{Budget, Store, TakeOutcome};
use crate::error::{RateLimitError, RateLimitResult};

/// Always reports capacity. Reports a limit of zero, which callers treat as
/// "unlimited".
#[derive(Debug, Default)]
pub struct NoopStore {
    closed: AtomicBool,
}

impl NoopStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> RateLimitResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RateLimitError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl Store for NoopStore {
    async fn take(&self, _key: &str) -> RateLimitResult<TakeOutcome> {
        self.ensure_open()?;
        Ok(TakeOutcome {
            limit: 0,
            remaining: 0,
            reset: SystemTime::UNIX_EPOCH,
            allowed: true,
        })
    }

    async fn get(&self, _key: &str) -> RateLimitResult<Option<Budget>> {
        self.ensure_open()?;
        Ok(None)
    }

    async fn set(&self, _key: &str, _tokens: u64, _interval: Duration) -> RateLimitResult<()> {
        self.ensure_open()
    }

    async fn burst(&self, _key: &str, _tokens: u64) -> RateLimitResult<()> {
        self.ensure_open()
    }

    async fn close(&self) -> RateLimitResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
