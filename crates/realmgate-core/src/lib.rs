//! realmgate core library.
//!
//! - [`ratelimit`]: token-bucket stores (no-op, in-memory, Redis) and the
//!   configuration-driven factory [`rate_limiter_for`].
//! - [`model`]: [`User`] and [`Realm`].
//! - [`db`]: the [`Database`] persistence seam and [`MemoryDatabase`].
//! - [`error`]: [`RateLimitError`] and [`DbError`] with their result aliases.

pub mod db;
pub mod error;
pub mod model;
pub mod ratelimit;

pub use db::{Database, MemoryDatabase};
pub use error::{DbError, DbResult, RateLimitError, RateLimitResult};
pub use model::{Realm, User};
pub use ratelimit::{
    rate_limiter_for, Budget, Config as RateLimitConfig, RateLimitType, RedisConfig, Store,
    TakeOutcome,
};
