//! Error types for `realmgate-core`.
//!
//! Rate limiting operations return [`RateLimitResult<T>`]; persistence
//! operations return [`DbResult<T>`].

use deadpool_redis::redis::RedisError;

/// Errors raised while building or using a rate limiting store.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// The configured backend name is not one of `NOOP`, `MEMORY`, `REDIS`.
    #[error("unknown rate limiter type: {0}")]
    UnknownType(String),

    /// The configuration cannot produce a working store (zero tokens, etc.).
    #[error("invalid rate limit config: {0}")]
    InvalidConfig(String),

    /// A configuration key held a value that could not be parsed.
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    /// The store was closed and can no longer serve requests.
    #[error("rate limit store is closed")]
    Closed,

    /// A Redis command or script failed.
    #[error("redis error: {0}")]
    Redis(#[from] RedisError),

    /// No pooled Redis connection could be obtained.
    #[error("redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    /// The Redis pool could not be created from its configuration.
    #[error("redis pool config error: {0}")]
    CreatePool(#[from] deadpool_redis::CreatePoolError),
}

/// Convenience alias for rate limiting operations.
pub type RateLimitResult<T> = Result<T, RateLimitError>;

/// Errors surfaced by the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("realm not found: {0}")]
    RealmNotFound(u64),

    /// The backing store could not complete the operation.
    #[error("database unavailable: {0}")]
    Unavailable(String),
}

/// Convenience alias for persistence operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_type_names_the_value() {
        let err = RateLimitError::UnknownType("BOGUS".to_string());
        assert_eq!(err.to_string(), "unknown rate limiter type: BOGUS");
    }

    #[test]
    fn invalid_value_names_key_and_value() {
        let err = RateLimitError::InvalidValue {
            key: "RATE_LIMIT_TOKENS".to_string(),
            value: "lots".to_string(),
        };
        assert_eq!(err.to_string(), "invalid value for RATE_LIMIT_TOKENS: \"lots\"");
    }

    #[test]
    fn closed_displays_message() {
        assert_eq!(RateLimitError::Closed.to_string(), "rate limit store is closed");
    }

    #[test]
    fn user_not_found_displays_email() {
        let err = DbError::UserNotFound("alice@example.com".to_string());
        assert_eq!(err.to_string(), "user not found: alice@example.com");
    }

    #[test]
    fn realm_not_found_displays_id() {
        assert_eq!(DbError::RealmNotFound(7).to_string(), "realm not found: 7");
    }

    #[test]
    fn error_is_debug() {
        let debug = format!("{:?}", DbError::Unavailable("down".to_string()));
        assert!(debug.contains("Unavailable"));
    }
}
