//! Rate limiting configuration.
//!
//! A [`Config`] can be deserialized from the `[rate_limit]` table of a TOML
//! file and/or read from environment-style keys:
//!
//! | Key                   | Default     |
//! |-----------------------|-------------|
//! | `RATE_LIMIT_TYPE`     | `NOOP`      |
//! | `RATE_LIMIT_TOKENS`   | `60`        |
//! | `RATE_LIMIT_INTERVAL` | `1m`        |
//! | `REDIS_HOST`          | `127.0.0.1` |
//! | `REDIS_PORT`          | `6379`      |
//! | `REDIS_USERNAME`      | (empty)     |
//! | `REDIS_PASSWORD`      | (empty)     |
//! | `REDIS_MAX_POOL`      | `64`        |
//!
//! Empty values are treated as unset.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::{RateLimitError, RateLimitResult};

pub const ENV_TYPE: &str = "RATE_LIMIT_TYPE";
pub const ENV_TOKENS: &str = "RATE_LIMIT_TOKENS";
pub const ENV_INTERVAL: &str = "RATE_LIMIT_INTERVAL";
pub const ENV_REDIS_HOST: &str = "REDIS_HOST";
pub const ENV_REDIS_PORT: &str = "REDIS_PORT";
pub const ENV_REDIS_USERNAME: &str = "REDIS_USERNAME";
pub const ENV_REDIS_PASSWORD: &str = "REDIS_PASSWORD";
pub const ENV_REDIS_MAX_POOL: &str = "REDIS_MAX_POOL";

/// Which store backend the factory builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum RateLimitType {
    /// Never denies.
    #[default]
    Noop,
    /// Process-local buckets; single-instance deployments only.
    Memory,
    /// Buckets shared through Redis by every instance using the same server.
    Redis,
}

impl RateLimitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitType::Noop => "NOOP",
            RateLimitType::Memory => "MEMORY",
            RateLimitType::Redis => "REDIS",
        }
    }
}

impl fmt::Display for RateLimitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RateLimitType {
    type Err = RateLimitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NOOP" => Ok(RateLimitType::Noop),
            "MEMORY" => Ok(RateLimitType::Memory),
            "REDIS" => Ok(RateLimitType::Redis),
            _ => Err(RateLimitError::UnknownType(s.to_string())),
        }
    }
}

impl TryFrom<String> for RateLimitType {
    type Error = RateLimitError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Rate limiting configuration shared by every backend.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    #[serde(rename = "type", default)]
    pub kind: RateLimitType,
    /// Bucket size per interval.
    #[serde(default = "default_tokens")]
    pub tokens: u64,
    /// Refill period.
    #[serde(default = "default_interval", deserialize_with = "deserialize_interval")]
    pub interval: Duration,
    /// Only consulted when `kind` is [`RateLimitType::Redis`].
    #[serde(default)]
    pub redis: RedisConfig,
}

/// Connection settings for the Redis backend.
#[derive(Clone, PartialEq, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_host")]
    pub host: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Upper bound on concurrently open pooled connections.
    #[serde(default = "default_redis_max_pool")]
    pub max_pool: usize,
}

fn default_tokens() -> u64 { 60 }
fn default_interval() -> Duration { Duration::from_secs(60) }
fn default_redis_host() -> String { "127.0.0.1".to_string() }
fn default_redis_port() -> u16 { 6379 }
fn default_redis_max_pool() -> usize { 64 }

impl Default for Config {
    fn default() -> Self {
        Self {
            kind: RateLimitType::default(),
            tokens: default_tokens(),
            interval: default_interval(),
            redis: RedisConfig::default(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: default_redis_host(),
            port: default_redis_port(),
            username: String::new(),
            password: String::new(),
            max_pool: default_redis_max_pool(),
        }
    }
}

impl fmt::Debug for RedisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &if self.password.is_empty() { "" } else { "<redacted>" })
            .field("max_pool", &self.max_pool)
            .finish()
    }
}

impl RedisConfig {
    /// The dial address, `host:port`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Builds the `redis://` URL handed to the connection pool.
    ///
    /// The password is percent-encoded into the URL when set. The username is
    /// not part of the URL; see [`RedisConfig::username`] handling in the
    /// Redis store.
    pub fn connection_url(&self) -> RateLimitResult<String> {
        let raw = format!("redis://{}", self.addr());
        let mut url = url::Url::parse(&raw)
            .map_err(|e| RateLimitError::InvalidConfig(format!("bad redis address {raw}: {e}")))?;
        if !self.password.is_empty() {
            url.set_password(Some(&self.password)).map_err(|_| {
                RateLimitError::InvalidConfig("redis url cannot carry a password".to_string())
            })?;
        }
        Ok(url.to_string())
    }
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> RateLimitResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from defaults plus whatever `lookup` returns.
    pub fn from_lookup<F>(lookup: F) -> RateLimitResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.apply_overrides(lookup)?;
        Ok(config)
    }

    /// Overrides fields for which `lookup` yields a non-empty value.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> RateLimitResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_TYPE) {
            self.kind = v.parse()?;
        }
        if let Some(v) = get(ENV_TOKENS) {
            self.tokens = parse_number(ENV_TOKENS, &v)?;
        }
        if let Some(v) = get(ENV_INTERVAL) {
            self.interval = parse_duration(&v).ok_or_else(|| invalid(ENV_INTERVAL, &v))?;
        }
        if let Some(v) = get(ENV_REDIS_HOST) {
            self.redis.host = v;
        }
        if let Some(v) = get(ENV_REDIS_PORT) {
            self.redis.port = parse_number(ENV_REDIS_PORT, &v)?;
        }
        if let Some(v) = get(ENV_REDIS_USERNAME) {
            self.redis.username = v;
        }
        if let Some(v) = get(ENV_REDIS_PASSWORD) {
            self.redis.password = v;
        }
        if let Some(v) = get(ENV_REDIS_MAX_POOL) {
            self.redis.max_pool = parse_number(ENV_REDIS_MAX_POOL, &v)?;
        }
        Ok(())
    }
}

fn invalid(key: &str, value: &str) -> RateLimitError {
    RateLimitError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> RateLimitResult<T> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

fn deserialize_interval<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid duration: {raw:?}")))
}

/// Parses a duration written as a sequence of decimal numbers with unit
/// suffixes, e.g. `1m`, `1.5h`, `1h30m`, `250ms`. Accepted units are `ns`,
/// `us` (or `µs`), `ms`, `s`, `m` and `h`. A bare `0` is zero.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let s = input.trim();
    if s == "0" {
        return Some(Duration::ZERO);
    }
    if s.is_empty() {
        return None;
    }

    let mut total_nanos: f64 = 0.0;
    let mut rest = s;
    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_end == 0 {
            return None;
        }
        let value: f64 = rest[..num_end].parse().ok()?;
        rest = &rest[num_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_end] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60.0 * 1e9,
            "h" => 3600.0 * 1e9,
            _ => return None,
        };
        rest = &rest[unit_end..];
        total_nanos += value * scale;
    }

    if !total_nanos.is_finite() || total_nanos > u64::MAX as f64 {
        return None;
    }
    Some(Duration::from_nanos(total_nanos.round() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();

        assert_eq!(config.kind, RateLimitType::Noop);
        assert_eq!(config.tokens, 60);
        assert_eq!(config.interval, Duration::from_secs(60));
        assert_eq!(config.redis.host, "127.0.0.1");
        assert_eq!(config.redis.port, 6379);
        assert!(config.redis.username.is_empty());
        assert!(config.redis.password.is_empty());
        assert_eq!(config.redis.max_pool, 64);
    }

    #[test]
    fn empty_lookup_yields_defaults() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn lookup_overrides_every_field() {
        let config = Config::from_lookup(lookup_from(&[
            (ENV_TYPE, "redis"),
            (ENV_TOKENS, "10"),
            (ENV_INTERVAL, "30s"),
            (ENV_REDIS_HOST, "cache.internal"),
            (ENV_REDIS_PORT, "6380"),
            (ENV_REDIS_USERNAME, "limiter"),
            (ENV_REDIS_PASSWORD, "hunter2"),
            (ENV_REDIS_MAX_POOL, "8"),
        ]))
        .unwrap();

        assert_eq!(config.kind, RateLimitType::Redis);
        assert_eq!(config.tokens, 10);
        assert_eq!(config.interval, Duration::from_secs(30));
        assert_eq!(config.redis.host, "cache.internal");
        assert_eq!(config.redis.port, 6380);
        assert_eq!(config.redis.username, "limiter");
        assert_eq!(config.redis.password, "hunter2");
        assert_eq!(config.redis.max_pool, 8);
    }

    #[test]
    fn empty_values_are_ignored() {
        let config = Config::from_lookup(lookup_from(&[(ENV_TYPE, ""), (ENV_TOKENS, "  ")])).unwrap();
        assert_eq!(config.kind, RateLimitType::Noop);
        assert_eq!(config.tokens, 60);
    }

    #[test]
    fn unknown_type_is_rejected_with_value() {
        let err = Config::from_lookup(lookup_from(&[(ENV_TYPE, "MEMCACHED")])).unwrap_err();
        assert!(matches!(err, RateLimitError::UnknownType(_)));
        assert!(err.to_string().contains("MEMCACHED"));
    }

    #[test]
    fn malformed_number_names_the_key() {
        let err = Config::from_lookup(lookup_from(&[(ENV_REDIS_PORT, "eighty")])).unwrap_err();
        assert!(err.to_string().contains(ENV_REDIS_PORT));
    }

    #[test]
    fn malformed_interval_is_rejected() {
        let err = Config::from_lookup(lookup_from(&[(ENV_INTERVAL, "soon")])).unwrap_err();
        assert!(matches!(err, RateLimitError::InvalidValue { .. }));
    }

    #[test]
    fn type_parsing_is_case_insensitive() {
        assert_eq!("Memory".parse::<RateLimitType>().unwrap(), RateLimitType::Memory);
        assert_eq!(" NOOP ".parse::<RateLimitType>().unwrap(), RateLimitType::Noop);
        assert_eq!(RateLimitType::Redis.to_string(), "REDIS");
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("1m"), Some(Duration::from_secs(60)));
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("1h30m"), Some(Duration::from_secs(5400)));
        assert_eq!(parse_duration("1.5s"), Some(Duration::from_millis(1500)));
        assert_eq!(parse_duration("10us"), Some(Duration::from_micros(10)));
        assert_eq!(parse_duration("0"), Some(Duration::ZERO));
    }

    #[test]
    fn parse_duration_rejects_garbage() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("60"), None);
        assert_eq!(parse_duration("m"), None);
        assert_eq!(parse_duration("5 minutes"), None);
        assert_eq!(parse_duration("1d"), None);
    }

    #[test]
    fn redis_addr_joins_host_and_port_with_colon() {
        let redis = RedisConfig {
            host: "10.0.0.5".to_string(),
            port: 7000,
            ..RedisConfig::default()
        };
        assert_eq!(redis.addr(), "10.0.0.5:7000");
    }

    #[test]
    fn connection_url_without_password() {
        let url = RedisConfig::default().connection_url().unwrap();
        assert_eq!(url, "redis://127.0.0.1:6379");
    }

    #[test]
    fn connection_url_encodes_password() {
        let redis = RedisConfig {
            password: "p@ss word".to_string(),
            ..RedisConfig::default()
        };
        let url = redis.connection_url().unwrap();
        assert_eq!(url, "redis://:p%40ss%20word@127.0.0.1:6379");
    }

    #[test]
    fn debug_redacts_password() {
        let redis = RedisConfig {
            password: "hunter2".to_string(),
            ..RedisConfig::default()
        };
        let debug = format!("{redis:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn deserialize_from_toml_table() {
        let config: Config = toml::from_str(
            r#"
type = "MEMORY"
tokens = 5
interval = "10s"

[redis]
host = "redis"
"#,
        )
        .unwrap();

        assert_eq!(config.kind, RateLimitType::Memory);
        assert_eq!(config.tokens, 5);
        assert_eq!(config.interval, Duration::from_secs(10));
        assert_eq!(config.redis.host, "redis");
        assert_eq!(config.redis.port, 6379);
    }

    #[test]
    fn deserialize_rejects_unknown_type() {
        let result: Result<Config, _> = toml::from_str(r#"type = "LEAKY""#);
        let err = result.unwrap_err();
        assert!(err.to_string().contains("LEAKY"));
    }
}
