//! Configuration loading from environment variables.
//!
//! Both binaries read their settings once at startup. Every loader has a
//! `from_lookup` twin so tests can supply values without touching the process
//! environment.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_QUEUE_NAME: &str = "items-events";
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";
pub const DEFAULT_MAX_CONCURRENT_CALLS: usize = 5;
pub const DEFAULT_PREFETCH_COUNT: usize = 10;
pub const DEFAULT_MAX_DELIVERY_COUNT: u32 = 10;
pub const DEFAULT_REDELIVERY_DELAY_MS: u64 = 5_000;

/// Secret used when none is configured in development.
pub const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has an invalid value `{value}`: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Hosting environment, mirrors `APP_ENV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_development(self) -> bool {
        matches!(self, Environment::Development)
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("unknown environment `{other}`")),
        }
    }
}

/// Bearer token verification settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    /// Expected `iss` claim (the identity provider authority).
    pub authority: Option<String>,
    /// Expected `aud` claim.
    pub audience: Option<String>,
    pub jwt_secret: String,
}

/// Broker queue settings shared by the API (sender) and worker (receiver).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    pub redis_url: String,
    pub queue_name: String,
    pub max_delivery_count: u32,
    pub redelivery_delay: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub environment: Environment,
    pub bind_addr: SocketAddr,
    pub use_persistent_stores: bool,
    pub database_url: Option<String>,
    pub queue: QueueConfig,
    pub auth: AuthConfig,
    /// CORS origins; empty means "none" outside development.
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub environment: Environment,
    pub queue: QueueConfig,
    pub max_concurrent_calls: usize,
    pub prefetch_count: usize,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = parse_or(&lookup, "APP_ENV", Environment::Development)?;
        let bind_addr = parse_or(&lookup, "BIND_ADDR", default_bind_addr())?;
        let use_persistent_stores = parse_or(&lookup, "USE_PERSISTENT_STORES", false)?;

        let database_url = non_empty(&lookup, "DATABASE_URL");
        if use_persistent_stores && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let jwt_secret = match non_empty(&lookup, "JWT_SECRET") {
            Some(secret) => secret,
            None if environment.is_development() => {
                tracing::warn!("JWT_SECRET not set; using insecure dev default");
                DEV_JWT_SECRET.to_string()
            }
            None => return Err(ConfigError::Missing("JWT_SECRET")),
        };

        let allowed_origins = non_empty(&lookup, "ALLOWED_ORIGINS")
            .map(|raw| split_origins(&raw))
            .unwrap_or_default();

        Ok(Self {
            environment,
            bind_addr,
            use_persistent_stores,
            database_url,
            queue: QueueConfig::from_lookup(&lookup)?,
            auth: AuthConfig {
                authority: non_empty(&lookup, "AUTH_AUTHORITY"),
                audience: non_empty(&lookup, "AUTH_AUDIENCE"),
                jwt_secret,
            },
            allowed_origins,
        })
    }
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let max_concurrent_calls =
            parse_or(&lookup, "MAX_CONCURRENT_CALLS", DEFAULT_MAX_CONCURRENT_CALLS)?;
        let prefetch_count = parse_or(&lookup, "PREFETCH_COUNT", DEFAULT_PREFETCH_COUNT)?;

        if max_concurrent_calls == 0 {
            return Err(invalid("MAX_CONCURRENT_CALLS", "0", "must be at least 1"));
        }
        if prefetch_count == 0 {
            return Err(invalid("PREFETCH_COUNT", "0", "must be at least 1"));
        }

        Ok(Self {
            environment: parse_or(&lookup, "APP_ENV", Environment::Development)?,
            queue: QueueConfig::from_lookup(&lookup)?,
            max_concurrent_calls,
            prefetch_count,
        })
    }
}

impl QueueConfig {
    fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let max_delivery_count =
            parse_or(lookup, "MAX_DELIVERY_COUNT", DEFAULT_MAX_DELIVERY_COUNT)?;
        if max_delivery_count == 0 {
            return Err(invalid("MAX_DELIVERY_COUNT", "0", "must be at least 1"));
        }

        Ok(Self {
            redis_url: non_empty(lookup, "REDIS_URL").unwrap_or_else(|| DEFAULT_REDIS_URL.to_string()),
            queue_name: non_empty(lookup, "ITEMS_QUEUE")
                .unwrap_or_else(|| DEFAULT_QUEUE_NAME.to_string()),
            max_delivery_count,
            redelivery_delay: Duration::from_millis(parse_or(
                lookup,
                "REDELIVERY_DELAY_MS",
                DEFAULT_REDELIVERY_DELAY_MS,
            )?),
        })
    }
}

/// Splits a `;`-separated origin list, dropping blanks.
pub fn split_origins(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect()
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty(lookup, key) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| invalid(key, &raw, e.to_string())),
    }
}

fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn api_defaults_apply_in_development() {
        let cfg = ApiConfig::from_lookup(env(&[])).unwrap();

        assert_eq!(cfg.environment, Environment::Development);
        assert_eq!(cfg.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert!(!cfg.use_persistent_stores);
        assert_eq!(cfg.auth.jwt_secret, DEV_JWT_SECRET);
        assert_eq!(cfg.queue.queue_name, DEFAULT_QUEUE_NAME);
        assert_eq!(cfg.queue.max_delivery_count, 10);
        assert_eq!(cfg.queue.redelivery_delay, Duration::from_secs(5));
        assert!(cfg.allowed_origins.is_empty());
    }

    #[test]
    fn production_requires_jwt_secret() {
        let err = ApiConfig::from_lookup(env(&[("APP_ENV", "Production")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("JWT_SECRET"));
    }

    #[test]
    fn persistent_stores_require_database_url() {
        let err = ApiConfig::from_lookup(env(&[("USE_PERSISTENT_STORES", "true")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("DATABASE_URL"));
    }

    #[test]
    fn allowed_origins_are_semicolon_separated() {
        let cfg = ApiConfig::from_lookup(env(&[(
            "ALLOWED_ORIGINS",
            "https://a.example.com; https://b.example.com;;",
        )]))
        .unwrap();

        assert_eq!(
            cfg.allowed_origins,
            vec!["https://a.example.com", "https://b.example.com"]
        );
    }

    #[test]
    fn invalid_numbers_name_the_variable() {
        let err = WorkerConfig::from_lookup(env(&[("PREFETCH_COUNT", "many")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PREFETCH_COUNT", .. }));
    }

    #[test]
    fn worker_settings_override_defaults() {
        let cfg = WorkerConfig::from_lookup(env(&[
            ("MAX_CONCURRENT_CALLS", "2"),
            ("PREFETCH_COUNT", "4"),
            ("ITEMS_QUEUE", "custom-queue"),
        ]))
        .unwrap();

        assert_eq!(cfg.max_concurrent_calls, 2);
        assert_eq!(cfg.prefetch_count, 4);
        assert_eq!(cfg.queue.queue_name, "custom-queue");
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let err = WorkerConfig::from_lookup(env(&[("MAX_CONCURRENT_CALLS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "MAX_CONCURRENT_CALLS", .. }));
    }
}
