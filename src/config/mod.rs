use serde::Deserialize;
use std::env;
use std::str::FromStr;
use thiserror::Error;

use crate::models::PublicId;
use crate::services::public_id;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} has an invalid value '{value}'")]
    Invalid { key: &'static str, value: String },
}

// Top-level settings, one section per concern
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: Option<DatabaseConfig>,
    pub redis: Option<RedisConfig>,
    pub booking: BookingConfig,
    pub features: FeatureFlags,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
    pub log_format: String,
}

// Absent DATABASE_URL means the in-memory ledger
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

// Engine tuning: id format and retry bounds
#[derive(Debug, Clone, Deserialize)]
pub struct BookingConfig {
    pub id_prefix: String,
    pub id_attempts: u32,
    pub commit_attempts: u32,
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeatureFlags {
    pub enable_seat_cache: bool,
    pub seat_cache_ttl_seconds: u64,
    pub enable_prediction_features: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            app: AppConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
                environment: "development".to_string(),
                rust_log: "sleeper_bus=debug,tower_http=debug".to_string(),
                log_format: "text".to_string(),
            },
            database: None,
            redis: None,
            booking: BookingConfig {
                id_prefix: "BK".to_string(),
                id_attempts: 5,
                commit_attempts: 3,
                retry_backoff_ms: 25,
            },
            features: FeatureFlags {
                enable_seat_cache: true,
                seat_cache_ttl_seconds: 300,
                enable_prediction_features: true,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let database = match env::var("DATABASE_URL") {
            Ok(url) if !url.is_empty() => Some(DatabaseConfig {
                url,
                pool_size: parse_var("DB_POOL_SIZE", 20)?,
            }),
            _ => None,
        };

        let redis = match env::var("REDIS_URL") {
            Ok(url) if !url.is_empty() => Some(RedisConfig { url }),
            _ => None,
        };

        Ok(Config {
            app: AppConfig {
                host: env::var("HOST").unwrap_or(defaults.app.host),
                port: parse_var("PORT", defaults.app.port)?,
                environment: env::var("ENVIRONMENT").unwrap_or(defaults.app.environment),
                rust_log: env::var("RUST_LOG").unwrap_or(defaults.app.rust_log),
                log_format: env::var("LOG_FORMAT").unwrap_or(defaults.app.log_format),
            },
            database,
            redis,
            booking: BookingConfig {
                id_prefix: match env::var("BOOKING_ID_PREFIX") {
                    Ok(raw) => validate_id_prefix(&raw)?,
                    Err(_) => defaults.booking.id_prefix,
                },
                id_attempts: parse_var("BOOKING_ID_ATTEMPTS", defaults.booking.id_attempts)?,
                commit_attempts: parse_var(
                    "BOOKING_COMMIT_ATTEMPTS",
                    defaults.booking.commit_attempts,
                )?,
                retry_backoff_ms: parse_var(
                    "BOOKING_RETRY_BACKOFF_MS",
                    defaults.booking.retry_backoff_ms,
                )?,
            },
            features: FeatureFlags {
                enable_seat_cache: parse_var(
                    "ENABLE_SEAT_CACHE",
                    defaults.features.enable_seat_cache,
                )?,
                seat_cache_ttl_seconds: parse_var(
                    "SEAT_CACHE_TTL_SECONDS",
                    defaults.features.seat_cache_ttl_seconds,
                )?,
                enable_prediction_features: parse_var(
                    "ENABLE_PREDICTION_FEATURES",
                    defaults.features.enable_prediction_features,
                )?,
            },
        })
    }
}

/// Normalizes a booking id prefix. Issued ids must survive `PublicId::parse`
/// and fit the ledger column, so the prefix is upper-case alphanumerics and
/// leaves room for the random suffix.
pub fn validate_id_prefix(raw: &str) -> Result<String, ConfigError> {
    let prefix = raw.trim().to_ascii_uppercase();
    let max_len = PublicId::MAX_LEN - public_id::SUFFIX_LEN;
    if prefix.is_empty()
        || prefix.len() > max_len
        || !prefix.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(ConfigError::Invalid { key: "BOOKING_ID_PREFIX", value: raw.to_string() });
    }
    Ok(prefix)
}

fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value: raw.to_string() })
}
