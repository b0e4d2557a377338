//! Environment-driven configuration for daemons and the sweeper.
//!
//! Every setting has a default except `DATABASE_URL`. Values are validated
//! once at load time so the loops can trust them.

use crate::lease::domain::{DaemonId, LeaseDomainError, SweepRequest};
use crate::worker::JobLoopSettings;
use chrono::TimeDelta;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Connection string for the lease and publish stores.
pub const DATABASE_URL: &str = "DATABASE_URL";
/// Identity the process claims work under.
pub const DAEMON_ID: &str = "REELQUEUE_DAEMON_ID";
/// Maximum pooled database connections.
pub const POOL_SIZE: &str = "REELQUEUE_POOL_SIZE";
/// Jobs claimed per poll.
pub const BATCH_SIZE: &str = "REELQUEUE_BATCH_SIZE";
/// Base idle delay in milliseconds.
pub const POLL_INTERVAL_MS: &str = "REELQUEUE_POLL_INTERVAL_MS";
/// Idle delay cap in milliseconds.
pub const MAX_BACKOFF_MS: &str = "REELQUEUE_MAX_BACKOFF_MS";
/// Seconds without progress after which a lease is stale.
pub const SWEEP_TTL_SECS: &str = "REELQUEUE_SWEEP_TTL_SECS";
/// Seconds between `running` reports while a job is handled.
pub const HEARTBEAT_INTERVAL_SECS: &str = "REELQUEUE_HEARTBEAT_INTERVAL_SECS";
/// Seconds between sweep passes.
pub const SWEEP_INTERVAL_SECS: &str = "REELQUEUE_SWEEP_INTERVAL_SECS";
/// Jobs inspected per sweep pass.
pub const SWEEP_LIMIT: &str = "REELQUEUE_SWEEP_LIMIT";
/// Whether sweeps also fail idle queued jobs.
pub const SWEEP_INCLUDE_QUEUED: &str = "REELQUEUE_SWEEP_INCLUDE_QUEUED";

const DEFAULT_POOL_SIZE: u32 = 8;
const DEFAULT_BATCH_SIZE: usize = 4;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
const DEFAULT_MAX_BACKOFF_MS: u64 = 30_000;
const DEFAULT_SWEEP_TTL_SECS: i64 = 900;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 60;

/// Errors raised while loading configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is unset or blank.
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    /// A variable holds a value that cannot be used.
    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        /// Variable name.
        key: &'static str,
        /// Raw value.
        value: String,
        /// What is wrong with it.
        reason: String,
    },
}

/// Validated process configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Database connection string.
    pub database_url: String,
    /// Identity used for claims.
    pub daemon_id: DaemonId,
    /// Maximum pooled connections.
    pub pool_size: u32,
    /// Jobs claimed per poll.
    pub batch_size: usize,
    /// Base idle delay.
    pub poll_interval: Duration,
    /// Idle delay cap.
    pub max_backoff: Duration,
    /// Gap between heartbeats of a handled job.
    pub heartbeat_interval: Duration,
    /// Idle time after which a lease is stale.
    pub sweep_ttl: TimeDelta,
    /// Delay between sweep passes.
    pub sweep_interval: Duration,
    /// Jobs inspected per sweep pass.
    pub sweep_limit: usize,
    /// Whether sweeps also fail idle queued jobs.
    pub sweep_include_queued: bool,
}

impl DispatchConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a value is missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a value is missing or invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |key: &'static str| {
            lookup(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let database_url = read(DATABASE_URL).ok_or(ConfigError::Missing(DATABASE_URL))?;
        let daemon_id = read(DAEMON_ID).map_or_else(default_daemon_id, |raw| {
            DaemonId::new(raw.as_str()).map_err(|err| invalid(DAEMON_ID, &raw, err))
        })?;
        let pool_size = parse_positive(POOL_SIZE, read(POOL_SIZE), DEFAULT_POOL_SIZE)?;
        let batch_size = parse_positive(BATCH_SIZE, read(BATCH_SIZE), DEFAULT_BATCH_SIZE)?;
        let poll_interval = Duration::from_millis(parse_positive(
            POLL_INTERVAL_MS,
            read(POLL_INTERVAL_MS),
            DEFAULT_POLL_INTERVAL_MS,
        )?);
        let max_backoff_raw = read(MAX_BACKOFF_MS);
        let max_backoff = Duration::from_millis(parse_positive(
            MAX_BACKOFF_MS,
            max_backoff_raw.clone(),
            DEFAULT_MAX_BACKOFF_MS,
        )?);
        if max_backoff < poll_interval {
            return Err(invalid(
                MAX_BACKOFF_MS,
                &max_backoff_raw.unwrap_or_default(),
                "must not be below the poll interval",
            ));
        }
        let sweep_ttl_raw = read(SWEEP_TTL_SECS);
        let sweep_ttl_secs =
            parse_positive(SWEEP_TTL_SECS, sweep_ttl_raw.clone(), DEFAULT_SWEEP_TTL_SECS)?;
        let sweep_ttl = TimeDelta::try_seconds(sweep_ttl_secs).ok_or_else(|| {
            invalid(
                SWEEP_TTL_SECS,
                &sweep_ttl_secs.to_string(),
                "out of range for a duration",
            )
        })?;
        let heartbeat_raw = read(HEARTBEAT_INTERVAL_SECS);
        let heartbeat_default = u64::try_from(sweep_ttl_secs)
            .ok()
            .and_then(|ttl| ttl.checked_div(3))
            .map_or(DEFAULT_HEARTBEAT_INTERVAL_SECS, |third| {
                third.clamp(1, DEFAULT_HEARTBEAT_INTERVAL_SECS)
            });
        let heartbeat_secs =
            parse_positive(HEARTBEAT_INTERVAL_SECS, heartbeat_raw.clone(), heartbeat_default)?;
        if !i64::try_from(heartbeat_secs).is_ok_and(|secs| secs < sweep_ttl_secs) {
            return Err(invalid(
                HEARTBEAT_INTERVAL_SECS,
                &heartbeat_raw.unwrap_or_default(),
                "must be below the sweep ttl",
            ));
        }
        let heartbeat_interval = Duration::from_secs(heartbeat_secs);
        let sweep_interval = Duration::from_secs(parse_positive(
            SWEEP_INTERVAL_SECS,
            read(SWEEP_INTERVAL_SECS),
            DEFAULT_SWEEP_INTERVAL_SECS,
        )?);
        let sweep_limit_raw = read(SWEEP_LIMIT);
        let sweep_limit =
            parse_positive(SWEEP_LIMIT, sweep_limit_raw.clone(), SweepRequest::DEFAULT_LIMIT)?;
        let sweep_include_queued = read(SWEEP_INCLUDE_QUEUED)
            .map(|raw| parse_flag(SWEEP_INCLUDE_QUEUED, &raw))
            .transpose()?
            .unwrap_or(false);

        let config = Self {
            database_url,
            daemon_id,
            pool_size,
            batch_size,
            poll_interval,
            max_backoff,
            heartbeat_interval,
            sweep_ttl,
            sweep_interval,
            sweep_limit,
            sweep_include_queued,
        };
        config.sweep_request().validate().map_err(|err| match err {
            LeaseDomainError::InvalidSweepLimit(_) => {
                invalid(SWEEP_LIMIT, &sweep_limit_raw.unwrap_or_default(), err)
            }
            _ => invalid(SWEEP_TTL_SECS, &sweep_ttl_raw.unwrap_or_default(), err),
        })?;
        Ok(config)
    }

    /// Returns the sweep request described by this configuration.
    #[must_use]
    pub const fn sweep_request(&self) -> SweepRequest {
        SweepRequest::new(self.sweep_ttl)
            .with_limit(self.sweep_limit)
            .including_queued(self.sweep_include_queued)
    }

    /// Returns the job worker loop settings described by this configuration.
    #[must_use]
    pub fn job_loop_settings(&self) -> JobLoopSettings {
        JobLoopSettings {
            daemon_id: self.daemon_id.clone(),
            batch_size: self.batch_size,
            poll_interval: self.poll_interval,
            max_backoff: self.max_backoff,
            heartbeat_interval: self.heartbeat_interval,
        }
    }
}

fn default_daemon_id() -> Result<DaemonId, ConfigError> {
    let generated = format!("reelqueue-{}", Uuid::new_v4().simple());
    DaemonId::new(generated.as_str()).map_err(|err| invalid(DAEMON_ID, &generated, err))
}

fn parse_positive<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let Some(value) = raw else {
        return Ok(default);
    };
    let parsed = value
        .parse::<T>()
        .map_err(|err| invalid(key, &value, err))?;
    if parsed <= T::default() {
        return Err(invalid(key, &value, "must be greater than zero"));
    }
    Ok(parsed)
}

fn parse_flag(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, raw, "expected true or false")),
    }
}

fn invalid(key: &'static str, value: &str, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_owned(),
        reason: reason.to_string(),
    }
}
