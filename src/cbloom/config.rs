use crate::cbloom::error::{CbloomError, Result};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default counter array length (1 MiB of `u8` counters).
///
/// Holds about 33 333 keys at a false positive rate of `1.04e-6`.
pub const DEFAULT_SIZE: usize = 1 << 20;

/// Default interval between background expiry passes.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(60);

/// Share of the counter array decremented by one lazy pass.
pub const LAZY_BATCH_RATE: f64 = 0.1;

/// Timestamp index entries inspected per sample of a timestamp sweep.
pub const SWEEP_SAMPLE_SIZE: usize = 20;

/// Evicted share of a sample above which the sweep samples again.
pub const SWEEP_REPEAT_THRESHOLD: f64 = 0.25;

/// How a filter forgets entries over time.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryStrategy {
    /// Entries stay until removed explicitly.
    #[default]
    NoExpiration,
    /// Every period, decrement the next 10% of the counter array.
    Lazy,
    /// Every period, zero all counters and forget all timestamps.
    ResetEveryPeriod,
    /// Track insertion time per key and drop keys older than the period.
    ExpiryDuration,
}

impl ExpiryStrategy {
    /// Whether a background task is needed for this strategy.
    pub fn is_periodic(&self) -> bool {
        !matches!(self, ExpiryStrategy::NoExpiration)
    }

    /// Whether the filter keeps a per-key timestamp index.
    pub fn tracks_timestamps(&self) -> bool {
        matches!(self, ExpiryStrategy::ExpiryDuration)
    }
}

impl fmt::Display for ExpiryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExpiryStrategy::NoExpiration => "none",
            ExpiryStrategy::Lazy => "lazy",
            ExpiryStrategy::ResetEveryPeriod => "reset",
            ExpiryStrategy::ExpiryDuration => "expiry",
        };
        f.write_str(name)
    }
}

impl FromStr for ExpiryStrategy {
    type Err = CbloomError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "no_expiration" => Ok(ExpiryStrategy::NoExpiration),
            "lazy" => Ok(ExpiryStrategy::Lazy),
            "reset" | "reset_every_period" => {
                Ok(ExpiryStrategy::ResetEveryPeriod)
            }
            "expiry" | "expiry_duration" => Ok(ExpiryStrategy::ExpiryDuration),
            other => Err(CbloomError::InvalidConfig(format!(
                "Unknown expiry strategy '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(pattern = "owned")]
pub struct CountingFilterConfig {
    /// Number of counters
    #[builder(default = "DEFAULT_SIZE")]
    pub size: usize,

    #[builder(default)]
    pub expiry_strategy: ExpiryStrategy,

    /// Timer interval for periodic strategies, and the time to live of a key
    /// under `ExpiryDuration`. Zero falls back to `DEFAULT_PERIOD`.
    #[builder(default = "DEFAULT_PERIOD")]
    pub period: Duration,
}

impl Default for CountingFilterConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_SIZE,
            expiry_strategy: ExpiryStrategy::NoExpiration,
            period: DEFAULT_PERIOD,
        }
    }
}

impl CountingFilterConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.size == 0 {
            return Err("Size must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Period actually used by the filter.
    pub fn effective_period(&self) -> Duration {
        if self.period.is_zero() {
            DEFAULT_PERIOD
        } else {
            self.period
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Load configuration from `CBLOOM_*` environment variables, reading a
    /// `.env` file first when one is present.
    ///
    /// - `CBLOOM_SIZE` (default `1048576`)
    /// - `CBLOOM_EXPIRY_STRATEGY`: `none`, `lazy`, `reset` or `expiry`
    /// - `CBLOOM_PERIOD_MS` (default `60000`)
    #[cfg(feature = "env")]
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let size = env_or("CBLOOM_SIZE", DEFAULT_SIZE)?;
        let expiry_strategy =
            env_or("CBLOOM_EXPIRY_STRATEGY", ExpiryStrategy::NoExpiration)?;
        let period_ms =
            env_or("CBLOOM_PERIOD_MS", DEFAULT_PERIOD.as_millis() as u64)?;

        let config = Self {
            size,
            expiry_strategy,
            period: Duration::from_millis(period_ms),
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(feature = "env")]
fn env_or<T>(var_name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match std::env::var(var_name) {
        Ok(value) => {
            value.parse().map_err(|e: T::Err| CbloomError::EnvParseError {
                var_name: var_name.to_string(),
                value: value.clone(),
                error: e.to_string(),
            })
        }
        Err(_) => Ok(default),
    }
}
