//! Set Configuration
//!
//! The configuration triple every [`ExpiringSet`](crate::storage::ExpiringSet)
//! is built from: a TTL, an optional size bound, and an optional background
//! sweep interval.
//!
//! Invalid values are rejected when the set is constructed rather than being
//! coerced into something usable.

use std::time::Duration;
use thiserror::Error;

/// Errors raised while building an expiring set.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// A duration given in seconds was negative, NaN or infinite
    #[error("invalid {field}: {value} (expected a finite, non-negative number of seconds)")]
    InvalidDuration { field: &'static str, value: f64 },

    /// A sweep interval of zero would spin the reaper
    #[error("sweep interval must be greater than zero")]
    ZeroSweepInterval,

    /// A reaper was requested but there is no Tokio runtime to spawn it on
    #[error("a sweep interval requires a running Tokio runtime")]
    NoRuntime,
}

/// Configuration for an [`ExpiringSet`](crate::storage::ExpiringSet).
///
/// # Example
///
/// ```
/// use ttlset::storage::SetConfig;
/// use std::time::Duration;
///
/// let config = SetConfig::new(Duration::from_secs(30))
///     .with_max_size(10_000)
///     .with_sweep_interval(Duration::from_secs(5));
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetConfig {
    /// How long a key stays live after its last `add`
    pub ttl: Duration,

    /// Maximum number of stored entries (None = unbounded)
    pub max_size: Option<usize>,

    /// Period of the background reaper (None = no reaper)
    pub sweep_interval: Option<Duration>,
}

impl SetConfig {
    /// Creates an unbounded configuration without a background reaper.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            max_size: None,
            sweep_interval: None,
        }
    }

    /// Creates a configuration from a TTL given in (fractional) seconds.
    pub fn from_secs_f64(ttl: f64) -> Result<Self, ConfigError> {
        Ok(Self::new(parse_secs("ttl", ttl)?))
    }

    /// Bounds the set to `max_size` entries, evicting oldest first.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = Some(max_size);
        self
    }

    /// Starts a background reaper that sweeps every `interval`.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// Checks the configuration for values that cannot be honoured.
    ///
    /// A zero TTL is allowed (keys are never observed as live), and so is a
    /// zero `max_size` (every add is followed by full eviction).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sweep_interval == Some(Duration::ZERO) {
            return Err(ConfigError::ZeroSweepInterval);
        }
        Ok(())
    }
}

/// Converts a number of seconds into a [`Duration`], rejecting negative and
/// non-finite values.
///
/// `field` names the setting in the returned error.
pub fn parse_secs(field: &'static str, secs: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::InvalidDuration {
        field,
        value: secs,
    })
}
