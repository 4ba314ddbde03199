//! Configuration for the payment tracking engine.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tracking engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Polling cadence while a payment is `Pending`, in seconds.
    #[serde(default = "default_pending_poll")]
    pub pending_poll_secs: u64,

    /// Polling cadence while a payment is `PaidUnconfirmed`, in seconds.
    ///
    /// Faster than the pending cadence: a confirmed outcome is imminent and
    /// users are waiting.
    #[serde(default = "default_unconfirmed_poll")]
    pub unconfirmed_poll_secs: u64,

    /// Bound on a single verification query, in seconds.
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,

    /// Session time-to-live used when registration does not specify one,
    /// in seconds.
    #[serde(default = "default_ttl")]
    pub default_ttl_secs: u64,

    /// Maximum number of verification queries outstanding at once across
    /// all sessions.
    #[serde(default = "default_max_concurrent_queries")]
    pub max_concurrent_queries: usize,

    /// Capacity of the event broadcast channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            pending_poll_secs: default_pending_poll(),
            unconfirmed_poll_secs: default_unconfirmed_poll(),
            query_timeout_secs: default_query_timeout(),
            default_ttl_secs: default_ttl(),
            max_concurrent_queries: default_max_concurrent_queries(),
            event_buffer: default_event_buffer(),
        }
    }
}

const fn default_pending_poll() -> u64 {
    60
}

const fn default_unconfirmed_poll() -> u64 {
    30
}

const fn default_query_timeout() -> u64 {
    10
}

const fn default_ttl() -> u64 {
    900 // 15 minutes
}

const fn default_max_concurrent_queries() -> usize {
    8
}

const fn default_event_buffer() -> usize {
    256
}

impl TrackerConfig {
    /// Polling interval for `Pending` sessions.
    #[must_use]
    pub fn pending_interval(&self) -> Duration {
        Duration::from_secs(self.pending_poll_secs)
    }

    /// Polling interval for `PaidUnconfirmed` sessions.
    #[must_use]
    pub fn unconfirmed_interval(&self) -> Duration {
        Duration::from_secs(self.unconfirmed_poll_secs)
    }

    /// Timeout applied to each verification query.
    #[must_use]
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    /// Default session time-to-live.
    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any interval, timeout, or capacity is zero.
    pub fn validate(&self) -> crate::Result<()> {
        if self.pending_poll_secs == 0 {
            return Err(crate::Error::Config(
                "pending_poll_secs must be positive".to_string(),
            ));
        }
        if self.unconfirmed_poll_secs == 0 {
            return Err(crate::Error::Config(
                "unconfirmed_poll_secs must be positive".to_string(),
            ));
        }
        if self.query_timeout_secs == 0 {
            return Err(crate::Error::Config(
                "query_timeout_secs must be positive".to_string(),
            ));
        }
        if self.default_ttl_secs == 0 {
            return Err(crate::Error::Config(
                "default_ttl_secs must be positive".to_string(),
            ));
        }
        if self.max_concurrent_queries == 0 {
            return Err(crate::Error::Config(
                "max_concurrent_queries must be positive".to_string(),
            ));
        }
        if self.event_buffer == 0 {
            return Err(crate::Error::Config(
                "event_buffer must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &std::path::Path) -> crate::Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
