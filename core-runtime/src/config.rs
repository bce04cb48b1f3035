//! # Core Configuration Module
//!
//! Provides configuration management for the catalog sync engine.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds every tunable of the engine. Validation is fail-fast:
//! an invalid knob is reported by [`CoreConfigBuilder::build`] with an
//! actionable message instead of surfacing later as a stuck run.
//!
//! ## Sync Settings
//!
//! [`SyncSettings`] groups the per-run knobs:
//!
//! - `max_batch_size` / `max_batch_linger` - size and time bound of one batch
//! - `max_flush_attempts`, `retry_base_delay`, `retry_max_delay` - batch retry policy
//! - `max_pending_flushes` - flush queue depth per source (backpressure point)
//! - `flush_workers` - concurrent persistence calls across all sources
//! - `idle_timeout` - adapter silence that counts as a stall
//! - `run_timeout` - optional hard deadline for one run
//! - `cancel_grace` - how long a cancelled run may spend draining
//! - `commit_fingerprint_on_partial_failure` - fingerprint policy when batches were abandoned
//!
//! ## Usage
//!
//! ```
//! use core_runtime::config::{CoreConfig, SyncSettings};
//! use std::time::Duration;
//!
//! let config = CoreConfig::builder()
//!     .database_url("sqlite://catalog.db")
//!     .sync_settings(
//!         SyncSettings::default()
//!             .with_max_batch_size(250)
//!             .with_idle_timeout(Duration::from_secs(60)),
//!     )
//!     .build()
//!     .expect("valid config");
//!
//! assert_eq!(config.sync.max_batch_size, 250);
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::{CoreConfig, SyncSettings};
//!
//! // A zero batch size can never flush and is rejected up front
//! let config = CoreConfig::builder()
//!     .sync_settings(SyncSettings::default().with_max_batch_size(0))
//!     .build()
//!     .expect("Should fail - zero batch size");
//! ```

use crate::error::{Error, Result};
use std::time::Duration;

/// Upper bound for a single batch; larger batches defeat bounded memory.
const MAX_BATCH_SIZE_LIMIT: usize = 10_000;

/// Tunables for synchronization runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Items per batch before a flush is forced (N).
    pub max_batch_size: usize,

    /// Maximum time the oldest item may wait in an open batch (T).
    pub max_batch_linger: Duration,

    /// Persistence attempts per batch, first attempt included (R).
    pub max_flush_attempts: u32,

    /// Delay before the second attempt; doubles on each further attempt.
    pub retry_base_delay: Duration,

    /// Ceiling for the retry delay.
    pub retry_max_delay: Duration,

    /// Cut batches waiting for the flush worker before `submit` suspends.
    pub max_pending_flushes: usize,

    /// Concurrent persistence calls shared across all sources.
    pub flush_workers: usize,

    /// Silence from the adapter that is treated as a stalled scan.
    pub idle_timeout: Duration,

    /// Hard deadline for one run; `None` disables it.
    pub run_timeout: Option<Duration>,

    /// Time a cancelled or timed-out run may spend draining queued batches.
    pub cancel_grace: Duration,

    /// Commit the fresh fingerprint even when some batches were abandoned.
    ///
    /// When `false`, a run that completes with `items_failed > 0` keeps the
    /// previous fingerprint so the next run rescans.
    pub commit_fingerprint_on_partial_failure: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_batch_size: 100,
            max_batch_linger: Duration::from_secs(2),
            max_flush_attempts: 3,
            retry_base_delay: Duration::from_millis(100),
            retry_max_delay: Duration::from_secs(5),
            max_pending_flushes: 2,
            flush_workers: 4,
            idle_timeout: Duration::from_secs(120),
            run_timeout: Some(Duration::from_secs(60 * 60)),
            cancel_grace: Duration::from_secs(5),
            commit_fingerprint_on_partial_failure: true,
        }
    }
}

impl SyncSettings {
    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    pub fn with_max_batch_linger(mut self, linger: Duration) -> Self {
        self.max_batch_linger = linger;
        self
    }

    pub fn with_max_flush_attempts(mut self, attempts: u32) -> Self {
        self.max_flush_attempts = attempts;
        self
    }

    /// Sets base and ceiling of the retry backoff together.
    pub fn with_retry_delays(mut self, base: Duration, max: Duration) -> Self {
        self.retry_base_delay = base;
        self.retry_max_delay = max;
        self
    }

    pub fn with_max_pending_flushes(mut self, pending: usize) -> Self {
        self.max_pending_flushes = pending;
        self
    }

    pub fn with_flush_workers(mut self, workers: usize) -> Self {
        self.flush_workers = workers;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_run_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.run_timeout = timeout;
        self
    }

    pub fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = grace;
        self
    }

    pub fn with_commit_fingerprint_on_partial_failure(mut self, commit: bool) -> Self {
        self.commit_fingerprint_on_partial_failure = commit;
        self
    }

    /// Validates the settings and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            return Err(Error::Config(
                "max_batch_size must be greater than 0".to_string(),
            ));
        }

        if self.max_batch_size > MAX_BATCH_SIZE_LIMIT {
            return Err(Error::Config(format!(
                "max_batch_size exceeds maximum of {}",
                MAX_BATCH_SIZE_LIMIT
            )));
        }

        if self.max_batch_linger.is_zero() {
            return Err(Error::Config(
                "max_batch_linger must be greater than 0".to_string(),
            ));
        }

        if self.max_flush_attempts == 0 {
            return Err(Error::Config(
                "max_flush_attempts must be at least 1 (the first attempt counts)".to_string(),
            ));
        }

        if self.retry_base_delay > self.retry_max_delay {
            return Err(Error::Config(
                "retry_base_delay cannot exceed retry_max_delay".to_string(),
            ));
        }

        if self.max_pending_flushes == 0 {
            return Err(Error::Config(
                "max_pending_flushes must be greater than 0".to_string(),
            ));
        }

        if self.flush_workers == 0 {
            return Err(Error::Config(
                "flush_workers must be greater than 0".to_string(),
            ));
        }

        if self.idle_timeout.is_zero() {
            return Err(Error::Config(
                "idle_timeout must be greater than 0".to_string(),
            ));
        }

        if matches!(self.run_timeout, Some(timeout) if timeout.is_zero()) {
            return Err(Error::Config(
                "run_timeout must be greater than 0. Use None to disable it.".to_string(),
            ));
        }

        Ok(())
    }
}

/// Core configuration for the catalog sync engine.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// SQLite URL for the fingerprint store; `None` keeps fingerprints in memory.
    pub database_url: Option<String>,

    /// Capacity of the broadcast event bus.
    pub event_buffer_size: usize,

    /// Per-run synchronization settings.
    pub sync: SyncSettings,
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if let Some(url) = &self.database_url {
            if url.trim().is_empty() {
                return Err(Error::Config("Database URL cannot be empty".to_string()));
            }
            if !url.starts_with("sqlite:") {
                return Err(Error::Config(format!(
                    "Unsupported database URL '{}'. Only sqlite: URLs are supported.",
                    url
                )));
            }
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        self.sync.validate()
    }
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Debug, Default)]
pub struct CoreConfigBuilder {
    database_url: Option<String>,
    event_buffer_size: Option<usize>,
    sync: Option<SyncSettings>,
}

impl CoreConfigBuilder {
    /// Sets the SQLite database URL for persisted fingerprints.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder()
    ///     .database_url("sqlite://catalog.db?mode=rwc");
    /// ```
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    /// Sets the event bus capacity.
    ///
    /// Default: 256 events. Slow subscribers that fall further behind see
    /// `RecvError::Lagged`.
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Sets the synchronization settings.
    pub fn sync_settings(mut self, settings: SyncSettings) -> Self {
        self.sync = Some(settings);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// Returns an error if any value is out of range.
    pub fn build(self) -> Result<CoreConfig> {
        let config = CoreConfig {
            database_url: self.database_url,
            event_buffer_size: self.event_buffer_size.unwrap_or(256),
            sync: self.sync.unwrap_or_default(),
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = CoreConfig::builder().build().unwrap();

        assert_eq!(config.database_url, None);
        assert_eq!(config.event_buffer_size, 256);
        assert_eq!(config.sync, SyncSettings::default());
    }

    #[test]
    fn test_sync_settings_defaults_are_valid() {
        let settings = SyncSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.max_batch_size, 100);
        assert_eq!(settings.max_flush_attempts, 3);
        assert!(settings.commit_fingerprint_on_partial_failure);
    }

    #[test]
    fn test_builder_with_database_url() {
        let config = CoreConfig::builder()
            .database_url("sqlite::memory:")
            .build()
            .unwrap();

        assert_eq!(config.database_url.as_deref(), Some("sqlite::memory:"));
    }

    #[test]
    fn test_validate_rejects_non_sqlite_url() {
        let result = CoreConfig::builder()
            .database_url("postgres://localhost/catalog")
            .build();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Only sqlite: URLs are supported"));
    }

    #[test]
    fn test_validate_rejects_zero_event_buffer() {
        let result = CoreConfig::builder().event_buffer_size(0).build();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Event buffer size"));
    }

    #[test]
    fn test_validate_rejects_zero_batch_size() {
        let result = CoreConfig::builder()
            .sync_settings(SyncSettings::default().with_max_batch_size(0))
            .build();

        assert!(result.unwrap_err().to_string().contains("max_batch_size"));
    }

    #[test]
    fn test_validate_rejects_excessive_batch_size() {
        let settings = SyncSettings::default().with_max_batch_size(MAX_BATCH_SIZE_LIMIT + 1);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let settings = SyncSettings::default().with_max_flush_attempts(0);
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("max_flush_attempts"));
    }

    #[test]
    fn test_validate_rejects_inverted_retry_delays() {
        let settings = SyncSettings::default()
            .with_retry_delays(Duration::from_secs(10), Duration::from_secs(1));
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_run_timeout() {
        let settings = SyncSettings::default().with_run_timeout(Some(Duration::ZERO));
        assert!(settings.validate().is_err());

        let settings = SyncSettings::default().with_run_timeout(None);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_workers_and_queue() {
        assert!(SyncSettings::default()
            .with_flush_workers(0)
            .validate()
            .is_err());
        assert!(SyncSettings::default()
            .with_max_pending_flushes(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_with_builders_chain() {
        let settings = SyncSettings::default()
            .with_max_batch_size(3)
            .with_max_batch_linger(Duration::from_millis(50))
            .with_idle_timeout(Duration::from_secs(1))
            .with_cancel_grace(Duration::from_millis(200))
            .with_commit_fingerprint_on_partial_failure(false);

        assert_eq!(settings.max_batch_size, 3);
        assert_eq!(settings.max_batch_linger, Duration::from_millis(50));
        assert_eq!(settings.idle_timeout, Duration::from_secs(1));
        assert_eq!(settings.cancel_grace, Duration::from_millis(200));
        assert!(!settings.commit_fingerprint_on_partial_failure);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_config_is_cloneable() {
        let config = CoreConfig::builder().build().unwrap();
        let cloned = config.clone();
        assert_eq!(config, cloned);
    }
}
