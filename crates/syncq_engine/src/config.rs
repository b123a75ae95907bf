//! Configuration for the sync engine.

use rand::Rng;
use std::time::Duration;
use syncq_protocol::ConflictStrategy;

/// Seven days, the default retention window for queued operations.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Configuration for the sync engine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Interval between periodic sync passes.
    pub sync_interval: Duration,
    /// Cap on each individual remote call.
    pub request_timeout: Duration,
    /// Maximum number of queued operations.
    pub max_queue_size: usize,
    /// Age after which a queued operation may be purged to make room.
    pub retention: Duration,
    /// Retry budget for operations that do not set their own.
    pub default_max_retries: u32,
    /// Strategy applied when a conflict is detected.
    pub conflict_strategy: ConflictStrategy,
    /// Payload field naming the target row of an Update/Delete.
    pub id_field: String,
    /// Remote field holding the last-modified time.
    pub modified_field: String,
    /// Bookkeeping fields ignored by conflict detection.
    pub volatile_fields: Vec<String>,
    /// Wake a running scheduler on every submission while online.
    pub sync_on_submit: bool,
    /// Retry configuration.
    pub retry: RetryConfig,
}

impl SyncConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            sync_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            max_queue_size: 1000,
            retention: DEFAULT_RETENTION,
            default_max_retries: 3,
            conflict_strategy: ConflictStrategy::Timestamp,
            id_field: "id".to_string(),
            modified_field: "updated_at".to_string(),
            volatile_fields: vec!["updated_at".to_string()],
            sync_on_submit: true,
            retry: RetryConfig::default(),
        }
    }

    /// Sets the periodic sync interval.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Sets the per-call request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the queue capacity.
    pub fn with_max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size;
        self
    }

    /// Sets the retention window.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Sets the default retry budget.
    pub fn with_default_max_retries(mut self, max_retries: u32) -> Self {
        self.default_max_retries = max_retries;
        self
    }

    /// Sets the conflict strategy.
    pub fn with_conflict_strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.conflict_strategy = strategy;
        self
    }

    /// Sets the payload field naming the target row.
    pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = field.into();
        self
    }

    /// Sets the remote last-modified field.
    pub fn with_modified_field(mut self, field: impl Into<String>) -> Self {
        self.modified_field = field.into();
        self
    }

    /// Sets the fields ignored by conflict detection.
    pub fn with_volatile_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.volatile_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Enables or disables the submission nudge.
    pub fn with_sync_on_submit(mut self, enabled: bool) -> Self {
        self.sync_on_submit = enabled;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Backoff between attempts of a failing operation.
///
/// The number of attempts is bounded per operation by its `max_retries`;
/// this only controls how long a failed operation waits before a later
/// pass may pick it up again.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Maximum delay between attempts.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
    /// Drop an operation on its first permanent remote error.
    pub fail_fast_permanent: bool,
}

impl RetryConfig {
    /// Creates the default exponential backoff.
    pub fn new() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
            fail_fast_permanent: true,
        }
    }

    /// Creates a configuration where failed operations are eligible again
    /// on the very next pass.
    pub fn without_backoff() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
            fail_fast_permanent: true,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, add_jitter: bool) -> Self {
        self.add_jitter = add_jitter;
        self
    }

    /// Treat permanent errors like transient ones and spend the full budget.
    pub fn with_fail_fast_permanent(mut self, fail_fast: bool) -> Self {
        self.fail_fast_permanent = fail_fast;
        self
    }

    /// Calculates the wait after `failures` failed attempts.
    pub fn delay_for_attempt(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }

        let base_delay = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(failures.saturating_sub(1) as i32);

        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter && delay_secs > 0.0 {
            // Up to 25% extra
            let jitter = delay_secs * 0.25 * rand::thread_rng().gen::<f64>();
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.sync_interval, Duration::from_secs(30));
        assert_eq!(config.retention, Duration::from_secs(604_800));
        assert_eq!(config.default_max_retries, 3);
        assert_eq!(config.conflict_strategy, ConflictStrategy::Timestamp);
        assert_eq!(config.id_field, "id");
        assert_eq!(config.volatile_fields, vec!["updated_at".to_string()]);
    }

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new()
            .with_sync_interval(Duration::from_secs(5))
            .with_request_timeout(Duration::from_secs(2))
            .with_max_queue_size(10)
            .with_conflict_strategy(ConflictStrategy::Merge)
            .with_id_field("uuid")
            .with_volatile_fields(["modified", "etag"]);

        assert_eq!(config.sync_interval, Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(2));
        assert_eq!(config.max_queue_size, 10);
        assert_eq!(config.conflict_strategy, ConflictStrategy::Merge);
        assert_eq!(config.id_field, "uuid");
        assert_eq!(config.volatile_fields, vec!["modified", "etag"]);
    }

    #[test]
    fn no_backoff_is_zero() {
        let config = RetryConfig::without_backoff();
        assert_eq!(config.delay_for_attempt(1), Duration::ZERO);
        assert_eq!(config.delay_for_attempt(7), Duration::ZERO);
    }

    #[test]
    fn retry_delay_calculation() {
        let config = RetryConfig::new()
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(2.0);

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);

        let delay1 = config.delay_for_attempt(1);
        assert!(delay1 >= Duration::from_millis(100));
        assert!(delay1 <= Duration::from_millis(125));

        let delay2 = config.delay_for_attempt(2);
        assert!(delay2 >= Duration::from_millis(200));
    }

    #[test]
    fn retry_delay_respects_max() {
        let config = RetryConfig::new()
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(10.0)
            .with_jitter(false);

        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(5));
    }
}
