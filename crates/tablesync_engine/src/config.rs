//! Configuration for the sync controller.

use std::time::Duration;

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// How long an unreleased lock stays held.
    pub lock_ttl: Duration,
    /// Maximum number of records sent in one write request.
    pub write_batch_limit: usize,
    /// Retry configuration for the read wrapper.
    pub retry: RetryConfig,
    /// Watermark age below which `sync_table` skips the network.
    pub default_freshness: Duration,
    /// Transport timeout carried in each request.
    pub request_timeout: Duration,
}

impl SyncConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            lock_ttl: Duration::from_secs(60),
            write_batch_limit: 500,
            retry: RetryConfig::default(),
            default_freshness: Duration::from_secs(60 * 60),
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Sets the lock TTL.
    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    /// Sets the write batch limit.
    pub fn with_write_batch_limit(mut self, limit: usize) -> Self {
        self.write_batch_limit = limit;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the default freshness window.
    pub fn with_default_freshness(mut self, freshness: Duration) -> Self {
        self.default_freshness = freshness;
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed-interval retry for the read wrapper.
///
/// There is no backoff: an attempt is cheap and lock contention clears
/// within one lock TTL.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub interval: Duration,
}

impl RetryConfig {
    /// Creates a retry configuration.
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
        }
    }

    /// Creates a configuration with a single attempt.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(60, Duration::from_secs(1))
    }
}
