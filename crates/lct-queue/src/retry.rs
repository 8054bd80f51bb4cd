//! Retry budgets and backoff.

use lct_types::{
    DEFAULT_BASE_RETRY_DELAY_SECS, DEFAULT_MAX_RETRY_DELAY_SECS, DEFAULT_OPERATION_MAX_RETRIES,
    DEFAULT_REQUEST_MAX_RETRIES, DEFAULT_UNVERIFIED_RETRY_DELAY_SECS,
};
use serde::{Deserialize, Serialize};

/// Retry tunables shared by both drains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub base_retry_delay_secs: i64,
    pub max_retry_delay_secs: i64,
    /// Flat delay when a component fails re-verification.
    pub unverified_retry_delay_secs: i64,
    pub request_max_retries: u32,
    pub operation_max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_retry_delay_secs: DEFAULT_BASE_RETRY_DELAY_SECS,
            max_retry_delay_secs: DEFAULT_MAX_RETRY_DELAY_SECS,
            unverified_retry_delay_secs: DEFAULT_UNVERIFIED_RETRY_DELAY_SECS,
            request_max_retries: DEFAULT_REQUEST_MAX_RETRIES,
            operation_max_retries: DEFAULT_OPERATION_MAX_RETRIES,
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt, given the retry count *after* the
    /// failure was recorded: `min(base · 2^(n−1), max)`.
    ///
    /// With the defaults this is 300, 600, 1200, 2400, 4800 and then stays
    /// at 4800.
    pub fn backoff_delay(&self, retry_count: u32) -> i64 {
        let shift = retry_count.saturating_sub(1).min(62);
        self.base_retry_delay_secs
            .saturating_mul(1i64 << shift)
            .min(self.max_retry_delay_secs)
    }
}
