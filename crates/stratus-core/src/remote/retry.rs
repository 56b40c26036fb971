//! Retry classification and exponential backoff for remote calls

use std::time::Duration;

use super::BlobError;

/// Whether a failed remote call may be attempted again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    Retryable,
    Terminal,
}

/// Bounded exponential backoff: `base_delay * 2^retry` for each retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (zero-based).
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay
            .saturating_mul(1_u32.checked_shl(retry).unwrap_or(u32::MAX))
    }

    /// Classify a transport failure.
    ///
    /// Rate limits, gateway and server errors (including the 520-527 edge
    /// range) and 403 (often a quota signal) are retried, as are failures
    /// with no status at all. 404, 401 and every other status are terminal.
    #[must_use]
    pub const fn classify(error: &BlobError) -> RetryClass {
        match error {
            BlobError::Transport(_) => RetryClass::Retryable,
            BlobError::InvalidPayload(_) => RetryClass::Terminal,
            BlobError::Status { status, .. } => match *status {
                403 | 429 | 500 | 502 | 503 | 504 | 520..=527 => RetryClass::Retryable,
                _ => RetryClass::Terminal,
            },
        }
    }
}
