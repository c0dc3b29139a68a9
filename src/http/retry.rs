//! Retry policy for connection-level failures.
//!
//! A status code is an answer and is never retried. Only failures where the
//! request may not have reached the server, or the server vanished before
//! answering, qualify.

use crate::base::neterror::NetError;
use std::time::Duration;

/// Why a failed attempt is worth repeating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    ConnectionReset,
    /// Closed before the response head arrived.
    ConnectionClosed,
    ConnectionAborted,
    EmptyResponse,
    /// Connect or response head timed out.
    Timeout,
}

impl RetryReason {
    /// `None` for errors a fresh attempt would hit again.
    pub fn from_error(error: &NetError) -> Option<Self> {
        Some(match error {
            NetError::ConnectionReset => Self::ConnectionReset,
            NetError::ConnectionClosed => Self::ConnectionClosed,
            NetError::ConnectionAborted => Self::ConnectionAborted,
            NetError::EmptyResponse => Self::EmptyResponse,
            NetError::ConnectionTimedOut => Self::Timeout,
            _ => return None,
        })
    }
}

/// Bounded retries with exponential backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts allowed after the first.
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(1)
    }
}

impl RetryPolicy {
    pub fn new(max_retries: usize) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }

    /// Delay before retry number `retry` (1-based): `base * 2^(retry-1)`,
    /// capped at `max_delay`.
    pub fn backoff(&self, retry: usize) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32 << (retry - 1).min(10);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Decide on a retry after `failed` attempts ended in `error`.
    ///
    /// Returns the reason and the delay to wait, or `None` to give up.
    pub fn next(&self, failed: usize, error: &NetError) -> Option<(RetryReason, Duration)> {
        let reason = RetryReason::from_error(error)?;
        (failed <= self.max_retries).then(|| (reason, self.backoff(failed)))
    }
}
