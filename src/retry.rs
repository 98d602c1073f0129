//! Retry logic with exponential backoff
//!
//! Transient failures (timeouts, connection resets, server 5xx) are retried
//! with exponential backoff and optional jitter; permanent failures are
//! returned immediately.
//!
//! # Example
//!
//! ```
//! use backup_ingest::config::RetryConfig;
//! use backup_ingest::retry::Backoff;
//! use std::time::Duration;
//!
//! let config = RetryConfig {
//!     max_attempts: 2,
//!     initial_delay: Duration::from_secs(1),
//!     jitter: false,
//!     ..RetryConfig::default()
//! };
//! let mut backoff = Backoff::new(&config);
//! assert_eq!(backoff.next_delay(), Some(Duration::from_secs(1)));
//! assert_eq!(backoff.next_delay(), Some(Duration::from_secs(2)));
//! assert_eq!(backoff.next_delay(), None);
//! ```

use crate::config::RetryConfig;
use crate::error::{Error, TransferError};
use rand::Rng;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network timeouts, server busy, connection reset) return `true`.
/// Permanent failures (client errors, disk full, corrupt data) return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for TransferError {
    fn is_retryable(&self) -> bool {
        match self {
            // 408 Request Timeout and 429 Too Many Requests are the only
            // client errors worth repeating
            TransferError::HttpStatus { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            TransferError::Connection(_) => true,
            TransferError::Incomplete { .. } => true,
            TransferError::SizeMismatch { .. } => false,
            TransferError::InvalidResponse(_) => false,
            TransferError::InvalidRequest(_) => false,
            // Local write failures (disk full, permission denied) need operator action
            TransferError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted
            ),
        }
    }
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Transfer(e) => e.is_retryable(),
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::Interrupted
            ),
            // Extraction, indexing and state errors are permanent: the same
            // input produces the same failure
            _ => false,
        }
    }
}

/// Delay schedule for one retried operation
///
/// Hands out at most `max_attempts` delays, growing by `backoff_multiplier`
/// up to `max_delay`.
#[derive(Debug)]
pub struct Backoff<'a> {
    config: &'a RetryConfig,
    retries: u32,
    delay: Duration,
}

impl<'a> Backoff<'a> {
    /// Start a fresh schedule
    pub fn new(config: &'a RetryConfig) -> Self {
        Self {
            config,
            retries: 0,
            delay: config.initial_delay,
        }
    }

    /// Retries handed out so far
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Delay before the next retry, or `None` once the budget is spent
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.retries >= self.config.max_attempts {
            return None;
        }
        self.retries += 1;

        let current = self.delay;
        let next = Duration::from_secs_f64(current.as_secs_f64() * self.config.backoff_multiplier);
        self.delay = next.min(self.config.max_delay);

        Some(if self.config.jitter {
            add_jitter(current)
        } else {
            current
        })
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The result lies between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
