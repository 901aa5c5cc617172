//! Retry logic with exponential backoff
//!
//! Container and metadata transfers go through [`with_retry`]. Only errors
//! classified as transient by [`IsRetryable`] are retried; authentication
//! failures surface immediately so the user can log in again.
//!
//! # Example
//!
//! ```no_run
//! use audiobook_dl::retry::{IsRetryable, with_retry};
//! use audiobook_dl::config::RetryConfig;
//! use tokio_util::sync::CancellationToken;
//!
//! #[derive(Debug)]
//! enum FetchError {
//!     Timeout,
//!     Forbidden,
//! }
//!
//! impl std::fmt::Display for FetchError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for FetchError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, FetchError::Timeout)
//!     }
//! }
//!
//! # async fn example() -> Result<(), FetchError> {
//! let config = RetryConfig::default();
//! let cancel = CancellationToken::new();
//! with_retry(&config, &cancel, || async { Ok::<_, FetchError>(()) }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, connection resets, 5xx responses) return `true`.
/// Permanent failures (expired session, disk full, tool failure) return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(_) => true,
            Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_body(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            // Re-authentication is a user action
            Error::Auth(_) => false,
            Error::Conversion(_) | Error::ExternalTool(_) => false,
            Error::Storage(_) | Error::InsufficientSpace { .. } => false,
            Error::Cancelled | Error::ShuttingDown => false,
            Error::Database(_) | Error::Sqlx(_) | Error::Job(_) => false,
            Error::Config { .. }
            | Error::NotFound(_)
            | Error::DuplicateActiveJob { .. }
            | Error::AlreadyInLibrary { .. }
            | Error::Serialization(_)
            | Error::ApiServerError(_)
            | Error::Other(_) => false,
        }
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// The operation runs once, then up to `config.max_attempts` more times while it
/// keeps failing with a retryable error. Returns the successful result or the
/// last error. Cancelling `cancel` cuts a pending backoff short and returns the
/// error that triggered it.
pub async fn with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis(),
                    "transient failure, retrying"
                );

                let wait = if config.jitter { add_jitter(delay) } else { delay };
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = cancel.cancelled() => {
                        tracing::debug!(attempt, "retry abandoned, operation cancelled");
                        return Err(e);
                    }
                }

                let next = Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier);
                delay = next.min(config.max_delay);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt + 1,
                        "retries exhausted"
                    );
                } else {
                    tracing::debug!(error = %e, "non-retryable failure");
                }
                return Err(e);
            }
        }
    }
}

/// Add up to 100% random jitter, giving a delay in `[delay, 2 * delay]`
fn add_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + factor))
}
