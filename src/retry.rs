//! Retry with exponential backoff
//!
//! Every outbound Google API call runs inside this wrapper. Failures are
//! classified through the [`HttpStatusError`] capability: rate limits (429)
//! and server errors (5xx) are retried, everything else is returned to the
//! caller on first occurrence.
//!
//! The executor is transparent: it never logs, never wraps the error it
//! returns and keeps no state between calls.

use std::future::Future;
use std::time::Duration;

/// Capability for errors that carry an HTTP status code.
///
/// Returning `None` marks the error as opaque, which is never retried.
pub trait HttpStatusError {
    fn http_status_code(&self) -> Option<u16>;
}

impl<E: HttpStatusError + ?Sized> HttpStatusError for &E {
    fn http_status_code(&self) -> Option<u16> {
        (**self).http_status_code()
    }
}

impl<E: HttpStatusError + ?Sized> HttpStatusError for Box<E> {
    fn http_status_code(&self) -> Option<u16> {
        (**self).http_status_code()
    }
}

/// Decide whether an error is transient.
pub fn should_retry<E: HttpStatusError + ?Sized>(err: &E) -> bool {
    match err.http_status_code() {
        Some(429) => true,
        Some(code) => (500..600).contains(&code),
        None => false,
    }
}

/// Run `operation` with up to `max_retries` retries after the initial attempt.
///
/// The delay before retry `n` (0-based) is `base_delay * 2^n`. A negative
/// `max_retries` performs no attempt at all and reports success.
pub fn with_retry<E, F>(operation: F, max_retries: i32, base_delay: Duration) -> Result<(), E>
where
    E: HttpStatusError,
    F: FnMut() -> Result<(), E>,
{
    // A negative budget performs no attempt
    let Ok(max_retries) = u32::try_from(max_retries) else {
        return Ok(());
    };

    RetryPolicy::new(max_retries, base_delay).retry(operation)
}

/// Attempt budget and backoff base for a retried call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the initial attempt (total attempts = `max_retries + 1`)
    pub max_retries: u32,

    /// Delay before the first retry; doubles for every later one
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Policy used for Google API calls: 3 retries starting at one second.
    pub const API_DEFAULT: Self = Self::new(3, Duration::from_secs(1));

    pub const fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Total number of times the operation may be invoked.
    pub fn max_attempts(&self) -> u64 {
        u64::from(self.max_retries) + 1
    }

    /// Backoff before the retry that follows `attempt`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }

    /// Blocking form: sleeps the calling thread between attempts.
    pub fn retry<T, E, F>(&self, mut operation: F) -> Result<T, E>
    where
        E: HttpStatusError,
        F: FnMut() -> Result<T, E>,
    {
        let mut attempt = 0u32;
        loop {
            let err = match operation() {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            match self.next_delay(attempt, &err) {
                Some(delay) => {
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                    attempt += 1;
                }
                None => return Err(err),
            }
        }
    }

    /// Async form: suspends the task on `tokio::time::sleep` between attempts.
    pub async fn retry_async<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        E: HttpStatusError,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0u32;
        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            match self.next_delay(attempt, &err) {
                Some(delay) => {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                None => return Err(err),
            }
        }
    }

    /// `None` when `err` must be surfaced: budget spent or not retryable.
    fn next_delay<E: HttpStatusError>(&self, attempt: u32, err: &E) -> Option<Duration> {
        if attempt >= self.max_retries || !should_retry(err) {
            return None;
        }
        Some(self.delay_for_attempt(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::API_DEFAULT
    }
}
