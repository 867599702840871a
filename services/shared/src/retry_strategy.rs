use backoff::backoff::{Backoff, Constant};
use std::future::Future;
use std::time::Duration;

/// Bounded retry with a fixed delay between attempts
///
/// Used for broker connection setup on both sides of the queue. `max_retries`
/// is the total number of attempts; zero is treated as one.
#[derive(Debug, Clone)]
pub struct RetryStrategy {
    max_retries: u32,
    delay: Duration,
}

/// All attempts failed; carries the last error seen
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

impl RetryStrategy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            delay,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn create_backoff(&self) -> Constant {
        Constant::new(self.delay)
    }

    /// Whether another attempt is allowed after `attempt` attempts were made
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Run `operation` until it succeeds or the attempt budget is spent
    ///
    /// The closure receives the 1-based attempt number. No delay follows the
    /// final failed attempt.
    pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> Result<T, RetryExhausted<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut backoff = self.create_backoff();
        let mut attempt = 0;

        loop {
            attempt += 1;
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if !self.should_retry(attempt) {
                        return Err(RetryExhausted {
                            attempts: attempt,
                            last_error: error,
                        });
                    }

                    let delay = backoff.next_backoff().unwrap_or(self.delay);
                    tracing::warn!(
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
