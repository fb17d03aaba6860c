use crate::signal::StopSignal;
use std::fmt::Display;
use std::time::Duration;
use tracing::{debug, warn};

/// How the delay grows between attempts
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Same delay before every retry
    Fixed,
    /// Delay doubles per retry, capped at `max_delay`
    Exponential { max_delay: Duration },
}

/// Bounded retry policy shared by stream acquisition and read back-off
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    backoff: Backoff,
}

/// Why a retried operation did not produce a value
#[derive(Debug, Clone, PartialEq)]
pub enum RetryError<E> {
    /// Every attempt failed; carries the last failure
    Exhausted { attempts: u32, last: E },
    /// A stop request arrived before an attempt succeeded
    Stopped { attempts: u32 },
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            delay,
            backoff,
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::new(max_attempts, delay, Backoff::Fixed)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait after the `retry_count`-th failure (zero based)
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential { max_delay } => {
                let factor = 2u32.saturating_pow(retry_count);
                self.delay.saturating_mul(factor).min(max_delay)
            }
        }
    }

    /// Run `op` until it succeeds, the attempts run out, or `stop` fires.
    ///
    /// `op` receives the 1-based attempt number. The policy sleeps between
    /// attempts only, never after the last one.
    pub fn retry<T, E, F>(&self, stop: &StopSignal, mut op: F) -> Result<T, RetryError<E>>
    where
        E: Display,
        F: FnMut(u32) -> Result<T, E>,
    {
        let mut attempts = 0;
        loop {
            if stop.is_triggered() {
                return Err(RetryError::Stopped { attempts });
            }

            attempts += 1;
            let error = match op(attempts) {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if attempts >= self.max_attempts {
                return Err(RetryError::Exhausted {
                    attempts,
                    last: error,
                });
            }

            let delay = self.delay_for(attempts - 1);
            warn!(
                "Attempt {}/{} failed: {}; retrying in {:?}",
                attempts, self.max_attempts, error, delay
            );
            if stop.sleep(delay) {
                debug!("Stop requested during retry back-off");
                return Err(RetryError::Stopped { attempts });
            }
        }
    }
}
