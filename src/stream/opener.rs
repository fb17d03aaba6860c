use super::source::{CaptureGuard, VideoSource};
use crate::error::StreamError;
use crate::retry::{RetryError, RetryPolicy};
use crate::signal::StopSignal;

use std::sync::Arc;
use tracing::{debug, error, info};

/// Opens a capture handle with bounded retries
pub struct StreamSource {
    source: Arc<dyn VideoSource>,
    policy: RetryPolicy,
}

impl StreamSource {
    pub fn new(source: Arc<dyn VideoSource>, policy: RetryPolicy) -> Self {
        Self { source, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Try to open `address`, sleeping between failed attempts.
    ///
    /// Gives up with [`StreamError::Unavailable`] once the policy's attempts
    /// are spent, or [`StreamError::OpenCancelled`] if `stop` fires first.
    pub fn open(&self, address: &str, stop: &StopSignal) -> Result<CaptureGuard, StreamError> {
        info!(
            "Opening video source {} via {} (up to {} attempts)",
            address,
            self.source.name(),
            self.policy.max_attempts()
        );

        let result = self.policy.retry(stop, |attempt| {
            debug!("Open attempt {} for {}", attempt, address);
            self.source.open(address)
        });

        match result {
            Ok(handle) => {
                info!("Successfully opened video source {}", address);
                Ok(CaptureGuard::new(handle, address))
            }
            Err(RetryError::Exhausted { attempts, last }) => {
                error!(
                    "Giving up on opening video source {} after {} attempts: {}",
                    address, attempts, last
                );
                Err(StreamError::Unavailable {
                    address: address.to_string(),
                    attempts,
                })
            }
            Err(RetryError::Stopped { attempts }) => {
                info!(
                    "Stop requested while opening {} (after {} attempts)",
                    address, attempts
                );
                Err(StreamError::OpenCancelled {
                    address: address.to_string(),
                })
            }
        }
    }
}
