//! crates/request_queue/src/config.rs
//! Tunables of the adaptive batching wait.

use std::time::Duration;

use crate::error::RequestQueueError;

/// Wait budget and batch targets of a [`RequestQueue`](crate::RequestQueue).
///
/// The defaults aim the worker at 32–64 requests per wakeup while sleeping
/// between 5 µs and 1 ms. They are tuned values, not correctness
/// requirements.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RequestQueueConfig {
    /// Wait used at start-up and after every dormant sleep.
    pub default_wait: Duration,
    /// Floor of the adaptive wait.
    pub min_wait: Duration,
    /// Ceiling of the adaptive wait; reaching it makes the queue dormant.
    pub max_wait: Duration,
    /// Batches smaller than this lengthen the wait.
    pub min_batch: usize,
    /// Batches larger than this shorten the wait.
    pub max_batch: usize,
    /// Percentage by which the wait changes per adjustment.
    pub adjustment_percent: u32,
}

impl Default for RequestQueueConfig {
    fn default() -> Self {
        Self {
            default_wait: Duration::from_micros(10),
            min_wait: Duration::from_micros(5),
            max_wait: Duration::from_millis(1),
            min_batch: 32,
            max_batch: 64,
            adjustment_percent: 25,
        }
    }
}

impl RequestQueueConfig {
    /// Checks that the bounds are ordered.
    pub fn validate(&self) -> Result<(), RequestQueueError> {
        if self.min_wait.is_zero() {
            return Err(RequestQueueError::InvalidConfig(
                "minimum wait must be positive".to_owned(),
            ));
        }
        if self.min_wait > self.default_wait || self.default_wait > self.max_wait {
            return Err(RequestQueueError::InvalidConfig(format!(
                "waits must satisfy {:?} <= {:?} <= {:?}",
                self.min_wait, self.default_wait, self.max_wait
            )));
        }
        if self.min_batch > self.max_batch {
            return Err(RequestQueueError::InvalidConfig(format!(
                "batch target {}..{} is empty",
                self.min_batch, self.max_batch
            )));
        }
        if self.adjustment_percent == 0 || self.adjustment_percent >= 100 {
            return Err(RequestQueueError::InvalidConfig(format!(
                "adjustment of {}% is outside 1..100",
                self.adjustment_percent
            )));
        }
        Ok(())
    }

    /// Applies one adaptive step for a batch of `batch` requests.
    #[must_use]
    pub fn adjust_wait(&self, wait: Duration, batch: usize) -> Duration {
        let step = wait * self.adjustment_percent / 100;
        let adjusted = if batch < self.min_batch {
            wait + step
        } else if batch > self.max_batch {
            wait.saturating_sub(step)
        } else {
            wait
        };
        adjusted.clamp(self.min_wait, self.max_wait)
    }
}
