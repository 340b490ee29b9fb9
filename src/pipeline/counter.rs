//! Shared count of successfully parsed charts.

use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CounterError {
    #[error("Progress counter overflow: {attempted} exceeds expected total {stop_at}")]
    Overflow { attempted: u64, stop_at: u64 },
}

/// Monotonic counter with a hard ceiling.
///
/// Incremented once per parsed chart. Going past `stop_at` means a chart was
/// counted twice or the expected total was wrong, so the increment fails
/// instead of clamping.
#[derive(Debug)]
pub struct ProgressCounter {
    count: Mutex<u64>,
    stop_at: u64,
}

impl ProgressCounter {
    pub fn new(stop_at: u64) -> Self {
        Self {
            count: Mutex::new(0),
            stop_at,
        }
    }

    /// Add one and return the new value.
    pub async fn increment(&self) -> Result<u64, CounterError> {
        let mut count = self.count.lock().await;
        let attempted = *count + 1;
        if attempted > self.stop_at {
            return Err(CounterError::Overflow {
                attempted,
                stop_at: self.stop_at,
            });
        }
        *count = attempted;
        Ok(attempted)
    }

    pub async fn value(&self) -> u64 {
        *self.count.lock().await
    }

    pub fn stop_at(&self) -> u64 {
        self.stop_at
    }
}
