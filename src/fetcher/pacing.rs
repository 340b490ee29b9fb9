//! Randomized pause between a worker's requests.

use rand_distr::{Distribution, Exp};
use std::time::Duration;

/// Draws exponentially distributed delays with a fixed mean.
///
/// Spreads requests from many workers into a Poisson-like stream instead of
/// bursts. A zero mean disables pacing.
#[derive(Debug, Clone)]
pub struct RequestPacer {
    mean: Duration,
    distribution: Option<Exp<f64>>,
}

impl RequestPacer {
    pub fn new(mean: Duration) -> Self {
        let distribution = if mean.is_zero() {
            None
        } else {
            Exp::new(1.0 / mean.as_secs_f64()).ok()
        };
        Self { mean, distribution }
    }

    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn mean(&self) -> Duration {
        self.mean
    }

    pub fn next_delay(&self) -> Duration {
        match &self.distribution {
            Some(exp) => Duration::from_secs_f64(exp.sample(&mut rand::rng())),
            None => Duration::ZERO,
        }
    }

    pub async fn pause(&self) {
        let delay = self.next_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
