//! Retry policy for chart page requests.
//!
//! Exponential backoff with additive jitter: `base * multiplier^retry + U(0, base)`,
//! capped at `max_backoff_ms`.

use crate::config::RetrySettings;
use rand::Rng;
use reqwest::Method;
use std::time::Duration;

use super::transport::TransportError;

/// Why a single attempt did not produce a usable body.
#[derive(Debug)]
pub enum AttemptFailure {
    Status(u16),
    Transport(TransportError),
}

/// Retry policy implementing exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per request, including the first one.
    pub max_attempts: u32,
    /// Backoff before the first retry, in milliseconds.
    pub backoff_base_ms: u64,
    /// Cap applied to the exponential growth, in milliseconds.
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    /// HTTP statuses worth another attempt.
    pub retryable_statuses: Vec<u16>,
}

impl RetryPolicy {
    pub fn new(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            backoff_base_ms: settings.backoff_base_ms,
            max_backoff_ms: settings.max_backoff_ms,
            backoff_multiplier: 2.0,
            retryable_statuses: settings.retryable_statuses.clone(),
        }
    }

    /// Only idempotent methods are retried.
    pub fn is_retryable_method(&self, method: &Method) -> bool {
        matches!(*method, Method::GET | Method::HEAD)
    }

    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }

    /// Whether another attempt should follow `attempt` (1-based) failing with `failure`.
    ///
    /// Transport faults (timeouts, refused connections) are always retryable;
    /// statuses only when they are in the configured set.
    pub fn should_retry(&self, failure: &AttemptFailure, attempt: u32) -> bool {
        let retryable = match failure {
            AttemptFailure::Status(status) => self.is_retryable_status(*status),
            AttemptFailure::Transport(_) => true,
        };
        retryable && attempt < self.max_attempts
    }

    /// Deterministic part of the backoff for the given retry (0-based).
    pub fn backoff_ms(&self, retry_count: u32) -> u64 {
        let backoff =
            self.backoff_base_ms as f64 * self.backoff_multiplier.powi(retry_count as i32);
        backoff.min(self.max_backoff_ms as f64) as u64
    }

    /// Backoff plus a uniform jitter of up to one base interval, still capped.
    pub fn backoff_with_jitter(&self, retry_count: u32) -> Duration {
        let jitter = if self.backoff_base_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=self.backoff_base_ms)
        };
        let total = (self.backoff_ms(retry_count) + jitter).min(self.max_backoff_ms);
        Duration::from_millis(total)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 250,
            max_backoff_ms: 15_000,
            backoff_multiplier: 2.0,
            retryable_statuses: vec![429, 500, 502, 503, 504],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_from_settings() {
        let settings = RetrySettings {
            max_attempts: 5,
            backoff_base_ms: 100,
            max_backoff_ms: 2000,
            retryable_statuses: vec![503],
        };
        let policy = RetryPolicy::new(&settings);

        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.backoff_base_ms, 100);
        assert_eq!(policy.max_backoff_ms, 2000);
        assert_eq!(policy.retryable_statuses, vec![503]);
    }

    #[test]
    fn test_backoff_calculation() {
        let policy = RetryPolicy {
            backoff_base_ms: 250,
            max_backoff_ms: 15_000,
            ..Default::default()
        };

        assert_eq!(policy.backoff_ms(0), 250);
        assert_eq!(policy.backoff_ms(1), 500);
        assert_eq!(policy.backoff_ms(2), 1000);
        assert_eq!(policy.backoff_ms(3), 2000);
    }

    #[test]
    fn test_backoff_capping() {
        let policy = RetryPolicy {
            backoff_base_ms: 1000,
            max_backoff_ms: 3000,
            ..Default::default()
        };

        assert_eq!(policy.backoff_ms(1), 2000);
        assert_eq!(policy.backoff_ms(2), 3000);
        assert_eq!(policy.backoff_ms(10), 3000);
    }

    #[test]
    fn test_jitter_stays_within_one_base_interval() {
        let policy = RetryPolicy {
            backoff_base_ms: 100,
            max_backoff_ms: 10_000,
            ..Default::default()
        };

        for _ in 0..50 {
            let delay = policy.backoff_with_jitter(2).as_millis() as u64;
            assert!((400..=500).contains(&delay), "delay was {}", delay);
        }
    }

    #[test]
    fn test_jitter_respects_cap() {
        let policy = RetryPolicy {
            backoff_base_ms: 100,
            max_backoff_ms: 150,
            ..Default::default()
        };

        for _ in 0..50 {
            assert!(policy.backoff_with_jitter(4) <= Duration::from_millis(150));
        }
    }

    #[test]
    fn test_zero_base_means_no_wait() {
        let policy = RetryPolicy {
            backoff_base_ms: 0,
            ..Default::default()
        };
        assert_eq!(policy.backoff_with_jitter(3), Duration::ZERO);
    }

    #[test]
    fn test_should_retry_status() {
        let policy = RetryPolicy::default();

        assert!(policy.should_retry(&AttemptFailure::Status(503), 1));
        assert!(policy.should_retry(&AttemptFailure::Status(429), 2));
        assert!(!policy.should_retry(&AttemptFailure::Status(404), 1));
        assert!(!policy.should_retry(&AttemptFailure::Status(403), 1));
    }

    #[test]
    fn test_should_retry_transport_errors() {
        let policy = RetryPolicy::default();
        let failure = AttemptFailure::Transport(TransportError::Timeout("read".to_string()));
        assert!(policy.should_retry(&failure, 1));
    }

    #[test]
    fn test_should_retry_stops_at_max_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            ..Default::default()
        };

        assert!(policy.should_retry(&AttemptFailure::Status(503), 1));
        assert!(policy.should_retry(&AttemptFailure::Status(503), 2));
        assert!(!policy.should_retry(&AttemptFailure::Status(503), 3));
        assert!(!policy.should_retry(&AttemptFailure::Status(503), 4));
    }

    #[test]
    fn test_only_idempotent_methods_retry() {
        let policy = RetryPolicy::default();
        assert!(policy.is_retryable_method(&Method::GET));
        assert!(policy.is_retryable_method(&Method::HEAD));
        assert!(!policy.is_retryable_method(&Method::POST));
        assert!(!policy.is_retryable_method(&Method::PUT));
    }
}
