use super::retry_policy::{AttemptFailure, RetryPolicy};
use super::transport::{HttpTransport, TransportError};
use reqwest::Method;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::debug;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url} after {attempts} attempt(s)")]
    Status {
        url: String,
        status: u16,
        attempts: u32,
    },
    #[error("Request to {url} failed after {attempts} attempt(s): {source}")]
    Transport {
        url: String,
        attempts: u32,
        #[source]
        source: TransportError,
    },
}

impl FetchError {
    /// Last HTTP status seen, if the failure was a status.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            FetchError::Transport { .. } => None,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            FetchError::Status { attempts, .. } | FetchError::Transport { attempts, .. } => {
                *attempts
            }
        }
    }

    fn from_attempt(url: &str, attempts: u32, failure: AttemptFailure) -> Self {
        match failure {
            AttemptFailure::Status(status) => FetchError::Status {
                url: url.to_string(),
                status,
                attempts,
            },
            AttemptFailure::Transport(source) => FetchError::Transport {
                url: url.to_string(),
                attempts,
                source,
            },
        }
    }
}

/// HTTP client with bounded retries and a cap on concurrent requests.
///
/// The in-flight limiter is held only while a request is on the wire, never
/// during backoff sleeps, so retries waiting out their delay do not starve
/// other workers. Clones share the transport and the limiter.
#[derive(Clone)]
pub struct RetryingHttpClient {
    transport: Arc<dyn HttpTransport>,
    policy: RetryPolicy,
    in_flight: Arc<Semaphore>,
}

impl RetryingHttpClient {
    pub fn new(transport: Arc<dyn HttpTransport>, policy: RetryPolicy, max_in_flight: usize) -> Self {
        Self {
            transport,
            policy,
            in_flight: Arc::new(Semaphore::new(max_in_flight.max(1))),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Requests that could start right now without waiting on the limiter.
    pub fn available_permits(&self) -> usize {
        self.in_flight.available_permits()
    }

    /// GET `url` and return the body of the first 2xx response.
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.request(Method::GET, url).await
    }

    pub async fn request(&self, method: Method, url: &str) -> Result<Vec<u8>, FetchError> {
        let retry_allowed = self.policy.is_retryable_method(&method);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let outcome = match self.in_flight.acquire().await {
                Ok(_permit) => self.transport.send(method.clone(), url).await,
                Err(_) => Err(TransportError::Other("request limiter closed".to_string())),
            };

            let failure = match outcome {
                Ok(response) if (200..300).contains(&response.status) => {
                    return Ok(response.body);
                }
                Ok(response) => AttemptFailure::Status(response.status),
                Err(err) => AttemptFailure::Transport(err),
            };

            if !retry_allowed || !self.policy.should_retry(&failure, attempt) {
                return Err(FetchError::from_attempt(url, attempt, failure));
            }

            let delay = self.policy.backoff_with_jitter(attempt - 1);
            debug!(
                "Attempt {}/{} for {} failed ({:?}), retrying in {:?}",
                attempt, self.policy.max_attempts, url, failure, delay
            );
            tokio::time::sleep(delay).await;
        }
    }
}
