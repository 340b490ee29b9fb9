//! Scripted HTTP transport.

use async_trait::async_trait;
use hot100_etl::fetcher::{HttpTransport, TransportError, TransportResponse};
use reqwest::Method;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum StubReply {
    Page(String),
    Status(u16),
    ConnectionError,
}

/// Serves scripted replies per URL. The last reply of a script repeats;
/// unknown URLs get a 404.
pub struct StubTransport {
    routes: Mutex<HashMap<String, VecDeque<StubReply>>>,
    calls: Mutex<HashMap<String, usize>>,
    latency: Duration,
    completed: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl StubTransport {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            latency: Duration::ZERO,
            completed: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn route(self, url: &str, replies: Vec<StubReply>) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), replies.into());
        self
    }

    pub fn page(self, url: &str, html: String) -> Self {
        self.route(url, vec![StubReply::Page(html)])
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    /// Requests that have returned a reply.
    pub fn completed_calls(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_reply(&self, url: &str) -> StubReply {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_insert(0) += 1;

        let mut routes = self.routes.lock().unwrap();
        match routes.get_mut(url) {
            Some(script) if script.len() > 1 => script.pop_front().unwrap(),
            Some(script) => script.front().cloned().unwrap_or(StubReply::Status(404)),
            None => StubReply::Status(404),
        }
    }
}

#[async_trait]
impl HttpTransport for StubTransport {
    async fn send(&self, _method: Method, url: &str) -> Result<TransportResponse, TransportError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let reply = self.next_reply(url);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);

        match reply {
            StubReply::Page(html) => Ok(TransportResponse {
                status: 200,
                body: html.into_bytes(),
            }),
            StubReply::Status(status) => Ok(TransportResponse {
                status,
                body: Vec::new(),
            }),
            StubReply::ConnectionError => {
                Err(TransportError::Connection("connection refused".to_string()))
            }
        }
    }
}
