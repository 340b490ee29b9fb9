//! Chart page fetching: retries, request limiting and pacing.

mod client;
mod pacing;
mod retry_policy;
mod transport;

pub use client::{FetchError, RetryingHttpClient};
pub use pacing::RequestPacer;
pub use retry_policy::{AttemptFailure, RetryPolicy};
pub use transport::{
    HttpTransport, ReqwestTransport, TransportConfig, TransportError, TransportResponse,
};

use crate::chart::ChartDate;

/// `{base_url}/{chart_name}/{YYYY-MM-DD}/`
pub fn chart_url(base_url: &str, chart_name: &str, date: ChartDate) -> String {
    format!(
        "{}/{}/{}/",
        base_url.trim_end_matches('/'),
        chart_name.trim_matches('/'),
        date.to_iso()
    )
}
