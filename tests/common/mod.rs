//! Common test infrastructure
//!
//! Stub transport, generated chart pages and a pipeline builder. Tests should
//! only import from this module.
//!
//! ```no_run
//! mod common;
//! use common::{full_chart_page, url_for, week, weeks, PipelineBuilder, StubTransport};
//! use std::sync::Arc;
//!
//! #[tokio::test]
//! async fn test_single_week() {
//!     let transport = Arc::new(StubTransport::new().page(&url_for(week(0)), full_chart_page("A")));
//!     let pipeline = PipelineBuilder::new(transport).build();
//!     let outcome = pipeline.run(weeks(1)).await.unwrap();
//!     assert_eq!(outcome.entries.len(), 100);
//! }
//! ```
#![allow(dead_code)]

mod constants;
mod fixtures;
mod harness;
mod transport;

pub use constants::*;
pub use fixtures::*;
pub use harness::*;
pub use transport::{StubReply, StubTransport};
