//! Async API client core for the movie-review service.
//!
//! # Overview
//! `ReviewClient` builds `HttpRequest` values and parses `HttpResponse`
//! values without touching the network. `ApiClient` drives those requests
//! through a host-supplied `Transport`, coalescing identical in-flight reads
//! and retrying transient read failures with exponential backoff.
//!
//! # Design
//! - The host does the I/O: anything implementing `Transport` can carry the
//!   requests, which keeps the core deterministic under test.
//! - Reads are de-duplicated by key and retried; writes are sent exactly once.
//! - The in-flight map belongs to the client instance, never to a global.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod api;
pub mod client;
pub mod comments;
pub mod config;
pub mod dedup;
pub mod error;
pub mod http;
pub mod retry;
pub mod sequence;
pub mod types;

pub use api::ApiClient;
pub use client::ReviewClient;
pub use comments::CommentNode;
pub use config::{ClientConfig, ConfigError};
pub use dedup::InflightCache;
pub use error::ApiError;
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport, TransportError};
pub use retry::RetryPolicy;
pub use sequence::{Sequenced, Sequencer, Ticket};
pub use types::*;
