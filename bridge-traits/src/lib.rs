//! # Host Bridge Traits
//!
//! Capability contracts the account-linking core requires from its host.
//!
//! ## Overview
//!
//! The binding core never talks to the network, a database or the wall clock
//! directly. Each of those capabilities is described by a trait here and
//! supplied by the host: `bridge-desktop` ships the default adapters, tests
//! inject in-memory doubles.
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - Outbound HTTP with per-request timeouts
//! - [`SettingsStore`](storage::SettingsStore) - Durable key-value settings (holds the `account` record)
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](log::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert platform-specific errors into it and keep messages
//! actionable, without embedding secrets.
//!
//! ## Thread Safety
//!
//! Every trait requires `Send + Sync` so handles can be shared across request
//! handlers behind an `Arc`.
//!
//! ## Example
//!
//! ```ignore
//! use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
//! use bridge_traits::error::Result;
//! use async_trait::async_trait;
//!
//! pub struct MyHttpClient {
//!     client: reqwest::Client,
//! }
//!
//! #[async_trait]
//! impl HttpClient for MyHttpClient {
//!     async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
//!         todo!()
//!     }
//! }
//! ```

pub mod error;
pub mod http;
pub mod log;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use log::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
pub use storage::SettingsStore;
pub use time::{Clock, FixedClock, SystemClock};
