//! # tradestation-rs
//!
//! Async client core for the TradeStation brokerage API.
//!
//! The crate handles the two stateful parts of talking to the API:
//!
//! - **OAuth token lifecycle** ([`auth::TokenManager`]): authorization-code
//!   (with PKCE and a localhost redirect listener), client-credentials or
//!   refresh-token start, proactive refresh inside a safety margin, and
//!   single-flight renewal shared by every concurrent caller.
//! - **Streaming** ([`stream::StreamSession`]): newline-delimited JSON over a
//!   long-lived HTTP response, classified into typed [`stream::StreamEvent`]s,
//!   with heartbeat-based stall detection and exponential-backoff reconnects.
//!
//! ## Features
//!
//! - **Pull-based streams**: `next().await` or `into_stream()`, with
//!   backpressure and prompt release on drop
//! - **Errors as data**: malformed or server error frames arrive as
//!   [`stream::ErrorFrame`] events and never end the stream
//! - **Explicit configuration**: nothing is read from the environment
//! - **Decimal precision**: prices are [`rust_decimal::Decimal`]
//! - **Structured logging** through `tracing`
//!

// Public modules
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod stream;
pub mod types;

// Internal modules
mod http;

// Re-export commonly used types
pub use auth::{Token, TokenManager};
pub use client::TradeStationClient;
pub use config::{AuthConfig, ClientConfig, Environment, GrantMode, StreamConfig};
pub use error::{AuthError, Error, Result};
pub use stream::{StreamEvent, StreamSession, Subscription};
