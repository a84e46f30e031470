//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.

mod client;
mod server;

pub use client::{TestClient, WsClient};
pub use server::TestServer;

/// Maximum time to wait for the server to become ready (milliseconds)
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Interval between readiness checks (milliseconds)
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 10;

/// Default timeout for HTTP requests in tests (seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 5;

/// How long to wait for a WebSocket message before giving up (milliseconds)
pub const WS_MESSAGE_TIMEOUT_MS: u64 = 2000;
