//! WebSocket message types.
//!
//! Every frame is a JSON envelope `{"type": ..., "payload": ...}`. Bookmark
//! changes travel as [`SyncEnvelope`] payloads.
//!
//! [`SyncEnvelope`]: crate::bookmarks::SyncEnvelope

use serde::{Deserialize, Serialize};

/// Server -> Client message envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerMessage {
    /// Message type identifier (e.g., "connected", "sync", "snapshot")
    #[serde(rename = "type")]
    pub msg_type: String,
    pub payload: serde_json::Value,
}

impl ServerMessage {
    /// Create a new server message with the given type and payload.
    pub fn new(msg_type: impl Into<String>, payload: impl Serialize) -> Self {
        Self {
            msg_type: msg_type.into(),
            payload: serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
        }
    }

    /// Create a server message with a null payload.
    pub fn empty(msg_type: impl Into<String>) -> Self {
        Self {
            msg_type: msg_type.into(),
            payload: serde_json::Value::Null,
        }
    }
}

/// Client -> Server message envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// System-level messages.
pub mod system {
    use serde::{Deserialize, Serialize};

    /// Sent immediately after the connection is established.
    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct Connected {
        /// Id this connection's changes are tagged with.
        pub context_id: String,
        /// Replica id of the server's own context.
        pub replica_id: String,
        pub server_version: String,
    }

    /// Error message (server -> client).
    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct Error {
        pub code: String,
        pub message: String,
    }

    impl Error {
        pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
            Self {
                code: code.into(),
                message: message.into(),
            }
        }
    }
}

/// Reserved message type constants.
pub mod msg_types {
    /// Sent by server on successful connection.
    pub const CONNECTED: &str = "connected";
    /// Client heartbeat request.
    pub const PING: &str = "ping";
    /// Server heartbeat response.
    pub const PONG: &str = "pong";
    /// Server error response.
    pub const ERROR: &str = "error";
    /// A bookmark change, in either direction.
    pub const SYNC: &str = "sync";
    /// Full bookmark state (server -> client), when the event log cannot
    /// serve a catch-up.
    pub const SNAPSHOT: &str = "snapshot";
}

pub mod error_codes {
    pub const PARSE_ERROR: &str = "parse_error";
    pub const INVALID_PAYLOAD: &str = "invalid_payload";
    pub const UNKNOWN_TYPE: &str = "unknown_type";
}
