//! Protocol Messages
//!
//! Wire format for the live feed over WebSocket. Messages are JSON;
//! snapshots can also be sent as bincode binary frames once a client asks
//! for it. The feed is read-only: no client message reaches the engine.

use serde::{Serialize, Deserialize};

use crate::game::events::RoundEvent;
use crate::game::state::RoundSnapshot;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Request the current snapshot immediately.
    SyncRequest,

    /// Request crash history, most recent first.
    HistoryRequest {
        /// Maximum number of values to return.
        #[serde(default)]
        limit: Option<usize>,
    },

    /// Choose how snapshots are encoded.
    SetEncoding {
        /// Send snapshots as bincode binary frames.
        binary: bool,
    },

    /// Ping for latency measurement.
    Ping {
        /// Client timestamp, echoed back in the pong.
        timestamp: u64,
    },
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// First message on every connection.
    Welcome(WelcomeInfo),

    /// Current round state.
    Snapshot(RoundSnapshot),

    /// Round transition.
    Event(RoundEvent),

    /// Crash history.
    History {
        /// Crash values, most recent first.
        values: Vec<f64>,
    },

    /// Pong response.
    Pong {
        /// Timestamp from the ping.
        timestamp: u64,
        /// Server time in milliseconds since the epoch.
        server_time: u64,
    },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown {
        /// Why the feed is closing.
        reason: String,
    },
}

/// Connection greeting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WelcomeInfo {
    /// Server version.
    pub server_version: String,
    /// Snapshot at connect time.
    pub snapshot: RoundSnapshot,
    /// Crash history at connect time.
    pub history: Vec<f64>,
}

/// Error payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Message could not be parsed.
    InvalidInput,
    /// Server-side failure.
    InternalError,
}

// =============================================================================
// SERIALIZATION
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Build an error message.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ServerError {
            code,
            message: message.into(),
        })
    }
}
