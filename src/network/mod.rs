//! Network Layer
//!
//! Timers, the session task that owns the engine, and the read-only
//! WebSocket feed. Nothing here decides round outcomes; that all happens
//! in `game/`.

pub mod protocol;
pub mod session;
pub mod server;

pub use protocol::{ClientMessage, ServerMessage, WelcomeInfo, ErrorCode};
pub use session::{RoundHandle, RoundReader, RoundSession};
pub use server::{FeedServer, FeedServerError};
