//! # Crash Round Engine
//!
//! Authoritative round engine for a crash-style multiplier game.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    CRASH ROUND ENGINE                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/            - Deterministic primitives                 │
//! │  └── rng.rs       - Seeded Xorshift128+ and round seeds      │
//! │                                                              │
//! │  game/            - Round logic (synchronous, headless)      │
//! │  ├── crash_point.rs - Crash multiplier distributions         │
//! │  ├── growth.rs    - Tier speeds and growth step              │
//! │  ├── state.rs     - Status, snapshot, history                │
//! │  ├── tick.rs      - Round lifecycle state machine            │
//! │  ├── events.rs    - Transition events and cues               │
//! │  └── payout.rs    - Payout math and bet settlement           │
//! │                                                              │
//! │  network/         - Timers and I/O                           │
//! │  ├── session.rs   - Single-writer round task                 │
//! │  ├── server.rs    - WebSocket feed                           │
//! │  └── protocol.rs  - Feed message types                       │
//! │                                                              │
//! │  config.rs        - Environment configuration                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Round Lifecycle
//!
//! `Idle -> Countdown -> Running -> Crashed -> Countdown -> ...`
//!
//! The crash point is drawn when a round launches and never leaves the
//! engine until the round crashes. The multiplier only grows while
//! Running and is frozen from the crash until the next countdown.
//!
//! Given the same server seed, every round draws the same crash point on
//! any platform.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use config::{ConfigError, EngineConfig, ServerConfig};
pub use core::rng::DeterministicRng;
pub use game::crash_point::{CrashDistribution, CrashPointGenerator};
pub use game::state::{HistoryLog, RoundSnapshot, RoundStatus};
pub use game::tick::RoundEngine;
pub use game::payout::{calculate_payout, Payout};
pub use network::session::{RoundHandle, RoundReader, RoundSession};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default growth frame rate (Hz)
pub const FRAME_RATE: u32 = 60;
