//! Round Logic Module
//!
//! Everything that decides what happens in a round. Synchronous and headless:
//! no clocks, no I/O, no tasks.
//!
//! ## Module Structure
//!
//! - `crash_point`: Crash multiplier distributions
//! - `growth`: Tier speeds and the per-frame growth step
//! - `state`: Round status, snapshot, history
//! - `tick`: The round lifecycle state machine
//! - `events`: Transition events and cues
//! - `payout`: Payout math and bet settlement

pub mod crash_point;
pub mod growth;
pub mod state;
pub mod tick;
pub mod events;
pub mod payout;

// Re-export key types
pub use crash_point::{CrashDistribution, CrashPointGenerator, WeightedTable};
pub use growth::{format_multiplier, tier_speed};
pub use state::{HistoryLog, Round, RoundSnapshot, RoundStatus};
pub use tick::{RoundEngine, TickResult};
pub use events::{Cue, RoundEvent, RoundEventData};
pub use payout::{calculate_payout, Bet, BetStatus, Payout, SettlementError};
