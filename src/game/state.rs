//! Round State Definitions
//!
//! Status, the live round, the read-only snapshot handed to collaborators,
//! and the bounded crash history.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use uuid::Uuid;

use crate::game::growth::{format_multiplier, START_MULTIPLIER};

// =============================================================================
// ROUND STATUS
// =============================================================================

/// Lifecycle status of the engine. Exactly one is active at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum RoundStatus {
    /// Before the first countdown. Never re-entered.
    #[default]
    Idle,
    /// Counting down to the next round.
    Countdown,
    /// Multiplier is climbing.
    Running,
    /// Round has crashed; multiplier is frozen.
    Crashed,
}

impl RoundStatus {
    /// Short lowercase name, used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            RoundStatus::Idle => "idle",
            RoundStatus::Countdown => "countdown",
            RoundStatus::Running => "running",
            RoundStatus::Crashed => "crashed",
        }
    }
}

// =============================================================================
// ROUND
// =============================================================================

/// One round, from the end of its countdown until the next round replaces it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Round {
    /// Sequential round number, starting at 1.
    pub number: u64,

    /// Unique round identifier.
    pub id: Uuid,

    /// Sampled crash multiplier. Never exposed before the crash.
    pub crash_point: f64,

    /// Wall-clock start time.
    pub started_at: DateTime<Utc>,

    /// Frames applied while running.
    pub frames: u32,

    /// Seconds of growth applied while running.
    pub elapsed: f64,
}

impl Round {
    /// Create a round that starts now.
    pub fn new(number: u64, crash_point: f64) -> Self {
        Self {
            number,
            id: Uuid::new_v4(),
            crash_point,
            started_at: Utc::now(),
            frames: 0,
            elapsed: 0.0,
        }
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// Read-only view of the engine, safe to hand to any reader.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundSnapshot {
    /// Current status.
    pub status: RoundStatus,
    /// Live multiplier; 1.00 in Idle/Countdown, frozen while Crashed.
    pub multiplier: f64,
    /// Whole seconds left in the countdown, 0 outside Countdown.
    pub countdown_remaining: u32,
    /// Number of the current (or last) round, 0 before the first.
    pub round_number: u64,
    /// Identifier of the current (or last) round.
    pub round_id: Option<Uuid>,
    /// When the current (or last) round started.
    pub started_at: Option<DateTime<Utc>>,
}

impl Default for RoundSnapshot {
    fn default() -> Self {
        Self {
            status: RoundStatus::Idle,
            multiplier: START_MULTIPLIER,
            countdown_remaining: 0,
            round_number: 0,
            round_id: None,
            started_at: None,
        }
    }
}

impl RoundSnapshot {
    /// Is a round currently climbing?
    pub fn is_running(&self) -> bool {
        self.status == RoundStatus::Running
    }

    /// Serialize to compact binary.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from compact binary.
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

// =============================================================================
// HISTORY
// =============================================================================

/// Default number of crash values kept.
pub const DEFAULT_HISTORY_CAPACITY: usize = 200;

/// Past crash values, most recent first, capped at a fixed capacity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryLog {
    entries: VecDeque<f64>,
    capacity: usize,
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl HistoryLog {
    /// Create an empty log holding at most `capacity` values (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a crash value at the front, evicting the oldest when full.
    pub fn record(&mut self, value: f64) {
        if self.entries.len() == self.capacity {
            self.entries.pop_back();
        }
        self.entries.push_front(value);
    }

    /// Most recent crash value.
    pub fn latest(&self) -> Option<f64> {
        self.entries.front().copied()
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing has crashed yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of stored values.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Values, most recent first.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().copied()
    }

    /// Copy out the values, most recent first.
    pub fn to_vec(&self) -> Vec<f64> {
        self.entries.iter().copied().collect()
    }

    /// Display strings (`"1.50x"`), most recent first.
    pub fn formatted(&self) -> Vec<String> {
        self.entries.iter().map(|v| format_multiplier(*v)).collect()
    }
}
