//! Round Events
//!
//! Emitted on every state transition, in transition order.

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use uuid::Uuid;

/// Audible/visual cue a notification layer may play.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cue {
    /// Round took off.
    Start,
    /// Round crashed.
    Crash,
}

/// Round event data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoundEventData {
    /// First countdown after startup (Idle -> Countdown).
    CountdownStarted {
        /// Countdown length.
        seconds: u32,
    },

    /// Countdown resumed after a crash (Crashed -> Countdown).
    CountdownResumed {
        /// Countdown length.
        seconds: u32,
    },

    /// One second of countdown elapsed.
    CountdownTick {
        /// Seconds left after this tick.
        remaining: u32,
    },

    /// Countdown reached zero and the multiplier started climbing.
    RoundStarted {
        /// Round identifier.
        round_id: Uuid,
        /// Wall-clock launch time.
        started_at: DateTime<Utc>,
    },

    /// Multiplier reached the crash point.
    RoundCrashed {
        /// Round identifier.
        round_id: Uuid,
        /// The sampled crash point.
        crash_point: f64,
        /// The frozen multiplier actually recorded (may overshoot).
        multiplier: f64,
        /// Frames the round ran for.
        frames: u32,
    },
}

/// A round event tagged with its round number.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundEvent {
    /// Round the event belongs to. Countdown events carry the number of the
    /// round they are counting down to.
    pub round_number: u64,

    /// Event data
    pub data: RoundEventData,
}

impl RoundEvent {
    /// Create a new event.
    pub fn new(round_number: u64, data: RoundEventData) -> Self {
        Self { round_number, data }
    }

    /// Cue associated with this event, if any.
    pub fn cue(&self) -> Option<Cue> {
        match self.data {
            RoundEventData::RoundStarted { .. } => Some(Cue::Start),
            RoundEventData::RoundCrashed { .. } => Some(Cue::Crash),
            _ => None,
        }
    }

    /// Create round started event.
    pub fn round_started(round_number: u64, round_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self::new(round_number, RoundEventData::RoundStarted { round_id, started_at })
    }

    /// Create round crashed event.
    pub fn round_crashed(
        round_number: u64,
        round_id: Uuid,
        crash_point: f64,
        multiplier: f64,
        frames: u32,
    ) -> Self {
        Self::new(
            round_number,
            RoundEventData::RoundCrashed {
                round_id,
                crash_point,
                multiplier,
                frames,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cues() {
        let id = Uuid::new_v4();
        assert_eq!(RoundEvent::round_started(1, id, Utc::now()).cue(), Some(Cue::Start));
        assert_eq!(RoundEvent::round_crashed(1, id, 1.5, 1.5005, 406).cue(), Some(Cue::Crash));
        assert_eq!(
            RoundEvent::new(2, RoundEventData::CountdownTick { remaining: 3 }).cue(),
            None
        );
    }

    #[test]
    fn test_event_json_tagging() {
        let event = RoundEvent::new(4, RoundEventData::CountdownStarted { seconds: 5 });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"countdown_started\""));

        let parsed: RoundEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }
}
