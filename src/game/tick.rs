//! Round Engine
//!
//! The round lifecycle state machine:
//!
//! ```text
//! Idle -> Countdown -> Running -> Crashed -> Countdown -> ...
//! ```
//!
//! The engine is synchronous and headless. It never reads a clock to decide
//! transitions; the caller feeds it one-second countdown ticks, frame ticks
//! carrying the elapsed `dt`, and the end of the post-crash delay. The async
//! session in `network::session` does that on real timers, tests do it with
//! synthetic values.

use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::core::rng::DeterministicRng;
use crate::game::crash_point::CrashPointGenerator;
use crate::game::events::{RoundEvent, RoundEventData};
use crate::game::growth::{step, START_MULTIPLIER};
use crate::game::state::{HistoryLog, Round, RoundSnapshot, RoundStatus};

/// Result of feeding one input to the engine.
#[derive(Debug, Default)]
pub struct TickResult {
    /// Events generated, in transition order.
    pub events: Vec<RoundEvent>,
    /// Whether the round crashed on this input.
    pub crashed: bool,
}

/// Owns all round state. Only the holder of `&mut RoundEngine` can change it.
#[derive(Debug)]
pub struct RoundEngine {
    status: RoundStatus,
    multiplier: f64,
    countdown_seconds: u32,
    countdown_remaining: u32,
    round: Option<Round>,
    rounds_started: u64,
    history: HistoryLog,
    generator: CrashPointGenerator,
    server_seed: u64,
}

impl RoundEngine {
    /// Create an idle engine.
    pub fn new(config: &EngineConfig, server_seed: u64) -> Self {
        Self {
            status: RoundStatus::Idle,
            multiplier: START_MULTIPLIER,
            countdown_seconds: config.countdown_seconds,
            countdown_remaining: 0,
            round: None,
            rounds_started: 0,
            history: HistoryLog::with_capacity(config.history_capacity),
            generator: CrashPointGenerator::new(config.distribution.clone()),
            server_seed,
        }
    }

    // -------------------------------------------------------------------------
    // Inputs
    // -------------------------------------------------------------------------

    /// Leave Idle and begin the first countdown. No-op in any other status.
    pub fn start(&mut self) -> TickResult {
        let mut result = TickResult::default();
        if self.status != RoundStatus::Idle {
            return result;
        }

        self.enter_countdown();
        result.events.push(RoundEvent::new(
            self.rounds_started + 1,
            RoundEventData::CountdownStarted { seconds: self.countdown_seconds },
        ));
        self.launch_if_countdown_done(&mut result);
        result
    }

    /// One second of countdown elapsed. Launches the round when the count
    /// reaches zero. Ignored outside Countdown.
    pub fn countdown_tick(&mut self) -> TickResult {
        let mut result = TickResult::default();
        if self.status != RoundStatus::Countdown {
            return result;
        }

        self.countdown_remaining = self.countdown_remaining.saturating_sub(1);
        debug!(remaining = self.countdown_remaining, "countdown");
        result.events.push(RoundEvent::new(
            self.rounds_started + 1,
            RoundEventData::CountdownTick { remaining: self.countdown_remaining },
        ));

        self.launch_if_countdown_done(&mut result);
        result
    }

    /// Apply one frame of `dt` seconds of growth. Ignored outside Running.
    ///
    /// The crash check runs against the value this frame produced, so the
    /// frozen multiplier is the first value at or past the crash point.
    pub fn frame(&mut self, dt: f64) -> TickResult {
        let mut result = TickResult::default();
        if self.status != RoundStatus::Running {
            return result;
        }
        let Some(round) = self.round.as_mut() else {
            return result;
        };

        let next = step(self.multiplier, dt);
        round.frames += 1;
        if dt.is_finite() && dt > 0.0 {
            round.elapsed += dt;
        }
        self.multiplier = next;

        #[cfg(feature = "debug-tracing")]
        tracing::trace!(round = round.number, frame = round.frames, multiplier = next, "frame");

        if next >= round.crash_point {
            self.status = RoundStatus::Crashed;
            self.history.record(next);
            result.crashed = true;

            info!(
                round = round.number,
                crash_point = round.crash_point,
                recorded = next,
                frames = round.frames,
                elapsed = round.elapsed,
                "round crashed"
            );

            result.events.push(RoundEvent::round_crashed(
                round.number,
                round.id,
                round.crash_point,
                next,
                round.frames,
            ));
        }

        result
    }

    /// Post-crash delay elapsed: start the next countdown. Ignored outside
    /// Crashed.
    pub fn finish_cooldown(&mut self) -> TickResult {
        let mut result = TickResult::default();
        if self.status != RoundStatus::Crashed {
            return result;
        }

        self.enter_countdown();
        result.events.push(RoundEvent::new(
            self.rounds_started + 1,
            RoundEventData::CountdownResumed { seconds: self.countdown_seconds },
        ));
        self.launch_if_countdown_done(&mut result);
        result
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Current status.
    pub fn status(&self) -> RoundStatus {
        self.status
    }

    /// Live multiplier: 1.00 in Idle/Countdown, frozen while Crashed.
    pub fn current_multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Seconds left in the countdown, 0 outside Countdown.
    pub fn countdown_remaining(&self) -> u32 {
        if self.status == RoundStatus::Countdown {
            self.countdown_remaining
        } else {
            0
        }
    }

    /// Past crash values, most recent first.
    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    /// The current (or last) round.
    pub fn round(&self) -> Option<&Round> {
        self.round.as_ref()
    }

    /// Number of rounds launched so far.
    pub fn rounds_started(&self) -> u64 {
        self.rounds_started
    }

    /// Copy of everything a reader may see.
    pub fn snapshot(&self) -> RoundSnapshot {
        RoundSnapshot {
            status: self.status,
            multiplier: self.multiplier,
            countdown_remaining: self.countdown_remaining(),
            round_number: self.round.as_ref().map(|r| r.number).unwrap_or(0),
            round_id: self.round.as_ref().map(|r| r.id),
            started_at: self.round.as_ref().map(|r| r.started_at),
        }
    }

    // -------------------------------------------------------------------------
    // Transitions
    // -------------------------------------------------------------------------

    fn enter_countdown(&mut self) {
        self.status = RoundStatus::Countdown;
        self.countdown_remaining = self.countdown_seconds;
        self.multiplier = START_MULTIPLIER;
    }

    fn launch_if_countdown_done(&mut self, result: &mut TickResult) {
        if self.countdown_remaining > 0 {
            return;
        }

        let number = self.rounds_started + 1;
        let mut rng = DeterministicRng::for_round(self.server_seed, number);
        let crash_point = self.generator.generate(&mut rng);
        result.events.push(self.begin_round(crash_point));
    }

    /// Countdown -> Running with a given crash point.
    pub(crate) fn begin_round(&mut self, crash_point: f64) -> RoundEvent {
        self.rounds_started += 1;
        let round = Round::new(self.rounds_started, crash_point);

        self.status = RoundStatus::Running;
        self.countdown_remaining = 0;
        self.multiplier = START_MULTIPLIER;

        info!(round = round.number, id = %round.id, "round started");
        let event = RoundEvent::round_started(round.number, round.id, round.started_at);
        self.round = Some(round);
        event
    }
}

/// Drive an engine through one full cycle with a fixed frame `dt`:
/// countdown expiry, run until crash, post-crash delay expiry.
///
/// Starts the engine if it is still Idle. Gives up after `max_frames`
/// frames of growth. Returns every event generated.
pub fn run_cycle(engine: &mut RoundEngine, dt: f64, max_frames: u32) -> Vec<RoundEvent> {
    let mut events = Vec::new();

    if engine.status() == RoundStatus::Idle {
        events.extend(engine.start().events);
    }

    while engine.status() == RoundStatus::Countdown {
        events.extend(engine.countdown_tick().events);
    }

    let mut frames = 0;
    while engine.status() == RoundStatus::Running && frames < max_frames {
        events.extend(engine.frame(dt).events);
        frames += 1;
    }

    if engine.status() == RoundStatus::Crashed {
        events.extend(engine.finish_cooldown().events);
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::growth::overshoot_bound;

    const DT: f64 = 1.0 / 60.0;

    fn engine() -> RoundEngine {
        RoundEngine::new(&EngineConfig::default(), 12345)
    }

    fn running_engine(crash_point: f64) -> RoundEngine {
        let mut engine = engine();
        engine.start();
        engine.begin_round(crash_point);
        engine
    }

    #[test]
    fn test_idle_accessors() {
        let engine = engine();
        assert_eq!(engine.status(), RoundStatus::Idle);
        assert_eq!(engine.current_multiplier(), 1.0);
        assert_eq!(engine.countdown_remaining(), 0);
        assert!(engine.history().is_empty());
    }

    #[test]
    fn test_countdown_sequence() {
        let mut engine = engine();
        let result = engine.start();
        assert_eq!(engine.status(), RoundStatus::Countdown);
        assert_eq!(engine.countdown_remaining(), 5);
        assert!(matches!(
            result.events[0].data,
            RoundEventData::CountdownStarted { seconds: 5 }
        ));

        for expected in (1..5).rev() {
            engine.countdown_tick();
            assert_eq!(engine.status(), RoundStatus::Countdown);
            assert_eq!(engine.countdown_remaining(), expected);
            assert_eq!(engine.current_multiplier(), 1.0);
        }

        let result = engine.countdown_tick();
        assert_eq!(engine.status(), RoundStatus::Running);
        assert_eq!(engine.countdown_remaining(), 0);
        assert_eq!(engine.rounds_started(), 1);
        assert_eq!(result.events.last().and_then(|e| e.cue()), Some(crate::game::events::Cue::Start));
    }

    #[test]
    fn test_start_is_one_shot() {
        let mut engine = engine();
        engine.start();
        engine.countdown_tick();
        let result = engine.start();
        assert!(result.events.is_empty());
        assert_eq!(engine.countdown_remaining(), 4);
    }

    #[test]
    fn test_inputs_ignored_in_wrong_status() {
        let mut engine = engine();
        assert!(engine.countdown_tick().events.is_empty());
        assert!(engine.frame(DT).events.is_empty());
        assert!(engine.finish_cooldown().events.is_empty());
        assert_eq!(engine.status(), RoundStatus::Idle);

        engine.start();
        assert!(engine.frame(DT).events.is_empty());
        assert_eq!(engine.current_multiplier(), 1.0);
    }

    #[test]
    fn test_crash_at_one_fifty() {
        let mut engine = running_engine(1.50);
        let mut frames = 0;

        while engine.status() == RoundStatus::Running {
            engine.frame(DT);
            frames += 1;
            assert!(frames <= 1000, "round never crashed");
        }

        // (1 + 0.06 / 60)^n >= 1.5  =>  n = ceil(ln 1.5 / ln 1.001) = 406
        assert_eq!(frames, 406);
        assert_eq!(engine.status(), RoundStatus::Crashed);
        let round = engine.round().unwrap();
        assert_eq!(round.frames, 406);
        assert!((round.elapsed - 406.0 * DT).abs() < 1e-9);

        let recorded = engine.history().latest().unwrap();
        assert!(recorded > 1.50, "recorded {} should overshoot", recorded);
        assert!(recorded - 1.50 <= overshoot_bound(1.50, DT));
        assert_eq!(recorded, engine.current_multiplier());
    }

    #[test]
    fn test_multiplier_monotonic_while_running() {
        let mut engine = running_engine(25.0);
        let mut last = engine.current_multiplier();

        while engine.status() == RoundStatus::Running {
            engine.frame(DT);
            let now = engine.current_multiplier();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn test_frozen_after_crash() {
        let mut engine = running_engine(1.10);
        while engine.status() == RoundStatus::Running {
            engine.frame(DT);
        }

        let frozen = engine.current_multiplier();
        for _ in 0..100 {
            let result = engine.frame(1.0);
            assert!(result.events.is_empty());
            assert_eq!(engine.current_multiplier(), frozen);
        }
        assert_eq!(engine.history().len(), 1);
    }

    #[test]
    fn test_minimum_crash_point_crashes_on_first_frame() {
        let mut engine = running_engine(1.00);
        let result = engine.frame(DT);
        assert!(result.crashed);
        assert!(engine.current_multiplier() >= 1.00);
    }

    #[test]
    fn test_full_cycle_returns_to_countdown() {
        let mut engine = engine();
        let events = run_cycle(&mut engine, DT, 1_000_000);

        assert_eq!(engine.status(), RoundStatus::Countdown);
        assert_eq!(engine.history().len(), 1);
        assert_eq!(engine.current_multiplier(), 1.0);
        assert_eq!(engine.countdown_remaining(), 5);

        let crashes = events
            .iter()
            .filter(|e| matches!(e.data, RoundEventData::RoundCrashed { .. }))
            .count();
        assert_eq!(crashes, 1);
        assert!(matches!(
            events.last().map(|e| &e.data),
            Some(RoundEventData::CountdownResumed { seconds: 5 })
        ));
    }

    #[test]
    fn test_history_grows_one_per_cycle() {
        let mut engine = engine();
        for expected in 1..=5 {
            run_cycle(&mut engine, DT, 1_000_000);
            assert_eq!(engine.history().len(), expected);
        }
    }

    #[test]
    fn test_recorded_value_at_or_above_crash_point() {
        let mut engine = engine();
        for _ in 0..20 {
            let events = run_cycle(&mut engine, DT, 1_000_000);
            let crash = events.iter().find_map(|e| match e.data {
                RoundEventData::RoundCrashed { crash_point, multiplier, .. } => {
                    Some((crash_point, multiplier))
                }
                _ => None,
            });
            let (crash_point, multiplier) = crash.unwrap();
            assert!(multiplier >= crash_point);
            assert!(multiplier - crash_point <= overshoot_bound(crash_point, DT));
        }
    }

    #[test]
    fn test_same_seed_same_rounds() {
        let mut a = engine();
        let mut b = engine();
        for _ in 0..10 {
            run_cycle(&mut a, DT, 1_000_000);
            run_cycle(&mut b, DT, 1_000_000);
        }
        assert_eq!(a.history().to_vec(), b.history().to_vec());
    }

    #[test]
    fn test_zero_countdown_launches_immediately() {
        let config = EngineConfig {
            countdown_seconds: 0,
            ..Default::default()
        };
        let mut engine = RoundEngine::new(&config, 1);
        engine.start();
        assert_eq!(engine.status(), RoundStatus::Running);
    }

    #[test]
    fn test_snapshot_tracks_round() {
        let mut engine = running_engine(3.0);
        engine.frame(DT);
        let snapshot = engine.snapshot();

        assert_eq!(snapshot.status, RoundStatus::Running);
        assert_eq!(snapshot.round_number, 1);
        assert_eq!(snapshot.round_id, engine.round().map(|r| r.id));
        assert!(snapshot.multiplier > 1.0);
    }

    #[test]
    fn test_jittered_frames_bounded_overshoot() {
        use rand::{Rng, SeedableRng};
        let mut jitter = rand::rngs::StdRng::seed_from_u64(99);

        for crash_point in [1.01, 1.50, 4.20, 13.37, 60.0] {
            let mut engine = running_engine(crash_point);
            let mut max_dt: f64 = 0.0;
            let mut last = engine.current_multiplier();

            while engine.status() == RoundStatus::Running {
                let dt = jitter.gen_range(0.005..0.05);
                max_dt = max_dt.max(dt);
                engine.frame(dt);
                assert!(engine.current_multiplier() >= last);
                last = engine.current_multiplier();
            }

            let recorded = engine.current_multiplier();
            assert!(recorded >= crash_point);
            assert!(recorded - crash_point <= overshoot_bound(crash_point, max_dt));
        }
    }
}
