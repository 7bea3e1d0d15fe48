//! Round Session
//!
//! Runs the round engine on real timers inside a single tokio task.
//! That task is the only writer; everyone else reads snapshots through
//! [`RoundReader`], which can never reach the engine itself.
//!
//! Timers: a one-second sleep per countdown step, a frame interval while
//! running, and the post-crash delay. All of them sit in a `select!` against
//! the shutdown signal, and the frame interval is dropped the moment the
//! round crashes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument};

use crate::config::EngineConfig;
use crate::core::rng::random_server_seed;
use crate::game::events::{Cue, RoundEvent};
use crate::game::state::{RoundSnapshot, RoundStatus};
use crate::game::tick::{RoundEngine, TickResult};

/// Capacity of the event and cue broadcast channels.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Read side of a running session. Cheap to clone.
#[derive(Clone)]
pub struct RoundReader {
    snapshot_rx: watch::Receiver<RoundSnapshot>,
    history_rx: watch::Receiver<Vec<f64>>,
    event_tx: broadcast::Sender<RoundEvent>,
    cue_tx: broadcast::Sender<Cue>,
    sound_enabled: Arc<AtomicBool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl RoundReader {
    /// Current status.
    pub fn status(&self) -> RoundStatus {
        self.snapshot_rx.borrow().status
    }

    /// Live multiplier (frozen while Crashed, 1.00 in Idle/Countdown).
    pub fn current_multiplier(&self) -> f64 {
        self.snapshot_rx.borrow().multiplier
    }

    /// Seconds left in the countdown, 0 outside Countdown.
    pub fn countdown_remaining(&self) -> u32 {
        self.snapshot_rx.borrow().countdown_remaining
    }

    /// Past crash values, most recent first.
    pub fn history(&self) -> Vec<f64> {
        self.history_rx.borrow().clone()
    }

    /// Full snapshot.
    pub fn snapshot(&self) -> RoundSnapshot {
        *self.snapshot_rx.borrow()
    }

    /// Receiver that wakes on every snapshot change.
    pub fn watch_snapshots(&self) -> watch::Receiver<RoundSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Subscribe to transition events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<RoundEvent> {
        self.event_tx.subscribe()
    }

    /// Subscribe to start/crash cues. Only delivered while sound is enabled.
    pub fn subscribe_cues(&self) -> broadcast::Receiver<Cue> {
        self.cue_tx.subscribe()
    }

    /// Receiver that wakes once the session is shut down or its handle dropped.
    ///
    /// The event channel stays open while any reader exists, so this is the
    /// signal to watch for the end of a session.
    pub fn watch_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// True once the session has been shut down.
    pub fn is_shut_down(&self) -> bool {
        *self.shutdown_rx.borrow() || self.shutdown_rx.has_changed().is_err()
    }

    /// Toggle cue delivery.
    pub fn set_sound_enabled(&self, enabled: bool) {
        self.sound_enabled.store(enabled, Ordering::Relaxed);
    }

    /// Whether cues are being delivered.
    pub fn sound_enabled(&self) -> bool {
        self.sound_enabled.load(Ordering::Relaxed)
    }
}

/// Owner of a running session. Dropping it shuts the session down.
pub struct RoundHandle {
    reader: RoundReader,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
    server_seed: u64,
}

impl RoundHandle {
    /// Reader for collaborators.
    pub fn reader(&self) -> RoundReader {
        self.reader.clone()
    }

    /// Seed the session draws crash points from.
    pub fn server_seed(&self) -> u64 {
        self.server_seed
    }

    /// Cancel every pending timer and stop the session.
    ///
    /// Safe to call any number of times.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        let task = match self.task.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(task) = task {
            task.abort();
            info!("round session shut down");
        }
    }

    /// True once the session task has exited or been cancelled.
    pub fn is_stopped(&self) -> bool {
        match self.task.lock() {
            Ok(guard) => guard.as_ref().map_or(true, |t| t.is_finished()),
            Err(_) => true,
        }
    }
}

impl std::ops::Deref for RoundHandle {
    type Target = RoundReader;

    fn deref(&self) -> &RoundReader {
        &self.reader
    }
}

impl Drop for RoundHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The single writer. Lives inside the session task.
pub struct RoundSession {
    engine: RoundEngine,
    config: EngineConfig,
    snapshot_tx: watch::Sender<RoundSnapshot>,
    history_tx: watch::Sender<Vec<f64>>,
    event_tx: broadcast::Sender<RoundEvent>,
    cue_tx: broadcast::Sender<Cue>,
    sound_enabled: Arc<AtomicBool>,
}

impl RoundSession {
    /// Start the round loop on the current tokio runtime.
    pub fn spawn(config: EngineConfig) -> RoundHandle {
        let server_seed = config.seed.unwrap_or_else(random_server_seed);
        let engine = RoundEngine::new(&config, server_seed);

        let (snapshot_tx, snapshot_rx) = watch::channel(engine.snapshot());
        let (history_tx, history_rx) = watch::channel(Vec::new());
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (cue_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sound_enabled = Arc::new(AtomicBool::new(config.sound_enabled));

        let reader = RoundReader {
            snapshot_rx,
            history_rx,
            event_tx: event_tx.clone(),
            cue_tx: cue_tx.clone(),
            sound_enabled: sound_enabled.clone(),
            shutdown_rx: shutdown_rx.clone(),
        };

        let session = RoundSession {
            engine,
            config,
            snapshot_tx,
            history_tx,
            event_tx,
            cue_tx,
            sound_enabled,
        };

        info!(seed = %hex::encode(server_seed.to_be_bytes()), "starting round session");
        let task = tokio::spawn(session.run(shutdown_rx));

        RoundHandle {
            reader,
            shutdown_tx,
            task: Mutex::new(Some(task)),
            server_seed,
        }
    }

    #[instrument(skip_all)]
    async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        let started = self.engine.start();
        self.publish(started);

        loop {
            let keep_going = match self.engine.status() {
                RoundStatus::Countdown => {
                    if wait(Duration::from_secs(1), &mut shutdown_rx).await {
                        let result = self.engine.countdown_tick();
                        self.publish(result);
                        true
                    } else {
                        false
                    }
                }
                RoundStatus::Running => self.run_frames(&mut shutdown_rx).await,
                RoundStatus::Crashed => {
                    if wait(self.config.post_crash_delay, &mut shutdown_rx).await {
                        let result = self.engine.finish_cooldown();
                        self.publish(result);
                        true
                    } else {
                        false
                    }
                }
                RoundStatus::Idle => false,
            };

            if !keep_going {
                break;
            }
        }

        debug!("round session loop exited");
    }

    /// Drive frames until the round crashes. Returns false on shutdown.
    async fn run_frames(&mut self, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
        let mut frames = interval(self.config.frame_period());
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // First tick completes immediately
        frames.tick().await;
        let mut last = Instant::now();

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => return false,
                _ = frames.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last).as_secs_f64();
                    last = now;

                    let result = self.engine.frame(dt);
                    let crashed = result.crashed;
                    self.publish(result);
                    if crashed {
                        // Engine is Crashed before publish; leaving drops `frames`
                        return true;
                    }
                }
            }
        }
    }

    fn publish(&self, result: TickResult) {
        if result.crashed {
            self.history_tx.send_replace(self.engine.history().to_vec());
        }
        self.snapshot_tx.send_replace(self.engine.snapshot());

        let sound = self.sound_enabled.load(Ordering::Relaxed);
        for event in result.events {
            if let Some(cue) = event.cue() {
                if sound {
                    let _ = self.cue_tx.send(cue);
                }
            }
            let _ = self.event_tx.send(event);
        }
    }
}

/// Sleep for `period` unless shutdown arrives first. Returns false on shutdown.
async fn wait(period: Duration, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    if *shutdown_rx.borrow() {
        return false;
    }
    tokio::select! {
        biased;
        _ = shutdown_rx.changed() => false,
        _ = sleep(period) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::events::RoundEventData;

    fn test_config() -> EngineConfig {
        EngineConfig {
            seed: Some(2024),
            ..Default::default()
        }
    }

    async fn next_crash(events: &mut broadcast::Receiver<RoundEvent>) -> (f64, f64) {
        loop {
            match events.recv().await {
                Ok(RoundEvent { data: RoundEventData::RoundCrashed { crash_point, multiplier, .. }, .. }) => {
                    return (crash_point, multiplier);
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("event channel closed: {}", e),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_then_running() {
        let handle = RoundSession::spawn(test_config());
        sleep(Duration::from_millis(100)).await;

        assert_eq!(handle.status(), RoundStatus::Countdown);
        assert_eq!(handle.countdown_remaining(), 5);
        assert_eq!(handle.current_multiplier(), 1.0);

        sleep(Duration::from_millis(2_400)).await;
        assert_eq!(handle.status(), RoundStatus::Countdown);
        assert_eq!(handle.countdown_remaining(), 3);

        sleep(Duration::from_millis(3_000)).await;
        assert_eq!(handle.status(), RoundStatus::Running);
        assert_eq!(handle.countdown_remaining(), 0);

        handle.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_crash_freezes_then_next_countdown() {
        let handle = RoundSession::spawn(test_config());
        let mut events = handle.subscribe_events();

        let (crash_point, recorded) = next_crash(&mut events).await;
        assert!(recorded >= crash_point);

        assert_eq!(handle.status(), RoundStatus::Crashed);
        assert_eq!(handle.current_multiplier(), recorded);
        assert_eq!(handle.history(), vec![recorded]);

        // Frozen for the whole post-crash delay
        sleep(Duration::from_millis(2_000)).await;
        assert_eq!(handle.status(), RoundStatus::Crashed);
        assert_eq!(handle.current_multiplier(), recorded);

        sleep(Duration::from_millis(1_500)).await;
        assert_eq!(handle.status(), RoundStatus::Countdown);
        assert_eq!(handle.current_multiplier(), 1.0);
        assert_eq!(handle.history().len(), 1);

        handle.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_multiplier_never_decreases_while_running() {
        let handle = RoundSession::spawn(test_config());
        let mut snapshots = handle.watch_snapshots();
        let mut last: Option<RoundSnapshot> = None;

        while snapshots.changed().await.is_ok() {
            let snapshot = *snapshots.borrow_and_update();
            if let Some(prev) = last {
                if prev.is_running() && snapshot.round_number == prev.round_number {
                    assert!(snapshot.multiplier >= prev.multiplier);
                }
            }
            if snapshot.status == RoundStatus::Crashed {
                break;
            }
            last = Some(snapshot);
        }

        handle.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_is_idempotent_and_stops_updates() {
        let handle = RoundSession::spawn(test_config());
        sleep(Duration::from_millis(5_500)).await;
        assert_ne!(handle.status(), RoundStatus::Idle);

        assert!(!handle.is_shut_down());
        handle.shutdown();
        handle.shutdown();
        tokio::task::yield_now().await;
        assert!(handle.is_stopped());
        assert!(handle.is_shut_down());

        let frozen = handle.snapshot();
        sleep(Duration::from_secs(30)).await;
        assert_eq!(handle.snapshot(), frozen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cues_follow_sound_flag() {
        let handle = RoundSession::spawn(test_config());
        let mut cues = handle.subscribe_cues();
        let mut events = handle.subscribe_events();

        next_crash(&mut events).await;
        assert_eq!(cues.try_recv().unwrap(), Cue::Start);
        assert_eq!(cues.try_recv().unwrap(), Cue::Crash);

        handle.set_sound_enabled(false);
        assert!(!handle.sound_enabled());
        next_crash(&mut events).await;
        assert!(cues.try_recv().is_err());

        handle.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_seed_same_history() {
        let a = RoundSession::spawn(test_config());
        let b = RoundSession::spawn(test_config());
        assert_eq!(a.server_seed(), b.server_seed());

        let mut events_a = a.subscribe_events();
        let mut events_b = b.subscribe_events();
        let (point_a, _) = next_crash(&mut events_a).await;
        let (point_b, _) = next_crash(&mut events_b).await;
        assert_eq!(point_a, point_b);

        a.shutdown();
        b.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_session() {
        let handle = RoundSession::spawn(test_config());
        let reader = handle.reader();
        drop(handle);

        tokio::task::yield_now().await;
        assert!(reader.is_shut_down());
        let frozen = reader.snapshot();
        sleep(Duration::from_secs(10)).await;
        assert_eq!(reader.snapshot(), frozen);
    }
}
