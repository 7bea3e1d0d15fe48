//! Crash Round Server
//!
//! Runs the round session on real timers and serves the live feed.
//! `crash-engine-server simulate <rounds>` runs rounds headlessly instead.

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crash_engine::{
    EngineConfig, ServerConfig, FRAME_RATE, VERSION,
    core::rng::random_server_seed,
    game::{
        events::RoundEventData,
        growth::format_multiplier,
        payout::{settle_crash, Bet},
        state::RoundStatus,
        tick::RoundEngine,
    },
    network::{FeedServer, RoundSession},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Crash Round Server v{}", VERSION);

    let engine_config = EngineConfig::from_env().context("loading engine config")?;
    let server_config = ServerConfig::from_env().context("loading server config")?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("simulate") => {
            let rounds = match args.get(1) {
                Some(n) => n.parse().with_context(|| format!("invalid round count {:?}", n))?,
                None => 10,
            };
            simulate(&engine_config, rounds)
        }
        Some(other) => bail!("unknown command {:?}", other),
        None => serve(engine_config, server_config).await,
    }
}

/// Run the live session and feed until ctrl-c.
async fn serve(engine_config: EngineConfig, server_config: ServerConfig) -> Result<()> {
    info!(
        "Countdown: {}s, post-crash delay: {:?}, frame rate: {} Hz",
        engine_config.countdown_seconds, engine_config.post_crash_delay, engine_config.frame_rate
    );

    let session = RoundSession::spawn(engine_config);
    let server = FeedServer::new(server_config, session.reader());

    tokio::select! {
        result = server.run() => {
            result.context("feed server failed")?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("waiting for ctrl-c")?;
            info!("Ctrl-C received, shutting down");
            server.shutdown();
        }
    }

    session.shutdown();
    Ok(())
}

/// Run rounds headlessly at the default frame rate with one demo bet per round.
fn simulate(config: &EngineConfig, rounds: u32) -> Result<()> {
    info!("=== Simulating {} rounds ===", rounds);

    let seed = config.seed.unwrap_or_else(random_server_seed);
    info!("Server seed: {}", hex::encode(seed.to_be_bytes()));

    let mut engine = RoundEngine::new(config, seed);
    let dt = 1.0 / FRAME_RATE as f64;
    let target = 2.0;
    let mut wins = 0u32;
    let mut net = 0.0;

    engine.start();
    for _ in 0..rounds {
        while engine.status() == RoundStatus::Countdown {
            engine.countdown_tick();
        }

        let round_number = engine.rounds_started();
        let mut bets = vec![Bet::new(round_number, 1.0, Some(target))?];

        while engine.status() == RoundStatus::Running {
            let snapshot = engine.snapshot();
            for bet in bets.iter_mut() {
                if let Some(payout) = bet.check_auto_cashout(&snapshot) {
                    wins += 1;
                    net += payout.user_gain - bet.stake;
                }
            }

            let result = engine.frame(dt);
            for event in &result.events {
                if let RoundEventData::RoundCrashed { crash_point, multiplier, frames, .. } = event.data {
                    info!(
                        "Round {} crashed at {} (drawn {:.2}, {} frames)",
                        event.round_number,
                        format_multiplier(multiplier),
                        crash_point,
                        frames
                    );
                }
            }
        }

        net -= settle_crash(&mut bets) as f64;
        engine.finish_cooldown();
    }

    info!("=== Results ===");
    let history = engine.history().formatted();
    info!("History (latest first): {}", history.join(" "));
    info!("Demo bet at {}: {}/{} won, net {:+.2}", format_multiplier(target), wins, rounds, net);

    Ok(())
}
