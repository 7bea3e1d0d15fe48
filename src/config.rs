//! Configuration
//!
//! Defaults match the live game; every field can be overridden from the
//! environment.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::game::crash_point::{CrashDistribution, WeightedTable};
use crate::game::state::DEFAULT_HISTORY_CAPACITY;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable was set but could not be parsed.
    #[error("invalid value for {var}: {value:?}")]
    Invalid {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
    },

    /// A variable parsed but is out of range.
    #[error("{var} must be {requirement}")]
    OutOfRange {
        /// Variable name.
        var: &'static str,
        /// What the value must satisfy.
        requirement: &'static str,
    },
}

/// Round engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Countdown length in whole seconds.
    pub countdown_seconds: u32,
    /// Pause between a crash and the next countdown.
    pub post_crash_delay: Duration,
    /// Growth frames per second while running.
    pub frame_rate: u32,
    /// Crash values kept in history.
    pub history_capacity: usize,
    /// Crash point distribution.
    pub distribution: CrashDistribution,
    /// Forward start/crash cues to listeners.
    pub sound_enabled: bool,
    /// Server seed. Random when unset.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            countdown_seconds: 5,
            post_crash_delay: Duration::from_secs(3),
            frame_rate: 60,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            distribution: CrashDistribution::Tiered,
            sound_enabled: true,
            seed: None,
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let frame_rate = env_parse("CRASH_FRAME_RATE")?.unwrap_or(defaults.frame_rate);
        if frame_rate == 0 {
            return Err(ConfigError::OutOfRange {
                var: "CRASH_FRAME_RATE",
                requirement: "at least 1",
            });
        }

        let history_capacity =
            env_parse("CRASH_HISTORY_CAPACITY")?.unwrap_or(defaults.history_capacity);
        if history_capacity == 0 {
            return Err(ConfigError::OutOfRange {
                var: "CRASH_HISTORY_CAPACITY",
                requirement: "at least 1",
            });
        }

        let distribution = match std::env::var("CRASH_DISTRIBUTION").ok() {
            None => defaults.distribution,
            Some(name) => parse_distribution(&name).ok_or(ConfigError::Invalid {
                var: "CRASH_DISTRIBUTION",
                value: name,
            })?,
        };

        Ok(Self {
            countdown_seconds: env_parse("CRASH_COUNTDOWN_SECS")?
                .unwrap_or(defaults.countdown_seconds),
            post_crash_delay: env_parse("CRASH_POST_CRASH_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.post_crash_delay),
            frame_rate,
            history_capacity,
            distribution,
            sound_enabled: env_bool("CRASH_SOUND_ENABLED")?.unwrap_or(defaults.sound_enabled),
            seed: env_parse("CRASH_SEED")?,
        })
    }

    /// Duration of one growth frame.
    pub fn frame_period(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.frame_rate.max(1) as u64)
    }
}

/// Feed server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Snapshot pushes per second to each client.
    pub snapshot_rate: u32,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            snapshot_rate: 20,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let snapshot_rate = env_parse("CRASH_SNAPSHOT_RATE")?.unwrap_or(defaults.snapshot_rate);
        if snapshot_rate == 0 {
            return Err(ConfigError::OutOfRange {
                var: "CRASH_SNAPSHOT_RATE",
                requirement: "at least 1",
            });
        }

        Ok(Self {
            bind_addr: env_parse("CRASH_BIND_ADDR")?.unwrap_or(defaults.bind_addr),
            max_connections: env_parse("CRASH_MAX_CONNECTIONS")?
                .unwrap_or(defaults.max_connections),
            snapshot_rate,
            version: defaults.version,
        })
    }

    /// Interval between snapshot pushes.
    pub fn snapshot_period(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.snapshot_rate.max(1) as u64)
    }
}

/// Map a distribution name to its default configuration.
pub fn parse_distribution(name: &str) -> Option<CrashDistribution> {
    match name.trim().to_ascii_lowercase().as_str() {
        "tiered" => Some(CrashDistribution::Tiered),
        "weighted" => Some(CrashDistribution::Weighted(WeightedTable::default())),
        _ => None,
    }
}

fn env_parse<T: FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value }),
        Err(_) => Ok(None),
    }
}

fn env_bool(var: &'static str) -> Result<Option<bool>, ConfigError> {
    match std::env::var(var) {
        Ok(value) => match value.trim() {
            "true" | "1" => Ok(Some(true)),
            "false" | "0" => Ok(Some(false)),
            _ => Err(ConfigError::Invalid { var, value }),
        },
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // from_env reads the real CRASH_* variables; tests touching them take this lock
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Run `f` with `var` set, then clear it.
    fn with_var<T>(var: &str, value: &str, f: impl FnOnce() -> T) -> T {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        std::env::set_var(var, value);
        let result = f();
        std::env::remove_var(var);
        result
    }

    #[test]
    fn test_engine_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.countdown_seconds, 5);
        assert_eq!(config.post_crash_delay, Duration::from_secs(3));
        assert_eq!(config.frame_rate, 60);
        assert_eq!(config.history_capacity, 200);
        assert_eq!(config.distribution, CrashDistribution::Tiered);
        assert_eq!(config.frame_period(), Duration::from_micros(16_666));
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.snapshot_period(), Duration::from_millis(50));
    }

    #[test]
    fn test_parse_distribution() {
        assert_eq!(parse_distribution("tiered"), Some(CrashDistribution::Tiered));
        assert!(matches!(
            parse_distribution(" Weighted "),
            Some(CrashDistribution::Weighted(_))
        ));
        assert_eq!(parse_distribution("fair"), None);
    }

    #[test]
    fn test_env_overrides() {
        // Variable names unique to this test so parallel tests don't race
        std::env::set_var("CRASH_TEST_ONLY_U32", "42");
        std::env::set_var("CRASH_TEST_ONLY_BAD", "forty");
        std::env::set_var("CRASH_TEST_ONLY_BOOL", "0");

        assert_eq!(env_parse::<u32>("CRASH_TEST_ONLY_U32").unwrap(), Some(42));
        assert!(matches!(
            env_parse::<u32>("CRASH_TEST_ONLY_BAD"),
            Err(ConfigError::Invalid { var: "CRASH_TEST_ONLY_BAD", .. })
        ));
        assert_eq!(env_bool("CRASH_TEST_ONLY_BOOL").unwrap(), Some(false));
        assert_eq!(env_parse::<u32>("CRASH_TEST_ONLY_UNSET").unwrap(), None);
    }

    #[test]
    fn test_zero_frame_rate_rejected() {
        let result = with_var("CRASH_FRAME_RATE", "0", EngineConfig::from_env);
        assert!(matches!(
            result,
            Err(ConfigError::OutOfRange { var: "CRASH_FRAME_RATE", .. })
        ));
    }

    #[test]
    fn test_zero_history_capacity_rejected() {
        let result = with_var("CRASH_HISTORY_CAPACITY", "0", EngineConfig::from_env);
        assert!(matches!(
            result,
            Err(ConfigError::OutOfRange { var: "CRASH_HISTORY_CAPACITY", .. })
        ));
    }

    #[test]
    fn test_unknown_distribution_rejected() {
        let result = with_var("CRASH_DISTRIBUTION", "fair", EngineConfig::from_env);
        match result {
            Err(ConfigError::Invalid { var, value }) => {
                assert_eq!(var, "CRASH_DISTRIBUTION");
                assert_eq!(value, "fair");
            }
            other => panic!("expected invalid distribution, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_snapshot_rate_rejected() {
        let result = with_var("CRASH_SNAPSHOT_RATE", "0", ServerConfig::from_env);
        assert!(matches!(
            result,
            Err(ConfigError::OutOfRange { var: "CRASH_SNAPSHOT_RATE", .. })
        ));
    }

    #[test]
    fn test_from_env_applies_overrides() {
        let config = with_var("CRASH_COUNTDOWN_SECS", "2", EngineConfig::from_env).unwrap();
        assert_eq!(config.countdown_seconds, 2);
        assert_eq!(config.frame_rate, 60);

        let config = with_var("CRASH_BIND_ADDR", "127.0.0.1:9000", ServerConfig::from_env).unwrap();
        assert_eq!(config.bind_addr, SocketAddr::from(([127, 0, 0, 1], 9000)));
    }
}
