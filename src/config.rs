use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::engine::DEFAULT_DURATION_MS;
use crate::limits::MAX_APPOINTMENT_DURATION_MS;
use crate::model::{MINUTE, Ms};

pub const ENV_DATA_DIR: &str = "VETCAL_DATA_DIR";
pub const ENV_METRICS_PORT: &str = "VETCAL_METRICS_PORT";
pub const ENV_DEFAULT_DURATION_MIN: &str = "VETCAL_DEFAULT_DURATION_MIN";
pub const ENV_COMPACT_THRESHOLD: &str = "VETCAL_COMPACT_THRESHOLD";
pub const ENV_COMPACT_INTERVAL_SECS: &str = "VETCAL_COMPACT_INTERVAL_SECS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    /// Calendar footprint of an appointment booked without an end.
    pub default_duration_ms: Ms,
    /// WAL appends since the last compaction that trigger a new one.
    pub compact_threshold: u64,
    pub compact_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            default_duration_ms: DEFAULT_DURATION_MS,
            compact_threshold: 1000,
            compact_interval: Duration::from_secs(60),
        }
    }
}

fn parse<T: FromStr>(var: &'static str, value: Option<String>) -> Result<Option<T>, ConfigError> {
    match value {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let data_dir = lookup(ENV_DATA_DIR).map_or(defaults.data_dir, PathBuf::from);
        let metrics_port = parse::<u16>(ENV_METRICS_PORT, lookup(ENV_METRICS_PORT))?;

        let default_duration_ms = match parse::<u32>(ENV_DEFAULT_DURATION_MIN, lookup(ENV_DEFAULT_DURATION_MIN))? {
            None => defaults.default_duration_ms,
            Some(min) => {
                let ms = min as Ms * MINUTE;
                if ms == 0 || ms > MAX_APPOINTMENT_DURATION_MS {
                    return Err(ConfigError::Invalid {
                        var: ENV_DEFAULT_DURATION_MIN,
                        value: min.to_string(),
                    });
                }
                ms
            }
        };

        let compact_threshold = parse(ENV_COMPACT_THRESHOLD, lookup(ENV_COMPACT_THRESHOLD))?
            .unwrap_or(defaults.compact_threshold);
        let compact_interval = parse(ENV_COMPACT_INTERVAL_SECS, lookup(ENV_COMPACT_INTERVAL_SECS))?
            .map_or(defaults.compact_interval, Duration::from_secs);

        Ok(Self {
            data_dir,
            metrics_port,
            default_duration_ms,
            compact_threshold,
            compact_interval,
        })
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("appointments.wal")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Invalid { var: &'static str, value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid { var, value } => write!(f, "invalid value for {var}: {value:?}"),
        }
    }
}

impl std::error::Error for ConfigError {}
