//! Tracking settings.
//!
//! # Responsibility
//! - Hold the user-tunable settings the core depends on.
//! - Load them from a JSON settings file.
//!
//! # Invariants
//! - `day_start_minutes` is always below 24 * 60 after loading.

use crate::model::hamster_day::DayBoundary;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

/// Default hamster day start: 05:30.
pub const DEFAULT_DAY_START_MINUTES: u32 = 5 * 60 + 30;
const MINUTES_PER_DAY: u32 = 24 * 60;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    InvalidDayStart(u32),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read settings: {err}"),
            Self::Parse(err) => write!(f, "invalid settings file: {err}"),
            Self::InvalidDayStart(minutes) => write!(
                f,
                "day_start_minutes must be below {MINUTES_PER_DAY}, got {minutes}"
            ),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Parse(err) => Some(err),
            Self::InvalidDayStart(_) => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Settings consumed by the parser and the fact store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingSettings {
    /// Minutes after midnight at which a hamster day begins.
    pub day_start_minutes: u32,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            day_start_minutes: DEFAULT_DAY_START_MINUTES,
        }
    }
}

impl TrackingSettings {
    /// Loads settings from a JSON file. Missing keys keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> ConfigResult<Self> {
        let settings: Self = serde_json::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.day_start_minutes >= MINUTES_PER_DAY {
            return Err(ConfigError::InvalidDayStart(self.day_start_minutes));
        }
        Ok(())
    }

    /// Time of day at which a hamster day starts.
    pub fn day_start(&self) -> NaiveTime {
        let minutes = self.day_start_minutes % MINUTES_PER_DAY;
        NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0).unwrap_or(NaiveTime::MIN)
    }

    pub fn day_boundary(&self) -> DayBoundary {
        DayBoundary::new(self.day_start())
    }
}
