//! Defines all configuration structures for the Pulseclock engines.
//!
//! These structs are deserialized with `serde`, usually from a TOML file layered
//! with `PULSECLOCK__*` environment variables through the `config` crate. Every
//! field has a default, so an empty source yields a working configuration.

use crate::components::resolver::{Segment, Timeline};
use crate::error::{PulseError, Result};
use crate::tempo::TempoConfig;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// The top-level configuration shared by a session's engines.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PulseclockConfig {
    /// Tempo and measure length the metronome starts with.
    #[serde(default)]
    pub tempo: TempoConfig,

    /// Cadence and window of the look-ahead scheduler.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Cadence of the timeline cursor.
    #[serde(default)]
    pub timeline: TimelineConfig,
}

/// Settings for the look-ahead pulse scheduler.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// How often the driver wakes up to top up the pulse queue.
    #[serde(default = "default_scheduler_tick_ms")]
    pub tick_interval_ms: u64,

    /// How far past `now` pulses are scheduled on each wake-up.
    #[serde(default = "default_lookahead_ms")]
    pub lookahead_ms: u64,

    /// Number of recent pulses kept for diagnostics. Zero disables the history.
    #[serde(default = "default_history_len")]
    pub history_len: usize,
}

/// Settings for the timeline cursor.
#[derive(Debug, Clone, Deserialize)]
pub struct TimelineConfig {
    /// Both the driver cadence and the logical delta added per tick.
    #[serde(default = "default_timeline_tick_ms")]
    pub tick_interval_ms: u64,
}

/// A segment list as stored on disk, e.g. a `[[segments]]` TOML array.
#[derive(Debug, Clone, Deserialize)]
pub struct SegmentFile {
    #[serde(default)]
    pub segments: Vec<Segment>,
}

impl PulseclockConfig {
    /// Loads the configuration from an optional file plus the environment.
    ///
    /// Environment variables use the `PULSECLOCK__` prefix and `__` as the
    /// section separator, e.g. `PULSECLOCK__TEMPO__BEATS_PER_MINUTE=120`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix("PULSECLOCK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let parsed: Self = settings.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Checks cross-field constraints that serde defaults cannot express.
    pub fn validate(&self) -> Result<()> {
        self.tempo.validate()?;
        if self.scheduler.tick_interval_ms == 0 {
            return Err(PulseError::Config(
                "scheduler.tick_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.scheduler.lookahead_ms < self.scheduler.tick_interval_ms {
            return Err(PulseError::Config(format!(
                "scheduler.lookahead_ms ({}) must cover at least one tick ({})",
                self.scheduler.lookahead_ms, self.scheduler.tick_interval_ms
            )));
        }
        if self.timeline.tick_interval_ms == 0 {
            return Err(PulseError::Config(
                "timeline.tick_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// The look-ahead window in audio-clock seconds.
    pub fn lookahead_secs(&self) -> f64 {
        Duration::from_millis(self.lookahead_ms).as_secs_f64()
    }
}

impl TimelineConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// The logical delta the cursor advances by on each tick.
    pub fn delta_secs(&self) -> f64 {
        self.tick_interval().as_secs_f64()
    }
}

impl SegmentFile {
    /// Reads a segment list from a TOML, JSON or YAML file and validates it.
    pub fn load(path: &Path) -> Result<Timeline> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .build()?;
        let file: Self = settings.try_deserialize()?;
        Timeline::new(file.segments)
    }
}

// --- Default value functions for serde ---

fn default_scheduler_tick_ms() -> u64 {
    25
}

fn default_lookahead_ms() -> u64 {
    100
}

fn default_history_len() -> usize {
    32
}

fn default_timeline_tick_ms() -> u64 {
    100
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_scheduler_tick_ms(),
            lookahead_ms: default_lookahead_ms(),
            history_len: default_history_len(),
        }
    }
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_timeline_tick_ms(),
        }
    }
}
