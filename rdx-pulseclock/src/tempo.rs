//! Tempo and measure configuration for the metronome.

use crate::error::{PulseError, Result};
use serde::{Deserialize, Serialize};

pub const MIN_BPM: u16 = 40;
pub const MAX_BPM: u16 = 220;
pub const DEFAULT_BPM: u16 = 100;

pub const MIN_BEATS_PER_MEASURE: u8 = 2;
pub const MAX_BEATS_PER_MEASURE: u8 = 12;
pub const DEFAULT_BEATS_PER_MEASURE: u8 = 4;

/// Tempo and measure length for a metronome session.
///
/// A `TempoConfig` is always replaced as a whole. Construct it through
/// [`TempoConfig::new`] so out-of-range values are rejected before they reach
/// the scheduler; values deserialized from a config file are checked with
/// [`TempoConfig::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempoConfig {
    #[serde(default = "default_bpm")]
    pub beats_per_minute: u16,
    #[serde(default = "default_beats_per_measure")]
    pub beats_per_measure: u8,
}

impl TempoConfig {
    /// Creates a validated tempo configuration.
    pub fn new(beats_per_minute: u16, beats_per_measure: u8) -> Result<Self> {
        let config = Self {
            beats_per_minute,
            beats_per_measure,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks both fields against their supported ranges.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_BPM..=MAX_BPM).contains(&self.beats_per_minute) {
            return Err(PulseError::InvalidTempo {
                bpm: self.beats_per_minute,
                min: MIN_BPM,
                max: MAX_BPM,
            });
        }
        if !(MIN_BEATS_PER_MEASURE..=MAX_BEATS_PER_MEASURE).contains(&self.beats_per_measure) {
            return Err(PulseError::InvalidMeasure {
                beats: self.beats_per_measure,
                min: MIN_BEATS_PER_MEASURE,
                max: MAX_BEATS_PER_MEASURE,
            });
        }
        Ok(())
    }

    /// The interval between two consecutive pulses, in seconds.
    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / f64::from(self.beats_per_minute)
    }

    /// Returns a copy with a different tempo, validated.
    pub fn with_bpm(self, beats_per_minute: u16) -> Result<Self> {
        Self::new(beats_per_minute, self.beats_per_measure)
    }

    /// Returns a copy with a different measure length, validated.
    pub fn with_beats_per_measure(self, beats_per_measure: u8) -> Result<Self> {
        Self::new(self.beats_per_minute, beats_per_measure)
    }

    /// Steps the measure length up or down, the way a +/- stepper would.
    ///
    /// Returns `None` when the result would leave the supported range, in which
    /// case the caller keeps its current configuration.
    pub fn adjust_beats_per_measure(self, delta: i8) -> Option<Self> {
        let adjusted = i16::from(self.beats_per_measure) + i16::from(delta);
        let beats = u8::try_from(adjusted).ok()?;
        self.with_beats_per_measure(beats).ok()
    }
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            beats_per_minute: DEFAULT_BPM,
            beats_per_measure: DEFAULT_BEATS_PER_MEASURE,
        }
    }
}

fn default_bpm() -> u16 {
    DEFAULT_BPM
}

fn default_beats_per_measure() -> u8 {
    DEFAULT_BEATS_PER_MEASURE
}
