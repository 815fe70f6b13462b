//! The click a sink should sound for each pulse.
//!
//! The downbeat gets a higher pitch so the measure is audible. Both clicks are
//! a sine burst whose gain decays exponentially from 1.0 to [`DECAY_FLOOR`]
//! over the click duration.

use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

pub const ACCENT_FREQUENCY_HZ: f32 = 1000.0;
pub const BEAT_FREQUENCY_HZ: f32 = 800.0;
pub const CLICK_DURATION_SECS: f32 = 0.1;
pub const DECAY_FLOOR: f32 = 0.001;

/// Pitch and length of one metronome click.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClickTone {
    pub frequency_hz: f32,
    pub duration_secs: f32,
}

impl ClickTone {
    /// The tone for a given beat of the measure.
    pub fn for_beat(beat_index: u8) -> Self {
        let frequency_hz = if beat_index == 0 {
            ACCENT_FREQUENCY_HZ
        } else {
            BEAT_FREQUENCY_HZ
        };
        Self {
            frequency_hz,
            duration_secs: CLICK_DURATION_SECS,
        }
    }

    /// Gain of the decay envelope `t` seconds into the click.
    pub fn envelope(&self, t: f32) -> f32 {
        if t >= self.duration_secs {
            return 0.0;
        }
        DECAY_FLOOR.powf(t / self.duration_secs)
    }

    /// Renders the click as mono samples at `sample_rate`.
    pub fn render(&self, sample_rate: u32) -> Vec<f32> {
        let num_samples = (sample_rate as f32 * self.duration_secs) as usize;
        (0..num_samples)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                (t * self.frequency_hz * TAU).sin() * self.envelope(t)
            })
            .collect()
    }
}
