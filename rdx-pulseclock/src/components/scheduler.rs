//! The look-ahead pulse scheduler.
//!
//! The driver wakes up at a coarse, jittery cadence. On every wake-up the
//! scheduler emits every pulse whose nominal time falls before
//! `now + lookahead`, then advances its nominal next-pulse time by exactly one
//! beat interval. Pulse times therefore depend only on the start time and the
//! tempo, never on when the driver happened to run.

use super::beat::BeatCounter;
use super::click::ClickTone;
use crate::tempo::TempoConfig;
use serde::{Deserialize, Serialize};

/// One click to be sounded at `audio_time` on the audio clock.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduledPulse {
    pub beat_index: u8,
    pub audio_time: f64,
}

impl ScheduledPulse {
    /// `true` for the first beat of a measure.
    pub fn is_accent(&self) -> bool {
        self.beat_index == 0
    }

    pub fn click(&self) -> ClickTone {
        ClickTone::for_beat(self.beat_index)
    }
}

/// Synchronous scheduling state. Knows nothing about timers or clocks; the
/// caller passes `now` into every operation that needs it.
#[derive(Debug, Clone)]
pub struct LookaheadScheduler {
    tempo: TempoConfig,
    lookahead: f64,
    beats: BeatCounter,
    next_pulse_time: Option<f64>,
    last_pulse_time: Option<f64>,
}

/// What an `update_config` call changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TempoChange {
    pub tempo_changed: bool,
    pub measure_reset: bool,
}

impl LookaheadScheduler {
    pub fn new(tempo: TempoConfig, lookahead_secs: f64) -> Self {
        Self {
            tempo,
            lookahead: lookahead_secs,
            beats: BeatCounter::new(tempo.beats_per_measure),
            next_pulse_time: None,
            last_pulse_time: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.next_pulse_time.is_some()
    }

    pub fn tempo(&self) -> TempoConfig {
        self.tempo
    }

    pub fn lookahead(&self) -> f64 {
        self.lookahead
    }

    /// The beat index the next pulse will carry.
    pub fn next_beat(&self) -> u8 {
        self.beats.current()
    }

    pub fn next_pulse_time(&self) -> Option<f64> {
        self.next_pulse_time
    }

    /// Starts scheduling with the first pulse at `now`, on the downbeat.
    /// Returns `false` without touching any state if already running.
    pub fn start(&mut self, tempo: TempoConfig, now: f64) -> bool {
        if self.is_running() {
            return false;
        }
        self.tempo = tempo;
        self.beats = BeatCounter::new(tempo.beats_per_measure);
        self.next_pulse_time = Some(now);
        self.last_pulse_time = None;
        true
    }

    /// Clears all pending state. Returns `false` if already stopped.
    pub fn stop(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.next_pulse_time = None;
        self.last_pulse_time = None;
        self.beats.reset();
        true
    }

    /// Replaces the tempo configuration.
    ///
    /// A new tempo applies to the pulse after the last one emitted: the pending
    /// boundary is recomputed as `last_pulse + new_interval`, but never earlier
    /// than `now`. Pulses already handed out are unaffected. A new measure
    /// length sends the counter back to the downbeat once.
    pub fn update_config(&mut self, tempo: TempoConfig, now: f64) -> TempoChange {
        let change = TempoChange {
            tempo_changed: tempo.beats_per_minute != self.tempo.beats_per_minute,
            measure_reset: self.beats.set_beats_per_measure(tempo.beats_per_measure),
        };
        self.tempo = tempo;

        if change.tempo_changed && self.next_pulse_time.is_some() {
            if let Some(last) = self.last_pulse_time {
                let rescheduled = last + tempo.seconds_per_beat();
                self.next_pulse_time = Some(rescheduled.max(now));
            }
        }
        change
    }

    /// Emits every pulse due before `now + lookahead`, in increasing time
    /// order, and returns how many were emitted.
    pub fn poll(&mut self, now: f64, mut emit: impl FnMut(ScheduledPulse)) -> usize {
        let Some(mut next) = self.next_pulse_time else {
            return 0;
        };
        let horizon = now + self.lookahead;
        let seconds_per_beat = self.tempo.seconds_per_beat();
        let mut emitted = 0;

        while next < horizon {
            let beat_index = self.beats.advance();
            emit(ScheduledPulse {
                beat_index,
                audio_time: next,
            });
            self.last_pulse_time = Some(next);
            next += seconds_per_beat;
            emitted += 1;
        }
        self.next_pulse_time = Some(next);
        emitted
    }
}
