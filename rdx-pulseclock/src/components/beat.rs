//! The beat-within-measure state machine.

/// Tracks which beat of the measure the next pulse carries.
///
/// States are `0..beats_per_measure`, with `0` the accented downbeat. The
/// counter cycles indefinitely and returns to `0` whenever the measure length
/// changes or the metronome stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeatCounter {
    beat: u8,
    beats_per_measure: u8,
}

impl BeatCounter {
    pub fn new(beats_per_measure: u8) -> Self {
        Self {
            beat: 0,
            beats_per_measure: beats_per_measure.max(1),
        }
    }

    /// The beat index the next pulse will carry.
    pub fn current(&self) -> u8 {
        self.beat
    }

    pub fn beats_per_measure(&self) -> u8 {
        self.beats_per_measure
    }

    /// Returns the current beat and moves to the next one.
    pub fn advance(&mut self) -> u8 {
        let beat = self.beat;
        self.beat = (self.beat + 1) % self.beats_per_measure;
        beat
    }

    pub fn reset(&mut self) {
        self.beat = 0;
    }

    /// Applies a new measure length. Resets to the downbeat only if the length
    /// actually changed; returns whether a reset happened.
    pub fn set_beats_per_measure(&mut self, beats_per_measure: u8) -> bool {
        let beats_per_measure = beats_per_measure.max(1);
        if beats_per_measure == self.beats_per_measure {
            return false;
        }
        self.beats_per_measure = beats_per_measure;
        self.reset();
        true
    }
}
