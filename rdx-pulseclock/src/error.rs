//! Error types for the Pulseclock engines.
//!
//! Every fallible library operation returns [`PulseError`]. Binaries wrap it in
//! `anyhow::Result` at the top level.

use crate::common::SegmentId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PulseError {
    /// Tempo outside the supported `[MIN_BPM, MAX_BPM]` range.
    #[error("tempo of {bpm} BPM is outside the supported range {min}..={max}")]
    InvalidTempo { bpm: u16, min: u16, max: u16 },

    /// Measure length outside the supported range.
    #[error("{beats} beats per measure is outside the supported range {min}..={max}")]
    InvalidMeasure { beats: u8, min: u8, max: u8 },

    /// A segment whose bounds are not finite, start below zero, or end at or before its start.
    #[error("segment {id} has invalid bounds [{start_time}, {end_time})")]
    InvalidSegment {
        id: SegmentId,
        start_time: f64,
        end_time: f64,
    },

    /// Two segments cover a common instant.
    #[error("segments {first} and {second} overlap")]
    OverlappingSegments { first: SegmentId, second: SegmentId },

    /// The same id appears twice in one segment list.
    #[error("segment id {0} appears more than once")]
    DuplicateSegmentId(SegmentId),

    /// A jump targeted a segment that is not part of the loaded timeline.
    #[error("no segment with id {0} in the loaded timeline")]
    UnknownSegment(SegmentId),

    /// The audio clock has not been initialised yet.
    #[error("clock source is unavailable: {0}")]
    ClockUnavailable(String),

    /// Configuration could not be loaded or deserialized.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<config::ConfigError> for PulseError {
    fn from(err: config::ConfigError) -> Self {
        PulseError::Config(err.to_string())
    }
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, PulseError>;
