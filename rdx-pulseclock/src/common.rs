//! Contains common, primitive types shared by both engines.
//!
//! Using distinct identifier types instead of bare integers keeps sink handles
//! and segment ids from being mixed up at call sites.

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use std::fmt;

new_key_type! {
    /// Uniquely and safely identifies a registered pulse sink within a metronome.
    ///
    /// Returned by `MetronomeEngine::on_pulse`. Keys are never reused, so a stale
    /// id cannot remove a sink registered later.
    pub struct SinkId;
}

/// Identifies a segment within a timeline.
///
/// Ids are supplied by the producer of the segment list and must be unique
/// within one list.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SegmentId(pub u32);

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which engine a system event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Metronome,
    Playback,
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::Metronome => f.write_str("metronome"),
            EngineKind::Playback => f.write_str("playback"),
        }
    }
}
