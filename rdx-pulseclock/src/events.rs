//! Defines all public event types broadcast by the Pulseclock engines.
//!
//! Display layers and diagnostics subscribe to these streams instead of
//! polling engine state.

use crate::common::{EngineKind, SegmentId, SinkId};
use crate::tempo::TempoConfig;
use serde::Serialize;

/// A snapshot of timeline playback.
///
/// `active_segment_id` is always derived from `cursor` and the loaded
/// segments; it is never set on its own.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimelineState {
    pub cursor: f64,
    pub is_running: bool,
    pub active_segment_id: Option<SegmentId>,
}

/// Why a `TimelineEvent` was published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimelineCause {
    /// A driver tick advanced the cursor.
    Tick,
    /// The cursor was moved directly.
    Seek,
    /// A new segment list replaced the old one.
    Load,
}

/// Published on every timeline tick, seek and load.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimelineEvent {
    pub state: TimelineState,
    pub cause: TimelineCause,
}

/// Events related to the lifecycle and configuration of the engines.
#[derive(Debug, Clone, PartialEq)]
pub enum SystemEvent {
    /// An engine attached its driver.
    EngineStarted { engine: EngineKind },
    /// An engine detached its driver.
    EngineStopped { engine: EngineKind },
    /// The metronome's tempo configuration was replaced.
    TempoChanged { tempo: TempoConfig },
    /// A new segment list was loaded into the playback engine.
    SegmentsLoaded { count: usize, max_end_time: f64 },
    /// A pulse sink was registered.
    SinkAdded { id: SinkId },
    /// A pulse sink was removed.
    SinkRemoved { id: SinkId },
}
