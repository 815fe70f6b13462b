//! # Pulseclock
//!
//! A drift-free look-ahead metronome and a looping timeline playback engine.
//!
//! Host timers are coarse and jittery, and they coalesce callbacks under load.
//! Pulseclock keeps both of its engines accurate anyway by separating the
//! *logical* clock from the *driver* that advances it.
//!
//! ## Core Concepts
//!
//! - **Session**: the explicit context shared by the engines (audio clock,
//!   configuration, system events). There is no global state.
//! - **Metronome**: a look-ahead scheduler. Every 25 ms it emits all pulses
//!   due within the next 100 ms, each stamped with its exact audio-clock time,
//!   so the sound is as accurate as the audio clock regardless of timer jitter.
//! - **Playback**: a cursor that advances a fixed delta per tick, loops at the
//!   end of the timeline, and resolves which segment (e.g. chord) is active.
//! - **Driver**: one repeating task per engine, created on start and
//!   invalidated on stop, so a stopped engine never moves again.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use pulseclock::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // 1. Create a session on the host's monotonic clock.
//!     let session = Session::with_monotonic_clock(PulseclockConfig::default());
//!
//!     // 2. Create a metronome and attach a sink that sounds each pulse.
//!     let metronome = session.metronome();
//!     metronome
//!         .on_pulse(|pulse| println!("beat {} at {:.3}s", pulse.beat_index, pulse.audio_time))
//!         .await;
//!
//!     // 3. Start it, then change the tempo while it runs.
//!     metronome.start(TempoConfig::new(120, 4)?).await?;
//!     metronome.update_config(TempoConfig::new(96, 3)?).await?;
//!
//!     // 4. Play a chord progression alongside it.
//!     let timeline = Timeline::new(vec![
//!         Segment::new(1, 0.0, 4.0, "G"),
//!         Segment::new(2, 4.0, 8.0, "Em"),
//!     ])?;
//!     let playback = session.playback(timeline);
//!     let mut updates = playback.subscribe_timeline();
//!     playback.start().await;
//!     while let Ok(event) = updates.recv().await {
//!         println!("{:?}", event.state.active_segment_id);
//!     }
//!     Ok(())
//! }
//! ```

pub const ENGINE_NAME: &str = "Pulseclock";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Declare all the modules in the crate.
pub mod common;
pub mod components;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod tempo;
pub mod time;

/// A prelude module for easy importing of the most common Pulseclock types.
pub mod prelude {
    pub use crate::common::{EngineKind, SegmentId, SinkId};
    pub use crate::components::click::ClickTone;
    pub use crate::components::cursor::format_timestamp;
    pub use crate::components::resolver::{Segment, Timeline};
    pub use crate::components::scheduler::ScheduledPulse;
    pub use crate::config::{PulseclockConfig, SegmentFile};
    pub use crate::engine::{MetronomeEngine, PlaybackEngine, Session};
    pub use crate::error::PulseError;
    pub use crate::events::{SystemEvent, TimelineCause, TimelineEvent, TimelineState};
    pub use crate::tempo::TempoConfig;
    pub use crate::time::{ClockSource, ManualClock, MonotonicClock};
}
