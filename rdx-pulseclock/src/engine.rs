//! The session and the two engines that run inside it.
//!
//! Both engines follow the same shape: synchronous component state behind one
//! lock, advanced by a [`Driver`] task, with results broadcast to subscribers.
//! Engines are cheap to clone; every clone is a handle to the same instance.

use crate::common::{EngineKind, SegmentId, SinkId};
use crate::components::cursor::TimelineCursor;
use crate::components::resolver::Timeline;
use crate::components::scheduler::{LookaheadScheduler, ScheduledPulse};
use crate::config::PulseclockConfig;
use crate::error::{PulseError, Result};
use crate::events::{SystemEvent, TimelineCause, TimelineEvent, TimelineState};
use crate::tempo::TempoConfig;
use crate::time::{ClockSource, Driven, Driver, MonotonicClock, Tick};
use slotmap::SlotMap;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

/// A callback that turns a pulse into sound at `pulse.audio_time`.
pub type PulseSink = Box<dyn FnMut(ScheduledPulse) + Send + Sync>;

const CHANNEL_CAPACITY: usize = 256;

/// The explicit context every engine is built from: the audio clock, the
/// configuration and the system event channel.
#[derive(Clone)]
pub struct Session {
    clock: Arc<dyn ClockSource>,
    config: Arc<PulseclockConfig>,
    system_event_sender: broadcast::Sender<SystemEvent>,
}

impl Session {
    pub fn new(config: PulseclockConfig, clock: impl ClockSource + 'static) -> Self {
        let (system_event_sender, _) = broadcast::channel(64);
        Self {
            clock: Arc::new(clock),
            config: Arc::new(config),
            system_event_sender,
        }
    }

    /// A session on the host's monotonic clock.
    pub fn with_monotonic_clock(config: PulseclockConfig) -> Self {
        Self::new(config, MonotonicClock::new())
    }

    pub fn clock(&self) -> Arc<dyn ClockSource> {
        self.clock.clone()
    }

    pub fn now(&self) -> Result<f64> {
        self.clock.now()
    }

    pub fn config(&self) -> &PulseclockConfig {
        &self.config
    }

    /// Creates a metronome bound to this session.
    pub fn metronome(&self) -> MetronomeEngine {
        MetronomeEngine::new(self)
    }

    /// Creates a playback engine over `timeline` bound to this session.
    pub fn playback(&self, timeline: Timeline) -> PlaybackEngine {
        PlaybackEngine::new(self, timeline)
    }

    /// Subscribes to the `SystemEvent` stream.
    pub fn subscribe_system_events(&self) -> broadcast::Receiver<SystemEvent> {
        self.system_event_sender.subscribe()
    }

    fn announce(&self, event: SystemEvent) {
        self.system_event_sender.send(event).ok();
    }
}

struct MetronomeState {
    clock: Arc<dyn ClockSource>,
    scheduler: LookaheadScheduler,
    sinks: SlotMap<SinkId, PulseSink>,
    history: VecDeque<ScheduledPulse>,
    history_len: usize,
    pulse_sender: broadcast::Sender<ScheduledPulse>,
}

impl MetronomeState {
    /// Hands every pulse due before `now + lookahead` to the sinks, the
    /// history and the pulse channel.
    fn emit_due(&mut self, now: f64) -> usize {
        let Self {
            scheduler,
            sinks,
            history,
            history_len,
            pulse_sender,
            ..
        } = self;
        scheduler.poll(now, |pulse| {
            trace!(beat = pulse.beat_index, at = pulse.audio_time, "Pulse scheduled.");
            for sink in sinks.values_mut() {
                sink(pulse);
            }
            if *history_len > 0 {
                if history.len() >= *history_len {
                    history.pop_front();
                }
                history.push_back(pulse);
            }
            pulse_sender.send(pulse).ok();
        })
    }
}

impl Tick for MetronomeState {
    fn tick(&mut self) {
        match self.clock.now() {
            Ok(now) => {
                self.emit_due(now);
            }
            Err(err) => warn!("Skipping scheduler tick: {}", err),
        }
    }
}

/// The look-ahead metronome.
///
/// On every driver tick (25 ms by default) it emits the pulses that fall inside
/// the look-ahead window to every registered sink. Sinks receive the pulse
/// ahead of time and are responsible for sounding it at `audio_time`.
#[derive(Clone)]
pub struct MetronomeEngine {
    session: Session,
    driver: Driver<MetronomeState>,
    pulse_sender: broadcast::Sender<ScheduledPulse>,
}

impl MetronomeEngine {
    /// Creates a stopped metronome using the session's scheduler settings.
    pub fn new(session: &Session) -> Self {
        let config = session.config();
        let (pulse_sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        let state = MetronomeState {
            clock: session.clock(),
            scheduler: LookaheadScheduler::new(config.tempo, config.scheduler.lookahead_secs()),
            sinks: SlotMap::with_key(),
            history: VecDeque::with_capacity(config.scheduler.history_len),
            history_len: config.scheduler.history_len,
            pulse_sender: pulse_sender.clone(),
        };
        Self {
            session: session.clone(),
            driver: Driver::new(state, config.scheduler.tick_interval()),
            pulse_sender,
        }
    }

    /// Starts emitting pulses, the first on the downbeat at the current clock
    /// time. A no-op if already running.
    ///
    /// Fails fast with `ClockUnavailable` if the clock cannot be read, leaving
    /// the metronome stopped so the caller can retry.
    pub async fn start(&self, tempo: TempoConfig) -> Result<()> {
        tempo.validate()?;
        let mut driven = self.driver.lock().await;
        if driven.state.scheduler.is_running() {
            debug!("Metronome already running; start ignored.");
            return Ok(());
        }
        let now = driven.state.clock.now()?;
        driven.state.scheduler.start(tempo, now);
        driven.state.history.clear();
        self.driver.launch(&mut driven);
        info!(
            bpm = tempo.beats_per_minute,
            beats_per_measure = tempo.beats_per_measure,
            "Metronome started at {:.3}s.",
            now
        );
        self.session.announce(SystemEvent::EngineStarted {
            engine: EngineKind::Metronome,
        });
        Ok(())
    }

    /// Starts with the tempo currently stored in the metronome.
    pub async fn resume(&self) -> Result<()> {
        let tempo = self.tempo().await;
        self.start(tempo).await
    }

    /// Stops emission and clears pending state. Once this returns, no further
    /// pulse reaches a sink. Returns `false` if already stopped.
    pub async fn stop(&self) -> bool {
        let mut driven = self.driver.lock().await;
        driven.halt();
        let stopped = driven.state.scheduler.stop();
        if stopped {
            info!("Metronome stopped.");
            self.session.announce(SystemEvent::EngineStopped {
                engine: EngineKind::Metronome,
            });
        }
        stopped
    }

    /// Replaces the tempo configuration without stopping.
    ///
    /// While running, a new tempo applies from the next unscheduled pulse on and
    /// a new measure length restarts the count at the downbeat.
    pub async fn update_config(&self, tempo: TempoConfig) -> Result<()> {
        tempo.validate()?;
        let mut driven = self.driver.lock().await;
        let now = if driven.state.scheduler.is_running() {
            driven.state.clock.now()?
        } else {
            0.0
        };
        let change = driven.state.scheduler.update_config(tempo, now);
        debug!(
            bpm = tempo.beats_per_minute,
            beats_per_measure = tempo.beats_per_measure,
            tempo_changed = change.tempo_changed,
            measure_reset = change.measure_reset,
            "Tempo configuration updated."
        );
        self.session.announce(SystemEvent::TempoChanged { tempo });
        Ok(())
    }

    /// Registers a sink that receives every pulse from now on.
    pub async fn on_pulse(
        &self,
        sink: impl FnMut(ScheduledPulse) + Send + Sync + 'static,
    ) -> SinkId {
        let id = self.driver.lock().await.state.sinks.insert(Box::new(sink));
        self.session.announce(SystemEvent::SinkAdded { id });
        id
    }

    /// Removes a sink. Returns `true` if it was registered.
    pub async fn remove_sink(&self, id: SinkId) -> bool {
        let was_removed = self.driver.lock().await.state.sinks.remove(id).is_some();
        if was_removed {
            self.session.announce(SystemEvent::SinkRemoved { id });
        }
        was_removed
    }

    /// Subscribes to the stream of scheduled pulses.
    pub fn subscribe_pulses(&self) -> broadcast::Receiver<ScheduledPulse> {
        self.pulse_sender.subscribe()
    }

    pub async fn is_running(&self) -> bool {
        self.driver.lock().await.state.scheduler.is_running()
    }

    pub async fn tempo(&self) -> TempoConfig {
        self.driver.lock().await.state.scheduler.tempo()
    }

    /// The beat index the next scheduled pulse will carry.
    pub async fn next_beat(&self) -> u8 {
        self.driver.lock().await.state.scheduler.next_beat()
    }

    pub async fn next_pulse_time(&self) -> Option<f64> {
        self.driver.lock().await.state.scheduler.next_pulse_time()
    }

    /// The most recent pulses, oldest first.
    pub async fn history(&self) -> Vec<ScheduledPulse> {
        self.driver.lock().await.state.history.iter().copied().collect()
    }

    /// The beat that is audible right now: the latest pulse in the history
    /// whose `audio_time` has passed. `None` when stopped, before the first
    /// pulse sounds, or with the history disabled.
    pub async fn sounding_beat(&self) -> Option<u8> {
        let driven = self.driver.lock().await;
        if !driven.state.scheduler.is_running() {
            return None;
        }
        let now = driven.state.clock.now().ok()?;
        driven
            .state
            .history
            .iter()
            .rev()
            .find(|pulse| pulse.audio_time <= now)
            .map(|pulse| pulse.beat_index)
    }
}

struct PlaybackState {
    cursor: TimelineCursor,
    timeline: Timeline,
    delta: f64,
    timeline_sender: broadcast::Sender<TimelineEvent>,
}

impl PlaybackState {
    fn snapshot(&self) -> TimelineState {
        let cursor = self.cursor.position();
        TimelineState {
            cursor,
            is_running: self.cursor.is_running(),
            active_segment_id: self.timeline.resolve(cursor),
        }
    }

    fn publish(&self, cause: TimelineCause) -> TimelineState {
        let state = self.snapshot();
        self.timeline_sender
            .send(TimelineEvent { state, cause })
            .ok();
        state
    }
}

impl Tick for PlaybackState {
    fn tick(&mut self) {
        self.cursor.advance(self.delta, self.timeline.max_end_time());
        let state = self.publish(TimelineCause::Tick);
        trace!(cursor = state.cursor, active = ?state.active_segment_id, "Timeline tick.");
    }
}

/// Timeline playback over a fixed segment list.
///
/// Each tick advances the cursor by the configured cadence (not by measured
/// wall-clock time), resolves the active segment and publishes a
/// `TimelineEvent`. Seeks publish immediately.
#[derive(Clone)]
pub struct PlaybackEngine {
    session: Session,
    driver: Driver<PlaybackState>,
    timeline_sender: broadcast::Sender<TimelineEvent>,
}

impl PlaybackEngine {
    /// Creates a stopped playback engine with the cursor at `0`.
    pub fn new(session: &Session, timeline: Timeline) -> Self {
        let config = &session.config().timeline;
        let (timeline_sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        let state = PlaybackState {
            cursor: TimelineCursor::new(),
            timeline,
            delta: config.delta_secs(),
            timeline_sender: timeline_sender.clone(),
        };
        Self {
            session: session.clone(),
            driver: Driver::delayed(state, config.tick_interval()),
            timeline_sender,
        }
    }

    fn attach(&self, driven: &mut Driven<PlaybackState>) -> bool {
        if driven.is_driving() {
            return false;
        }
        driven.state.cursor.start();
        self.driver.launch(driven);
        info!("Playback started at {:.3}s.", driven.state.cursor.position());
        self.session.announce(SystemEvent::EngineStarted {
            engine: EngineKind::Playback,
        });
        true
    }

    fn detach(&self, driven: &mut Driven<PlaybackState>) -> bool {
        let halted = driven.halt();
        driven.state.cursor.stop();
        if halted {
            info!("Playback paused at {:.3}s.", driven.state.cursor.position());
            self.session.announce(SystemEvent::EngineStopped {
                engine: EngineKind::Playback,
            });
        }
        halted
    }

    /// Resumes from the current cursor. Returns `false` if already running.
    pub async fn start(&self) -> bool {
        let mut driven = self.driver.lock().await;
        self.attach(&mut driven)
    }

    /// Freezes the cursor where it is. Once this returns, the cursor does not
    /// move again until the next start or seek. Returns `false` if already
    /// stopped.
    pub async fn stop(&self) -> bool {
        let mut driven = self.driver.lock().await;
        self.detach(&mut driven)
    }

    /// Play/pause. Returns the new running state.
    pub async fn toggle(&self) -> bool {
        let mut driven = self.driver.lock().await;
        if driven.is_driving() {
            self.detach(&mut driven);
            false
        } else {
            self.attach(&mut driven);
            true
        }
    }

    /// Moves the cursor to `time`, starting playback if it was stopped, and
    /// publishes the resulting state.
    pub async fn seek(&self, time: f64) -> TimelineState {
        let mut driven = self.driver.lock().await;
        self.seek_locked(&mut driven, time)
    }

    fn seek_locked(&self, driven: &mut Driven<PlaybackState>, time: f64) -> TimelineState {
        let max_end_time = driven.state.timeline.max_end_time();
        let position = driven.state.cursor.seek(time, max_end_time);
        debug!(requested = time, position, "Seek.");
        self.attach(driven);
        driven.state.publish(TimelineCause::Seek)
    }

    /// Seeks to the start of segment `id` in the timeline loaded right now.
    pub async fn jump_to(&self, id: SegmentId) -> Result<TimelineState> {
        let mut driven = self.driver.lock().await;
        let start_time = driven
            .state
            .timeline
            .get(id)
            .map(|segment| segment.start_time)
            .ok_or(PulseError::UnknownSegment(id))?;
        Ok(self.seek_locked(&mut driven, start_time))
    }

    /// Replaces the segment list wholesale. Playback stops and the cursor
    /// returns to `0`.
    pub async fn load(&self, timeline: Timeline) -> TimelineState {
        let mut driven = self.driver.lock().await;
        self.detach(&mut driven);
        driven.state.cursor.reset();
        let count = timeline.len();
        let max_end_time = timeline.max_end_time();
        driven.state.timeline = timeline;
        info!(count, max_end_time, "Segments loaded.");
        self.session
            .announce(SystemEvent::SegmentsLoaded { count, max_end_time });
        driven.state.publish(TimelineCause::Load)
    }

    pub async fn state(&self) -> TimelineState {
        self.driver.lock().await.state.snapshot()
    }

    /// A copy of the loaded timeline.
    pub async fn timeline(&self) -> Timeline {
        self.driver.lock().await.state.timeline.clone()
    }

    /// Subscribes to the stream of timeline updates.
    pub fn subscribe_timeline(&self) -> broadcast::Receiver<TimelineEvent> {
        self.timeline_sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::resolver::Segment;
    use crate::time::ManualClock;
    use std::sync::Mutex;

    fn progression() -> Timeline {
        Timeline::new(vec![
            Segment::new(1, 0.0, 5.0, "G"),
            Segment::new(2, 5.0, 10.0, "Em"),
            Segment::new(3, 10.0, 15.0, "C"),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn stale_scheduler_tick_after_stop_emits_nothing() {
        let clock = ManualClock::new(0.0);
        let session = Session::new(PulseclockConfig::default(), clock.clone());
        let metronome = session.metronome();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        metronome
            .on_pulse(move |pulse| sink.lock().unwrap().push(pulse))
            .await;

        metronome.start(TempoConfig::new(120, 4).unwrap()).await.unwrap();
        let stale = metronome.driver.lock().await.generation();
        assert!(metronome.stop().await);
        let emitted = received.lock().unwrap().len();

        clock.advance(5.0);
        let mut driven = metronome.driver.lock().await;
        assert!(!driven.tick_if_current(stale));
        assert_eq!(received.lock().unwrap().len(), emitted);
    }

    #[tokio::test]
    async fn stale_cursor_tick_after_stop_does_not_advance() {
        let session = Session::new(PulseclockConfig::default(), ManualClock::new(0.0));
        let playback = session.playback(progression());
        playback.seek(4.0).await;
        let stale = playback.driver.lock().await.generation();
        assert!(playback.stop().await);

        let mut driven = playback.driver.lock().await;
        assert!(!driven.tick_if_current(stale));
        assert_eq!(driven.state.cursor.position(), 4.0);
    }

    #[tokio::test]
    async fn jump_uses_the_timeline_loaded_at_call_time() {
        let session = Session::new(PulseclockConfig::default(), ManualClock::new(0.0));
        let playback = session.playback(progression());
        let other = playback.clone();
        other
            .load(Timeline::new(vec![Segment::new(3, 2.0, 6.0, "Am")]).unwrap())
            .await;

        let state = playback.jump_to(SegmentId(3)).await.unwrap();
        assert_eq!(state.cursor, 2.0);
        assert_eq!(state.active_segment_id, Some(SegmentId(3)));
        assert!(state.is_running);
        playback.stop().await;
    }

    #[tokio::test]
    async fn start_fails_fast_without_a_clock() {
        let clock = ManualClock::uninitialized();
        let session = Session::new(PulseclockConfig::default(), clock.clone());
        let metronome = session.metronome();
        let tempo = TempoConfig::default();

        let result = metronome.start(tempo).await;
        assert!(matches!(result, Err(PulseError::ClockUnavailable(_))));
        assert!(!metronome.is_running().await);
        assert!(!metronome.driver.lock().await.is_driving());

        clock.set(0.0);
        assert!(metronome.start(tempo).await.is_ok());
        assert!(metronome.is_running().await);
        metronome.stop().await;
    }

    #[tokio::test]
    async fn clock_failure_during_a_tick_is_skipped() {
        let session = Session::new(PulseclockConfig::default(), ManualClock::uninitialized());
        let metronome = session.metronome();
        let mut driven = metronome.driver.lock().await;
        driven.state.scheduler.start(TempoConfig::default(), 0.0);
        driven.state.tick();
        assert!(driven.state.history.is_empty());
    }

    #[tokio::test]
    async fn history_is_bounded() {
        let mut config = PulseclockConfig::default();
        config.scheduler.history_len = 3;
        let session = Session::new(config, ManualClock::new(0.0));
        let metronome = session.metronome();
        let mut driven = metronome.driver.lock().await;
        driven.state.scheduler.start(TempoConfig::new(120, 4).unwrap(), 0.0);
        // The window ends at 2.45 + 0.1, so the pulse at 2.5 is already due.
        assert_eq!(driven.state.emit_due(2.45), 6);
        let times: Vec<f64> = driven.state.history.iter().map(|p| p.audio_time).collect();
        assert_eq!(times, vec![1.5, 2.0, 2.5]);
    }

    #[tokio::test]
    async fn removed_sink_stops_receiving() {
        let session = Session::new(PulseclockConfig::default(), ManualClock::new(0.0));
        let metronome = session.metronome();
        let count = Arc::new(Mutex::new(0));
        let sink_count = count.clone();
        let id = metronome
            .on_pulse(move |_| *sink_count.lock().unwrap() += 1)
            .await;
        assert!(metronome.remove_sink(id).await);
        assert!(!metronome.remove_sink(id).await);

        let mut driven = metronome.driver.lock().await;
        driven.state.scheduler.start(TempoConfig::default(), 0.0);
        driven.state.emit_due(1.0);
        assert_eq!(*count.lock().unwrap(), 0);
    }
}
