//! Clock sources and the fixed-cadence driver shared by both engines.
//!
//! A [`ClockSource`] answers "what time is it on the audio clock"; it holds no
//! scheduling state. A [`Driver`] owns one repeating tokio interval per engine
//! and calls [`Tick::tick`] on the engine state under the engine lock.
//!
//! Every launch and halt bumps a generation counter. A driver task only ticks
//! while its captured generation is still current, and the check happens under
//! the same lock `halt` takes, so once `halt` returns no stale pending tick can
//! touch the stopped state.

use crate::error::{PulseError, Result};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::trace;

/// A monotonic, audio-capable clock measured in seconds.
pub trait ClockSource: Send + Sync + fmt::Debug {
    /// Returns the current clock time, or `ClockUnavailable` if the clock
    /// cannot be queried yet.
    fn now(&self) -> Result<f64>;
}

/// A clock backed by the tokio monotonic clock, starting at zero on creation.
///
/// Because it reads `tokio::time::Instant`, it follows paused and advanced
/// time in tests.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockSource for MonotonicClock {
    fn now(&self) -> Result<f64> {
        Ok(self.origin.elapsed().as_secs_f64())
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same time, so a test can hand one clone to a session and
/// keep another to drive it. A clock created with
/// [`ManualClock::uninitialized`] reports `ClockUnavailable` until it is set,
/// which models an audio device that has not been opened yet.
#[derive(Debug, Clone)]
pub struct ManualClock {
    inner: Arc<ManualClockState>,
}

#[derive(Debug)]
struct ManualClockState {
    bits: AtomicU64,
    ready: AtomicBool,
}

impl ManualClock {
    /// Creates a ready clock reading `seconds`.
    pub fn new(seconds: f64) -> Self {
        let clock = Self::uninitialized();
        clock.set(seconds);
        clock
    }

    /// Creates a clock that is not yet available.
    pub fn uninitialized() -> Self {
        Self {
            inner: Arc::new(ManualClockState {
                bits: AtomicU64::new(0f64.to_bits()),
                ready: AtomicBool::new(false),
            }),
        }
    }

    /// Sets the current time and marks the clock as available.
    pub fn set(&self, seconds: f64) {
        self.inner.bits.store(seconds.to_bits(), Ordering::SeqCst);
        self.inner.ready.store(true, Ordering::SeqCst);
    }

    /// Moves the clock forward by `seconds`.
    pub fn advance(&self, seconds: f64) {
        let current = f64::from_bits(self.inner.bits.load(Ordering::SeqCst));
        self.set(current + seconds);
    }
}

impl ClockSource for ManualClock {
    fn now(&self) -> Result<f64> {
        if !self.inner.ready.load(Ordering::SeqCst) {
            return Err(PulseError::ClockUnavailable(
                "manual clock has not been set".to_string(),
            ));
        }
        Ok(f64::from_bits(self.inner.bits.load(Ordering::SeqCst)))
    }
}

/// Engine state advanced by one driver tick.
pub trait Tick: Send + 'static {
    fn tick(&mut self);
}

/// Engine state together with the bookkeeping of the driver that advances it.
pub(crate) struct Driven<S> {
    pub(crate) state: S,
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

impl<S: Tick> Driven<S> {
    fn new(state: S) -> Self {
        Self {
            state,
            generation: 0,
            handle: None,
        }
    }

    /// `true` while a driver task is attached.
    pub(crate) fn is_driving(&self) -> bool {
        self.handle.is_some()
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Runs one tick if `generation` belongs to the attached driver.
    /// Returns `false` for a stale or detached tick, which ends the driver loop.
    pub(crate) fn tick_if_current(&mut self, generation: u64) -> bool {
        if self.handle.is_none() || generation != self.generation {
            trace!(generation, current = self.generation, "Dropping stale tick.");
            return false;
        }
        self.state.tick();
        true
    }

    /// Detaches and aborts the driver task. Returns `false` if none was attached.
    pub(crate) fn halt(&mut self) -> bool {
        self.generation += 1;
        match self.handle.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }
}

/// One repeating driver per engine.
///
/// Cloning a `Driver` clones the handle, not the state: all clones drive the
/// same engine.
pub(crate) struct Driver<S> {
    shared: Arc<Mutex<Driven<S>>>,
    cadence: Duration,
    delay_first_tick: bool,
}

impl<S> Clone for Driver<S> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            cadence: self.cadence,
            delay_first_tick: self.delay_first_tick,
        }
    }
}

impl<S: Tick> Driver<S> {
    /// A driver whose first tick fires as soon as it is launched.
    pub(crate) fn new(state: S, cadence: Duration) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Driven::new(state))),
            cadence,
            delay_first_tick: false,
        }
    }

    /// A driver whose first tick fires one cadence after launch.
    pub(crate) fn delayed(state: S, cadence: Duration) -> Self {
        Self {
            delay_first_tick: true,
            ..Self::new(state, cadence)
        }
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, Driven<S>> {
        self.shared.lock().await
    }

    /// Attaches a new driver task to `driven`, which must be this driver's
    /// locked state. Does nothing if a task is already attached.
    ///
    /// A late tick delays the ones after it instead of bursting to catch up.
    pub(crate) fn launch(&self, driven: &mut Driven<S>) {
        if driven.is_driving() {
            return;
        }
        driven.generation += 1;
        let generation = driven.generation();
        let weak: Weak<Mutex<Driven<S>>> = Arc::downgrade(&self.shared);
        let cadence = self.cadence;
        let first_tick = if self.delay_first_tick {
            Instant::now() + cadence
        } else {
            Instant::now()
        };

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(first_tick, cadence);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(shared) = weak.upgrade() else { break };
                let mut driven = shared.lock().await;
                if !driven.tick_if_current(generation) {
                    break;
                }
            }
        });
        driven.handle = Some(handle);
    }
}
