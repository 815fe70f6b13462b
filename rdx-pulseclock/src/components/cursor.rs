//! The looping playback cursor.

/// Cursor positions are kept on a microsecond grid so that repeated fixed
/// advances land exactly on segment boundaries (fifty 0.1 s steps reach 5.0,
/// not 4.999999999999998).
const GRID: f64 = 1_000_000.0;

fn snap(seconds: f64) -> f64 {
    (seconds * GRID).round() / GRID
}

/// Logical elapsed time over a timeline.
///
/// The cursor loops: an advance that would carry it past the end of the
/// timeline sends it back to `0` instead of clamping.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TimelineCursor {
    position: f64,
    running: bool,
}

impl TimelineCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Resumes from the current position. Returns `false` if already running.
    pub fn start(&mut self) -> bool {
        !std::mem::replace(&mut self.running, true)
    }

    /// Freezes the cursor in place. Returns `false` if already stopped.
    pub fn stop(&mut self) -> bool {
        std::mem::replace(&mut self.running, false)
    }

    /// Flips between running and stopped; returns the new running state.
    pub fn toggle(&mut self) -> bool {
        self.running = !self.running;
        self.running
    }

    /// Moves the cursor to `time` and starts it if it was stopped.
    ///
    /// Negative or non-finite targets land on `0`; a target past `max_end_time`
    /// wraps to `0` just like an advance would.
    ///
    /// The target is snapped to the microsecond grid first, so a time within
    /// half a microsecond of a boundary lands on it: `seek(4.9999996)` sits at
    /// `5.0` and resolves to the segment starting there.
    pub fn seek(&mut self, time: f64, max_end_time: f64) -> f64 {
        self.position = if !time.is_finite() || time < 0.0 || time > max_end_time {
            0.0
        } else {
            snap(time)
        };
        self.running = true;
        self.position
    }

    /// Advances a running cursor by `delta` seconds, wrapping to `0` past
    /// `max_end_time`. A stopped cursor does not move.
    pub fn advance(&mut self, delta: f64, max_end_time: f64) -> f64 {
        if !self.running {
            return self.position;
        }
        let next = snap(self.position + delta);
        self.position = if next > max_end_time { 0.0 } else { next };
        self.position
    }

    /// Returns to `0` and stops.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Formats a cursor position as `M:SS`.
pub fn format_timestamp(seconds: f64) -> String {
    let whole = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{}:{:02}", whole / 60, whole % 60)
}
