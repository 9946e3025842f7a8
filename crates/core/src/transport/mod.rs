//! Transport bookkeeping for the look-ahead scheduler.

/// Safety margin between `start()` and the first click, seconds. Gives the
/// device room to finish resuming before the first onset.
pub const START_OFFSET: f64 = 0.05;

/// How far ahead of the audio clock beats are scheduled, seconds.
pub const SCHEDULE_AHEAD: f64 = 0.1;

/// Recommended scheduler tick cadence, milliseconds. The cadence only needs
/// to stay comfortably below [`SCHEDULE_AHEAD`]; jitter here never reaches
/// the audio clock.
pub const TICK_INTERVAL_MS: u64 = 25;

/// Mutable playback state, owned by the scheduler. Every advancement
/// assigns all derived fields together, so readers interleaving at callback
/// boundaries never observe a partial update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransportState {
    pub running: bool,
    /// Beat index of the next unscheduled beat, 0-based, always in [0, meter).
    pub beat_index: u32,
    /// Absolute clock time of the next unscheduled beat. Monotonically
    /// non-decreasing while running.
    pub next_beat_time: f64,
    /// Absolute clock time of the most recently scheduled beat; the start of
    /// the current beat for progress interpolation.
    pub last_boundary_time: f64,
    /// 1-indexed beat number published for display at schedule time.
    pub displayed_beat: u32,
}

impl TransportState {
    /// Start transition: capture the clock and reset bookkeeping. The first
    /// click lands [`START_OFFSET`] after `now`.
    pub fn start_at(&mut self, now: f64) {
        let start = now + START_OFFSET;
        self.running = true;
        self.beat_index = 0;
        self.next_beat_time = start;
        self.last_boundary_time = start;
        self.displayed_beat = 1;
    }

    /// Stop transition: the display resets to beat 1 / progress 0. Clicks
    /// already handed to the device are left to fire.
    pub fn stop(&mut self) {
        self.running = false;
        self.displayed_beat = 1;
    }

    /// Beat advancer: the time just consumed becomes the start of the
    /// current beat, the next target moves one beat forward and the index
    /// wraps on the bar length. Deterministic given its inputs; no other
    /// side effects.
    pub fn advance(&mut self, seconds_per_beat: f64, beats_per_bar: u32) {
        self.last_boundary_time = self.next_beat_time;
        self.next_beat_time += seconds_per_beat;
        self.beat_index = (self.beat_index + 1) % beats_per_bar.max(1);
    }
}
