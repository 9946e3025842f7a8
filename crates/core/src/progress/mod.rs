//! Bar-progress estimation for display.
//!
//! Runs at display refresh rate, far more often than the scheduler tick,
//! and interpolates between the last two beat boundaries using the live
//! clock. Purely observational; audio timing never depends on it.

use serde::Serialize;

use crate::transport::TransportState;

/// Guard against a degenerate beat span.
const EPSILON: f64 = 0.0001;

/// Ephemeral display sample, recomputed every frame and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProgressSample {
    /// Position within the bar, 0..1.
    pub bar_fraction: f32,
    /// 1-indexed beat number to display.
    pub beat: u32,
}

impl ProgressSample {
    /// Neutral sample shown while stopped.
    pub fn idle() -> Self {
        Self {
            bar_fraction: 0.0,
            beat: 1,
        }
    }
}

/// Interpolates bar progress from the transport snapshot and the live clock
/// time `now`. Never mutates transport state.
pub fn estimate(state: &TransportState, now: f64, beats_per_bar: u32) -> ProgressSample {
    if !state.running {
        return ProgressSample::idle();
    }
    let meter = beats_per_bar.max(1);
    let span = (state.next_beat_time - state.last_boundary_time).max(EPSILON);
    let within = ((now - state.last_boundary_time) / span).clamp(0.0, 1.0);
    let fraction = (f64::from(state.beat_index) + within) / f64::from(meter);
    ProgressSample {
        bar_fraction: fraction.clamp(0.0, 1.0) as f32,
        beat: state.displayed_beat,
    }
}
