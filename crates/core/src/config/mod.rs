use serde::{Deserialize, Serialize};

use crate::{preset, MetronomeError, Result};

/// Tempo range exposed by user interfaces. The scheduler itself only
/// requires a positive tempo.
pub const MIN_BPM: u32 = 40;
pub const MAX_BPM: u32 = 240;

/// Valid range for the bar length.
pub const MIN_BEATS_PER_BAR: u32 = 1;
pub const MAX_BEATS_PER_BAR: u32 = 60;

/// Configuration for the transport, produced by the UI collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Tempo in beats per minute.
    pub bpm: u32,
    /// Bar length; the beat index wraps on this modulus.
    pub beats_per_bar: u32,
    /// Key into the timbre preset catalog.
    pub preset: String,
    /// Process-wide output volume multiplier in [0, 1].
    pub volume: f32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bpm: 120,
            beats_per_bar: 4,
            preset: "Soft".to_string(),
            volume: 0.8,
        }
    }
}

impl TransportConfig {
    /// Seconds between consecutive beats at the configured tempo.
    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / f64::from(self.bpm.max(1))
    }

    /// Rejects out-of-range values at the configuration boundary. The core
    /// accepts any positive tempo; only zero is refused here.
    pub fn validate(&self) -> Result<()> {
        if self.bpm == 0 {
            return Err(MetronomeError::InvalidConfiguration(
                "bpm must be positive".to_string(),
            ));
        }
        if !(MIN_BEATS_PER_BAR..=MAX_BEATS_PER_BAR).contains(&self.beats_per_bar) {
            return Err(MetronomeError::InvalidConfiguration(format!(
                "beats per bar must be within [{MIN_BEATS_PER_BAR}, {MAX_BEATS_PER_BAR}], got {}",
                self.beats_per_bar
            )));
        }
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(MetronomeError::InvalidConfiguration(format!(
                "volume must be within [0, 1], got {}",
                self.volume
            )));
        }
        preset::find_preset(&self.preset)?;
        Ok(())
    }
}
