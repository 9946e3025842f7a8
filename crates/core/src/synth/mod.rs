//! Click synthesis.
//!
//! Building a click never touches the device directly: the result is a
//! [`ClickSound`] whose parameter curves are anchored at absolute clock
//! times, so the call may run up to the full schedule-ahead window before
//! the click becomes audible.

use crate::automation::ParamCurve;
use crate::preset::{ClickPreset, Waveform};

/// Floor value for exponential envelope ramps. Exponential automation cannot
/// reach zero, so envelopes start and settle here instead of true silence.
pub const SILENCE_FLOOR: f32 = 0.0001;

/// Minimum pitch-glide length, seconds.
const MIN_GLIDE: f64 = 0.006;

/// A fully described click, ready to be handed to the audio output.
#[derive(Debug, Clone, PartialEq)]
pub struct ClickSound {
    pub waveform: Waveform,
    /// Oscillator frequency over time, Hz.
    pub frequency: ParamCurve,
    /// Amplitude envelope over time.
    pub amplitude: ParamCurve,
    /// Fixed low-pass cutoff between oscillator and envelope, Hz.
    pub lowpass: Option<f32>,
    /// Absolute onset time on the audio clock.
    pub start: f64,
    /// Absolute time the generator stops emitting.
    pub stop: f64,
}

/// Builds the click for one beat at the absolute onset timestamp `time`.
pub fn build_click(time: f64, accent: bool, preset: &ClickPreset) -> ClickSound {
    let freq = if accent {
        preset.accent_freq
    } else {
        preset.base_freq
    };
    let peak = if accent {
        preset.accent_gain
    } else {
        preset.gain
    };

    // The accent-specific glide override wins on the downbeat when present.
    let drop = if accent {
        preset.accent_pitch_drop.or(preset.pitch_drop)
    } else {
        preset.pitch_drop
    };

    let frequency = match drop.filter(|drop| *drop > 0.0) {
        Some(drop) => {
            let glide_end = time + MIN_GLIDE.max(f64::from(preset.attack) * 3.0);
            ParamCurve::new()
                .set_value_at(time, freq * (1.0 + drop))
                .exponential_ramp_to(glide_end, freq)
        }
        None => ParamCurve::new().set_value_at(time, freq),
    };

    let amplitude = ParamCurve::new()
        .set_value_at(time, SILENCE_FLOOR)
        .linear_ramp_to(time + f64::from(preset.attack), peak)
        .exponential_ramp_to(time + f64::from(preset.decay), SILENCE_FLOOR);

    ClickSound {
        waveform: preset.waveform,
        frequency,
        amplitude,
        lowpass: preset.lowpass,
        start: time,
        stop: time + f64::from(preset.duration),
    }
}
