//! Timbre presets for the click synthesizer.
//!
//! The catalog is a fixed, read-only table. Presets are value records with
//! no behaviour of their own; the synthesizer interprets them.

use serde::Serialize;

use crate::{MetronomeError, Result};

/// Oscillator waveform shapes supported by the synthesizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Triangle,
    Square,
    Sawtooth,
}

impl Waveform {
    /// Samples one cycle at a normalized phase in [0, 1).
    pub fn sample(self, phase: f32) -> f32 {
        match self {
            Waveform::Sine => (std::f32::consts::TAU * phase).sin(),
            Waveform::Triangle => 4.0 * ((phase + 0.75).fract() - 0.5).abs() - 1.0,
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Sawtooth => 2.0 * phase - 1.0,
        }
    }
}

/// Immutable timbre description for one click preset.
#[derive(Debug, Clone, Serialize)]
pub struct ClickPreset {
    pub key: &'static str,
    pub label: &'static str,
    pub summary: &'static str,
    pub waveform: Waveform,
    /// Oscillator frequency for regular beats, Hz.
    pub base_freq: f32,
    /// Oscillator frequency for the accented downbeat, Hz.
    pub accent_freq: f32,
    /// Attack time of the amplitude envelope, seconds.
    pub attack: f32,
    /// Decay time measured from click onset, seconds.
    pub decay: f32,
    /// Total click length; the generator stops at onset + duration.
    pub duration: f32,
    /// Envelope peak for regular beats.
    pub gain: f32,
    /// Envelope peak for the accented downbeat.
    pub accent_gain: f32,
    /// Low-pass cutoff inserted between oscillator and envelope, Hz.
    pub lowpass: Option<f32>,
    /// Relative pitch drop: the oscillator starts at `freq * (1 + drop)` and
    /// glides down to `freq`.
    pub pitch_drop: Option<f32>,
    /// Accent-specific pitch-drop override. Only some presets tune the
    /// downbeat glide separately.
    pub accent_pitch_drop: Option<f32>,
}

const CATALOG: [ClickPreset; 6] = [
    ClickPreset {
        key: "Precision",
        label: "Precision",
        summary: "Hard and precise",
        waveform: Waveform::Triangle,
        base_freq: 850.0,
        accent_freq: 1200.0,
        attack: 0.0025,
        decay: 0.035,
        duration: 0.045,
        gain: 0.22,
        accent_gain: 0.28,
        lowpass: Some(3200.0),
        pitch_drop: None,
        accent_pitch_drop: None,
    },
    ClickPreset {
        key: "Soft",
        label: "Soft",
        summary: "Soft and gentle",
        waveform: Waveform::Sine,
        base_freq: 820.0,
        accent_freq: 1100.0,
        attack: 0.003,
        decay: 0.06,
        duration: 0.08,
        gain: 0.22,
        accent_gain: 0.28,
        lowpass: Some(2800.0),
        pitch_drop: Some(0.01),
        accent_pitch_drop: None,
    },
    ClickPreset {
        key: "Flow",
        label: "Flow",
        summary: "Musical, flowing feel",
        waveform: Waveform::Triangle,
        base_freq: 780.0,
        accent_freq: 1040.0,
        attack: 0.004,
        decay: 0.07,
        duration: 0.09,
        gain: 0.2,
        accent_gain: 0.27,
        lowpass: Some(2400.0),
        pitch_drop: Some(0.02),
        accent_pitch_drop: None,
    },
    ClickPreset {
        key: "Groove",
        label: "Groove",
        summary: "Forward momentum",
        waveform: Waveform::Triangle,
        base_freq: 720.0,
        accent_freq: 980.0,
        attack: 0.0035,
        decay: 0.075,
        duration: 0.1,
        gain: 0.21,
        accent_gain: 0.26,
        lowpass: Some(2600.0),
        pitch_drop: Some(0.05),
        accent_pitch_drop: Some(0.035),
    },
    ClickPreset {
        key: "Rhythm",
        label: "Rhythm",
        summary: "Ground and weight, kick-like",
        waveform: Waveform::Triangle,
        base_freq: 520.0,
        accent_freq: 820.0,
        attack: 0.002,
        decay: 0.065,
        duration: 0.085,
        gain: 0.24,
        accent_gain: 0.3,
        lowpass: Some(1800.0),
        pitch_drop: Some(0.065),
        accent_pitch_drop: Some(0.03),
    },
    ClickPreset {
        key: "Orbit",
        label: "Orbit",
        summary: "Immersion and focus",
        waveform: Waveform::Sine,
        base_freq: 660.0,
        accent_freq: 990.0,
        attack: 0.006,
        decay: 0.1,
        duration: 0.12,
        gain: 0.18,
        accent_gain: 0.24,
        lowpass: Some(2200.0),
        pitch_drop: Some(0.03),
        accent_pitch_drop: None,
    },
];

/// Returns the full read-only preset catalog.
pub fn catalog() -> &'static [ClickPreset] {
    &CATALOG
}

/// Looks up a preset by key, case-insensitively.
pub fn find_preset(key: &str) -> Result<&'static ClickPreset> {
    CATALOG
        .iter()
        .find(|preset| preset.key.eq_ignore_ascii_case(key))
        .ok_or_else(|| MetronomeError::UnknownPreset(key.to_string()))
}
