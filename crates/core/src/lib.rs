//! Core library for the metronome application.
//!
//! The crate implements a look-ahead click scheduler: a coarse, jitter-prone
//! periodic tick peeks the audio clock and hands precisely-timestamped clicks
//! to the output device a short horizon ahead, so audible timing never
//! depends on when the tick itself ran. Each module owns a distinct
//! subsystem (configuration, timbre presets, parameter automation, click
//! synthesis, transport bookkeeping, progress estimation, audio output).

pub mod automation;
pub mod config;
pub mod engine;
pub mod error;
pub mod output;
pub mod preset;
pub mod progress;
pub mod synth;
pub mod transport;

pub use automation::{ParamCurve, ParamEvent, RampKind};
pub use config::TransportConfig;
pub use engine::Metronome;
pub use error::{MetronomeError, Result};
pub use output::{AudioOutput, CpalOutput};
pub use preset::{catalog, find_preset, ClickPreset, Waveform};
pub use progress::ProgressSample;
pub use synth::{build_click, ClickSound};
pub use transport::TransportState;
