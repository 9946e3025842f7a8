//! Audio output capability.
//!
//! The scheduler needs exactly three things from the device: a monotonic
//! clock, acceptance of precisely-timestamped click requests, and a shared
//! ramped master gain. [`AudioOutput`] captures that contract so the engine
//! can be tested against a recording double; [`CpalOutput`] backs it with a
//! real cpal stream whose clock is derived from the rendered-frame counter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::synth::ClickSound;
use crate::{MetronomeError, Result};

/// Length of the master volume ramp, seconds. A stepped gain change would
/// itself be audible as a click.
pub const VOLUME_RAMP: f32 = 0.03;

/// Contract the scheduler and synthesizer program against.
pub trait AudioOutput: Send + Sync {
    /// Monotonic clock all click timestamps refer to, seconds.
    fn current_time(&self) -> f64;

    /// Asks a suspended device to resume. Idempotent; the engine calls this
    /// on every acquisition attempt.
    fn resume(&self) -> Result<()>;

    /// Accepts one click at its absolute onset time. The call may arrive up
    /// to the full schedule-ahead window early.
    fn schedule_click(&self, click: ClickSound) -> Result<()>;

    /// Ramps the shared output gain to `volume`, clamped to [0, 1].
    fn set_master_volume(&self, volume: f32);

    /// The volume the master gain is currently targeting.
    fn master_volume(&self) -> f32;
}

/// Master gain with per-sample linear ramping.
#[derive(Debug, Clone)]
pub(crate) struct MasterGain {
    current: f32,
    target: f32,
    step: f32,
}

impl MasterGain {
    pub(crate) fn new(volume: f32) -> Self {
        let volume = volume.clamp(0.0, 1.0);
        Self {
            current: volume,
            target: volume,
            step: 0.0,
        }
    }

    /// Starts a linear ramp from the current value to `volume`.
    pub(crate) fn ramp_to(&mut self, volume: f32, ramp_seconds: f32, sample_rate: f32) {
        self.target = volume.clamp(0.0, 1.0);
        let samples = (ramp_seconds * sample_rate).max(1.0);
        self.step = (self.target - self.current) / samples;
    }

    pub(crate) fn target(&self) -> f32 {
        self.target
    }

    /// Advances one sample and returns the gain to apply.
    pub(crate) fn next(&mut self) -> f32 {
        if self.step != 0.0 {
            self.current += self.step;
            let done = (self.step > 0.0 && self.current >= self.target)
                || (self.step < 0.0 && self.current <= self.target);
            if done {
                self.current = self.target;
                self.step = 0.0;
            }
        }
        self.current
    }
}

/// One in-flight click being rendered by the device callback. Created per
/// click and dropped after its stop time; never pooled or reused.
struct Voice {
    sound: ClickSound,
    phase: f64,
    filter_state: f32,
    filter_coeff: Option<f32>,
}

impl Voice {
    fn new(sound: ClickSound, sample_rate: f32) -> Self {
        // One-pole low-pass coefficient for the preset cutoff.
        let filter_coeff = sound
            .lowpass
            .map(|cutoff| 1.0 - (-std::f32::consts::TAU * cutoff / sample_rate).exp());
        Self {
            sound,
            phase: 0.0,
            filter_state: 0.0,
            filter_coeff,
        }
    }

    fn finished(&self, time: f64) -> bool {
        time >= self.sound.stop
    }

    /// Renders one mono sample at absolute clock time `time`.
    fn render(&mut self, time: f64, sample_rate: f64) -> f32 {
        if time < self.sound.start || time >= self.sound.stop {
            return 0.0;
        }
        let freq = f64::from(self.sound.frequency.value_at(time));
        self.phase = (self.phase + freq / sample_rate).fract();
        let raw = self.sound.waveform.sample(self.phase as f32);
        let shaped = match self.filter_coeff {
            Some(coeff) => {
                self.filter_state += coeff * (raw - self.filter_state);
                self.filter_state
            }
            None => raw,
        };
        shaped * self.sound.amplitude.value_at(time)
    }
}

struct RenderState {
    voices: Vec<Voice>,
    master: MasterGain,
}

enum Control {
    Resume,
    Shutdown,
}

/// Real audio device backed by the default cpal output stream.
///
/// `cpal::Stream` is not `Send`, so the stream lives on a dedicated thread;
/// this handle only keeps the shared render state, the frame counter the
/// clock is derived from, and a control channel to the stream thread.
pub struct CpalOutput {
    sample_rate: f64,
    frames: Arc<AtomicU64>,
    state: Arc<Mutex<RenderState>>,
    control: mpsc::Sender<Control>,
}

impl CpalOutput {
    /// Opens the default output device and starts the stream. Any failure
    /// along the way is reported as `CapabilityUnavailable`.
    pub fn try_new(initial_volume: f32) -> Result<Self> {
        let (ready_tx, ready_rx) = mpsc::channel();
        let (control_tx, control_rx) = mpsc::channel::<Control>();

        // The thread is intentionally detached; it exits when the control
        // channel closes on drop.
        let _ = thread::Builder::new()
            .name("metronome-audio".to_string())
            .spawn(move || match open_stream(initial_volume) {
                Ok((stream, sample_rate, frames, state)) => {
                    let _ = ready_tx.send(Ok((sample_rate, frames, state)));
                    while let Ok(message) = control_rx.recv() {
                        match message {
                            Control::Resume => {
                                if let Err(err) = stream.play() {
                                    tracing::warn!(%err, "stream resume failed");
                                }
                            }
                            Control::Shutdown => break,
                        }
                    }
                    drop(stream);
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                }
            })
            .map_err(|err| MetronomeError::CapabilityUnavailable(err.to_string()))?;

        let (sample_rate, frames, state) = ready_rx
            .recv()
            .map_err(|_| {
                MetronomeError::CapabilityUnavailable(
                    "audio thread exited during setup".to_string(),
                )
            })??;

        Ok(Self {
            sample_rate,
            frames,
            state,
            control: control_tx,
        })
    }
}

impl AudioOutput for CpalOutput {
    fn current_time(&self) -> f64 {
        self.frames.load(Ordering::Relaxed) as f64 / self.sample_rate
    }

    fn resume(&self) -> Result<()> {
        self.control.send(Control::Resume).map_err(|_| {
            MetronomeError::CapabilityUnavailable("audio thread is gone".to_string())
        })
    }

    fn schedule_click(&self, click: ClickSound) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| MetronomeError::msg("render state has been poisoned"))?;
        state.voices.push(Voice::new(click, self.sample_rate as f32));
        Ok(())
    }

    fn set_master_volume(&self, volume: f32) {
        if let Ok(mut state) = self.state.lock() {
            let sample_rate = self.sample_rate as f32;
            state.master.ramp_to(volume, VOLUME_RAMP, sample_rate);
        }
    }

    fn master_volume(&self) -> f32 {
        self.state.lock().map(|state| state.master.target()).unwrap_or(0.0)
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        let _ = self.control.send(Control::Shutdown);
    }
}

type StreamParts = (cpal::Stream, f64, Arc<AtomicU64>, Arc<Mutex<RenderState>>);

fn open_stream(initial_volume: f32) -> Result<StreamParts> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or_else(|| {
        MetronomeError::CapabilityUnavailable("no default output device".to_string())
    })?;
    let supported = device
        .default_output_config()
        .map_err(|err| MetronomeError::CapabilityUnavailable(err.to_string()))?;
    if supported.sample_format() != cpal::SampleFormat::F32 {
        return Err(MetronomeError::CapabilityUnavailable(format!(
            "unsupported sample format {:?}",
            supported.sample_format()
        )));
    }

    let config: cpal::StreamConfig = supported.into();
    let sample_rate = f64::from(config.sample_rate);
    let channels = (config.channels as usize).max(1);
    let frames = Arc::new(AtomicU64::new(0));
    let state = Arc::new(Mutex::new(RenderState {
        voices: Vec::new(),
        master: MasterGain::new(initial_volume),
    }));

    let callback_frames = Arc::clone(&frames);
    let callback_state = Arc::clone(&state);
    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                render_block(data, channels, sample_rate, &callback_frames, &callback_state);
            },
            |err| tracing::warn!(%err, "output stream error"),
            None,
        )
        .map_err(|err| MetronomeError::CapabilityUnavailable(err.to_string()))?;
    stream
        .play()
        .map_err(|err| MetronomeError::CapabilityUnavailable(err.to_string()))?;

    tracing::debug!(sample_rate, channels, "output stream opened");
    Ok((stream, sample_rate, frames, state))
}

fn render_block(
    data: &mut [f32],
    channels: usize,
    sample_rate: f64,
    frames: &AtomicU64,
    state: &Mutex<RenderState>,
) {
    let Ok(mut state) = state.lock() else {
        data.fill(0.0);
        return;
    };
    let RenderState { voices, master } = &mut *state;

    let start = frames.load(Ordering::Relaxed);
    let mut rendered = 0u64;
    for frame in data.chunks_mut(channels) {
        let time = (start + rendered) as f64 / sample_rate;
        let mut mix = 0.0f32;
        for voice in voices.iter_mut() {
            mix += voice.render(time, sample_rate);
        }
        let sample = mix * master.next();
        for out in frame.iter_mut() {
            *out = sample;
        }
        rendered += 1;
    }
    frames.store(start + rendered, Ordering::Relaxed);

    let now = (start + rendered) as f64 / sample_rate;
    voices.retain(|voice| !voice.finished(now));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preset::find_preset;
    use crate::synth::build_click;

    const SAMPLE_RATE: f64 = 48_000.0;

    #[test]
    fn master_gain_ramps_without_jumping() {
        let mut master = MasterGain::new(0.8);
        master.ramp_to(0.3, VOLUME_RAMP, SAMPLE_RATE as f32);

        let first = master.next();
        assert!((first - 0.8).abs() < 1e-3, "no discontinuous jump");

        let ramp_samples = (VOLUME_RAMP * SAMPLE_RATE as f32) as usize;
        let mut last = first;
        for _ in 0..ramp_samples {
            let gain = master.next();
            assert!(gain <= last + 1e-6, "downward ramp must be monotone");
            last = gain;
        }
        assert!((last - 0.3).abs() < 1e-4);
        // Stays pinned at the target afterwards.
        assert!((master.next() - 0.3).abs() < 1e-6);
    }

    #[test]
    fn master_gain_clamps_the_target() {
        let mut master = MasterGain::new(0.5);
        master.ramp_to(1.7, VOLUME_RAMP, SAMPLE_RATE as f32);
        assert_eq!(master.target(), 1.0);
    }

    #[test]
    fn voice_is_silent_outside_its_window() {
        let preset = find_preset("Soft").unwrap();
        let click = build_click(1.0, false, preset);
        let stop = click.stop;
        let mut voice = Voice::new(click, SAMPLE_RATE as f32);

        assert_eq!(voice.render(0.5, SAMPLE_RATE), 0.0);
        assert_eq!(voice.render(stop, SAMPLE_RATE), 0.0);
        assert!(voice.finished(stop));
        assert!(!voice.finished(stop - 0.01));
    }

    #[test]
    fn voice_produces_audio_during_the_click() {
        let preset = find_preset("Precision").unwrap();
        let click = build_click(0.0, true, preset);
        let mut voice = Voice::new(click, SAMPLE_RATE as f32);

        let mut energy = 0.0f32;
        let samples = (0.04 * SAMPLE_RATE) as usize;
        for index in 0..samples {
            let time = index as f64 / SAMPLE_RATE;
            let sample = voice.render(time, SAMPLE_RATE);
            energy += sample * sample;
        }
        assert!(energy > 0.0, "click must be audible inside its window");
    }

    #[test]
    fn filtered_presets_get_a_filter_coefficient() {
        let filtered = build_click(0.0, false, find_preset("Rhythm").unwrap());
        let voice = Voice::new(filtered, SAMPLE_RATE as f32);
        let coeff = voice.filter_coeff.expect("Rhythm has a low-pass");
        assert!(coeff > 0.0 && coeff < 1.0);
    }

    #[test]
    fn render_block_advances_the_frame_clock() {
        let frames = AtomicU64::new(0);
        let state = Mutex::new(RenderState {
            voices: Vec::new(),
            master: MasterGain::new(1.0),
        });
        let mut data = vec![0.0f32; 256];
        render_block(&mut data, 2, SAMPLE_RATE, &frames, &state);
        assert_eq!(frames.load(Ordering::Relaxed), 128);
        render_block(&mut data, 2, SAMPLE_RATE, &frames, &state);
        assert_eq!(frames.load(Ordering::Relaxed), 256);
    }

    #[test]
    fn render_block_disposes_finished_voices() {
        let preset = find_preset("Precision").unwrap();
        let click = build_click(0.0, false, preset);
        let state = Mutex::new(RenderState {
            voices: vec![Voice::new(click, SAMPLE_RATE as f32)],
            master: MasterGain::new(1.0),
        });
        let frames = AtomicU64::new(0);

        // Render well past the 45 ms click.
        let mut data = vec![0.0f32; 4096];
        let blocks = (0.1 * SAMPLE_RATE) as usize / 2048 + 1;
        for _ in 0..blocks {
            render_block(&mut data, 2, SAMPLE_RATE, &frames, &state);
        }
        assert!(state.lock().unwrap().voices.is_empty());
    }
}
