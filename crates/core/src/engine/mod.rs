//! Metronome façade.
//!
//! Ties the look-ahead scheduler, the click synthesizer and the output
//! capability together behind a small thread-safe API. The scheduler tick
//! and the progress estimator are driven externally at their own cadences;
//! they interleave on the shared transport state, which is only mutated
//! here, whole-fields-at-a-time.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::TransportConfig;
use crate::output::{AudioOutput, CpalOutput};
use crate::progress::{self, ProgressSample};
use crate::transport::{TransportState, SCHEDULE_AHEAD};
use crate::{config, preset, synth, MetronomeError, Result};

/// The metronome engine. At most one transport is active per instance.
pub struct Metronome {
    config: Mutex<TransportConfig>,
    transport: Mutex<TransportState>,
    output: Mutex<Option<Arc<dyn AudioOutput>>>,
    /// Whether a missing output should be (re)acquired from the platform.
    auto_acquire: bool,
}

impl Metronome {
    /// Creates a metronome that lazily acquires the platform audio device on
    /// start and on every tick until acquisition succeeds.
    pub fn new(config: TransportConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Mutex::new(config),
            transport: Mutex::new(TransportState::default()),
            output: Mutex::new(None),
            auto_acquire: true,
        })
    }

    /// Creates a metronome bound to an explicit output capability.
    pub fn with_output(config: TransportConfig, output: Arc<dyn AudioOutput>) -> Result<Self> {
        config.validate()?;
        output.set_master_volume(config.volume);
        Ok(Self {
            config: Mutex::new(config),
            transport: Mutex::new(TransportState::default()),
            output: Mutex::new(Some(output)),
            auto_acquire: false,
        })
    }

    /// True when an audio capability has been acquired. Exposed so callers
    /// can show a diagnostic instead of failing silently.
    pub fn audio_available(&self) -> bool {
        self.output
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    pub fn is_running(&self) -> bool {
        self.transport
            .lock()
            .map(|transport| transport.running)
            .unwrap_or(false)
    }

    /// A snapshot of the current configuration.
    pub fn config(&self) -> Result<TransportConfig> {
        Ok(self.lock_config()?.clone())
    }

    /// Start transition. Fails with `CapabilityUnavailable` when no audio
    /// device can be acquired rather than starting a silent transport.
    pub fn start(&self) -> Result<()> {
        let output = self.acquire_output().ok_or_else(|| {
            MetronomeError::CapabilityUnavailable("no audio output".to_string())
        })?;
        let now = output.current_time();
        let mut transport = self.lock_transport()?;
        transport.start_at(now);
        tracing::info!(first_beat = transport.next_beat_time, "transport started");
        Ok(())
    }

    /// Stop transition. Clicks already handed to the device (at most one
    /// schedule-ahead window) are left to fire.
    pub fn stop(&self) -> Result<()> {
        let mut transport = self.lock_transport()?;
        transport.stop();
        tracing::info!("transport stopped");
        Ok(())
    }

    /// One scheduler tick: schedules every beat whose target time falls
    /// inside the look-ahead window. The loop is bounded because each
    /// iteration moves the target one beat duration forward. A tick without
    /// an acquirable capability is a no-op that leaves transport state
    /// untouched; an error in one tick never unschedules future ticks.
    pub fn tick(&self) -> Result<()> {
        let Some(output) = self.acquire_output() else {
            return Ok(());
        };
        let (seconds_per_beat, beats_per_bar, preset) = {
            let config = self.lock_config()?;
            (
                config.seconds_per_beat(),
                config.beats_per_bar,
                preset::find_preset(&config.preset)?,
            )
        };

        let now = output.current_time();
        let mut transport = self.lock_transport()?;
        if !transport.running {
            return Ok(());
        }
        while transport.next_beat_time < now + SCHEDULE_AHEAD {
            let accent = transport.beat_index == 0;
            let click = synth::build_click(transport.next_beat_time, accent, preset);
            output.schedule_click(click)?;
            transport.displayed_beat = transport.beat_index + 1;
            tracing::trace!(
                beat = transport.displayed_beat,
                time = transport.next_beat_time,
                accent,
                "click scheduled"
            );
            transport.advance(seconds_per_beat, beats_per_bar);
        }
        Ok(())
    }

    /// Samples the display state against the live clock. Purely
    /// observational; returns the neutral sample while stopped or while the
    /// capability is unavailable.
    pub fn progress(&self) -> Result<ProgressSample> {
        let output = {
            let slot = self
                .output
                .lock()
                .map_err(|_| MetronomeError::msg("output slot has been poisoned"))?;
            slot.clone()
        };
        let beats_per_bar = self.lock_config()?.beats_per_bar;
        let transport = self.lock_transport()?;
        match output {
            Some(output) if transport.running => {
                Ok(progress::estimate(&transport, output.current_time(), beats_per_bar))
            }
            _ => Ok(ProgressSample::idle()),
        }
    }

    /// Updates the tempo. Clicks already inside the look-ahead window keep
    /// their timestamps; the next advancement uses the new interval.
    pub fn set_tempo(&self, bpm: u32) -> Result<()> {
        if bpm == 0 {
            return Err(MetronomeError::InvalidConfiguration(
                "bpm must be positive".to_string(),
            ));
        }
        self.lock_config()?.bpm = bpm;
        tracing::debug!(bpm, "tempo changed");
        Ok(())
    }

    /// Updates the bar length. The beat index wraps on the new modulus at
    /// the next beat boundary.
    pub fn set_meter(&self, beats_per_bar: u32) -> Result<()> {
        if !(config::MIN_BEATS_PER_BAR..=config::MAX_BEATS_PER_BAR).contains(&beats_per_bar) {
            return Err(MetronomeError::InvalidConfiguration(format!(
                "beats per bar must be within [{}, {}], got {beats_per_bar}",
                config::MIN_BEATS_PER_BAR,
                config::MAX_BEATS_PER_BAR
            )));
        }
        self.lock_config()?.beats_per_bar = beats_per_bar;
        tracing::debug!(beats_per_bar, "meter changed");
        Ok(())
    }

    /// Switches the timbre preset; takes effect from the next unscheduled
    /// click.
    pub fn set_preset(&self, key: &str) -> Result<()> {
        let preset = preset::find_preset(key)?;
        self.lock_config()?.preset = preset.key.to_string();
        tracing::debug!(preset = preset.key, "preset changed");
        Ok(())
    }

    /// Sets the shared output volume; the device ramps to it instead of
    /// stepping.
    pub fn set_volume(&self, volume: f32) -> Result<()> {
        let volume = volume.clamp(0.0, 1.0);
        self.lock_config()?.volume = volume;
        if let Ok(slot) = self.output.lock() {
            if let Some(output) = slot.as_ref() {
                output.set_master_volume(volume);
            }
        }
        Ok(())
    }

    /// Acquires the output capability: create-if-absent, then an idempotent
    /// resume request on every attempt.
    fn acquire_output(&self) -> Option<Arc<dyn AudioOutput>> {
        let mut slot = self.output.lock().ok()?;
        if slot.is_none() && self.auto_acquire {
            let volume = self.lock_config().map(|config| config.volume).unwrap_or(1.0);
            match CpalOutput::try_new(volume) {
                Ok(output) => {
                    tracing::info!("audio output acquired");
                    *slot = Some(Arc::new(output));
                }
                Err(err) => tracing::debug!(%err, "audio output unavailable"),
            }
        }
        if let Some(output) = slot.as_ref() {
            if let Err(err) = output.resume() {
                tracing::warn!(%err, "resume request failed");
            }
        }
        slot.clone()
    }

    fn lock_config(&self) -> Result<MutexGuard<'_, TransportConfig>> {
        self.config
            .lock()
            .map_err(|_| MetronomeError::msg("configuration has been poisoned"))
    }

    fn lock_transport(&self) -> Result<MutexGuard<'_, TransportState>> {
        self.transport
            .lock()
            .map_err(|_| MetronomeError::msg("transport state has been poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::synth::ClickSound;
    use crate::transport::START_OFFSET;

    /// Recording double for the audio capability with a scripted clock.
    struct MockOutput {
        clock: Mutex<f64>,
        scheduled: Mutex<Vec<ClickSound>>,
        volume: Mutex<f32>,
        resume_calls: AtomicU32,
    }

    impl MockOutput {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                clock: Mutex::new(0.0),
                scheduled: Mutex::new(Vec::new()),
                volume: Mutex::new(1.0),
                resume_calls: AtomicU32::new(0),
            })
        }

        fn set_clock(&self, time: f64) {
            *self.clock.lock().unwrap() = time;
        }

        fn scheduled(&self) -> Vec<ClickSound> {
            self.scheduled.lock().unwrap().clone()
        }
    }

    impl AudioOutput for MockOutput {
        fn current_time(&self) -> f64 {
            *self.clock.lock().unwrap()
        }

        fn resume(&self) -> Result<()> {
            self.resume_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn schedule_click(&self, click: ClickSound) -> Result<()> {
            self.scheduled.lock().unwrap().push(click);
            Ok(())
        }

        fn set_master_volume(&self, volume: f32) {
            *self.volume.lock().unwrap() = volume.clamp(0.0, 1.0);
        }

        fn master_volume(&self) -> f32 {
            *self.volume.lock().unwrap()
        }
    }

    fn metronome_with_mock(config: TransportConfig) -> (Metronome, Arc<MockOutput>) {
        let mock = MockOutput::new();
        let metronome = Metronome::with_output(config, mock.clone()).unwrap();
        (metronome, mock)
    }

    /// A metronome whose capability never becomes available.
    fn detached_metronome() -> Metronome {
        Metronome {
            config: Mutex::new(TransportConfig::default()),
            transport: Mutex::new(TransportState::default()),
            output: Mutex::new(None),
            auto_acquire: false,
        }
    }

    /// Drives the scheduler the way the timer thread would: 25 ms steps of
    /// the scripted clock with a tick after each step.
    fn run_for(metronome: &Metronome, mock: &MockOutput, seconds: f64) {
        let steps = (seconds / 0.025).ceil() as usize;
        for step in 0..=steps {
            mock.set_clock(step as f64 * 0.025);
            metronome.tick().unwrap();
        }
    }

    #[test]
    fn scenario_clicks_land_on_the_beat_grid() {
        let (metronome, mock) = metronome_with_mock(TransportConfig::default());
        metronome.start().unwrap();
        run_for(&metronome, &mock, 2.0);

        let clicks = mock.scheduled();
        assert!(clicks.len() >= 4);
        for (index, click) in clicks.iter().enumerate() {
            let expected = START_OFFSET + 0.5 * index as f64;
            assert!(
                (click.start - expected).abs() < 1e-9,
                "click {index} at {} expected {expected}",
                click.start
            );
        }
    }

    #[test]
    fn accent_falls_on_the_downbeat() {
        let (metronome, mock) = metronome_with_mock(TransportConfig::default());
        metronome.start().unwrap();
        run_for(&metronome, &mock, 4.0);

        let preset = preset::find_preset("Soft").unwrap();
        for (index, click) in mock.scheduled().iter().enumerate() {
            let freq = click.frequency.events().last().unwrap().value;
            if index % 4 == 0 {
                assert!((freq - preset.accent_freq).abs() < 1e-3, "beat {index}");
            } else {
                assert!((freq - preset.base_freq).abs() < 1e-3, "beat {index}");
            }
        }
    }

    #[test]
    fn meter_of_one_accents_every_beat() {
        let config = TransportConfig {
            beats_per_bar: 1,
            ..TransportConfig::default()
        };
        let (metronome, mock) = metronome_with_mock(config);
        metronome.start().unwrap();
        run_for(&metronome, &mock, 2.0);

        let preset = preset::find_preset("Soft").unwrap();
        let clicks = mock.scheduled();
        assert!(!clicks.is_empty());
        for click in &clicks {
            let freq = click.frequency.events().last().unwrap().value;
            assert!((freq - preset.accent_freq).abs() < 1e-3);
        }
    }

    #[test]
    fn lookahead_is_bounded_per_tick() {
        // 3000 BPM puts a beat every 20 ms; one tick at clock zero may only
        // fill the 100 ms window.
        let config = TransportConfig {
            bpm: 3000,
            ..TransportConfig::default()
        };
        let (metronome, mock) = metronome_with_mock(config);
        metronome.start().unwrap();
        metronome.tick().unwrap();

        let clicks = mock.scheduled();
        assert_eq!(clicks.len(), 3);
        for click in &clicks {
            assert!(click.start < SCHEDULE_AHEAD);
        }
    }

    #[test]
    fn tempo_change_spares_scheduled_clicks() {
        let (metronome, mock) = metronome_with_mock(TransportConfig::default());
        metronome.start().unwrap();
        metronome.tick().unwrap();

        // Beat 0 scheduled at 0.05 and the next target is 0.55 already.
        metronome.set_tempo(60).unwrap();
        run_for(&metronome, &mock, 2.0);

        let starts: Vec<f64> = mock.scheduled().iter().map(|c| c.start).collect();
        assert!((starts[0] - 0.05).abs() < 1e-9);
        assert!((starts[1] - 0.55).abs() < 1e-9, "pre-change interval kept");
        assert!((starts[2] - 1.55).abs() < 1e-9, "new interval from there on");
    }

    #[test]
    fn meter_change_applies_at_the_next_boundary() {
        let (metronome, mock) = metronome_with_mock(TransportConfig::default());
        metronome.start().unwrap();
        run_for(&metronome, &mock, 0.8);
        metronome.set_meter(3).unwrap();
        run_for(&metronome, &mock, 3.0);

        // Once the new modulus is in effect accents repeat every 3 beats.
        let preset = preset::find_preset("Soft").unwrap();
        let clicks = mock.scheduled();
        let accents: Vec<usize> = clicks
            .iter()
            .enumerate()
            .filter(|(_, click)| {
                let freq = click.frequency.events().last().unwrap().value;
                (freq - preset.accent_freq).abs() < 1e-3
            })
            .map(|(index, _)| index)
            .collect();
        let late: Vec<usize> = accents.iter().copied().filter(|i| *i >= 2).collect();
        assert!(late.len() >= 2, "need accents after the meter change");
        for pair in late.windows(2) {
            assert_eq!(pair[1] - pair[0], 3);
        }
    }

    #[test]
    fn stop_resets_display_and_schedules_nothing_more() {
        let (metronome, mock) = metronome_with_mock(TransportConfig::default());
        metronome.start().unwrap();
        run_for(&metronome, &mock, 1.0);
        let scheduled_before = mock.scheduled().len();

        metronome.stop().unwrap();
        assert!(!metronome.is_running());
        assert_eq!(metronome.progress().unwrap(), ProgressSample::idle());

        run_for(&metronome, &mock, 2.0);
        assert_eq!(mock.scheduled().len(), scheduled_before);
    }

    #[test]
    fn preset_switch_applies_to_the_next_unscheduled_click() {
        let (metronome, mock) = metronome_with_mock(TransportConfig::default());
        metronome.start().unwrap();
        metronome.tick().unwrap();

        metronome.set_preset("Rhythm").unwrap();
        mock.set_clock(0.5);
        metronome.tick().unwrap();

        let clicks = mock.scheduled();
        let rhythm = preset::find_preset("Rhythm").unwrap();
        let last = clicks.last().unwrap();
        assert_eq!(last.lowpass, rhythm.lowpass);
        let freq = last.frequency.events().last().unwrap().value;
        assert!((freq - rhythm.base_freq).abs() < 1e-3);
    }

    #[test]
    fn volume_is_forwarded_and_clamped() {
        let (metronome, mock) = metronome_with_mock(TransportConfig::default());
        metronome.set_volume(0.3).unwrap();
        assert!((mock.master_volume() - 0.3).abs() < 1e-6);
        metronome.set_volume(2.0).unwrap();
        assert!((mock.master_volume() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn unavailable_capability_makes_ticks_no_ops() {
        let metronome = detached_metronome();
        assert!(!metronome.audio_available());
        assert!(matches!(
            metronome.start(),
            Err(MetronomeError::CapabilityUnavailable(_))
        ));

        let before = metronome.transport.lock().unwrap().clone();
        metronome.tick().unwrap();
        assert_eq!(*metronome.transport.lock().unwrap(), before);
        assert_eq!(metronome.progress().unwrap(), ProgressSample::idle());
    }

    #[test]
    fn acquisition_requests_resume_every_tick() {
        let (metronome, mock) = metronome_with_mock(TransportConfig::default());
        metronome.start().unwrap();
        let after_start = mock.resume_calls.load(Ordering::SeqCst);
        metronome.tick().unwrap();
        metronome.tick().unwrap();
        assert_eq!(mock.resume_calls.load(Ordering::SeqCst), after_start + 2);
    }

    #[test]
    fn progress_advances_between_boundaries() {
        let (metronome, mock) = metronome_with_mock(TransportConfig::default());
        metronome.start().unwrap();
        metronome.tick().unwrap();

        mock.set_clock(0.05 + 0.1);
        let early = metronome.progress().unwrap();
        mock.set_clock(0.05 + 0.4);
        let late = metronome.progress().unwrap();
        assert!(late.bar_fraction > early.bar_fraction);
        assert!((0.0..=1.0).contains(&late.bar_fraction));
        assert_eq!(early.beat, 1);
    }
}
