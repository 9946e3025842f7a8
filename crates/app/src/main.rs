use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use metronome_core::config::{MAX_BEATS_PER_BAR, MAX_BPM, MIN_BEATS_PER_BAR, MIN_BPM};
use metronome_core::transport::TICK_INTERVAL_MS;
use metronome_core::{catalog, Metronome, MetronomeError, ProgressSample, TransportConfig};
use tracing_subscriber::EnvFilter;

fn main() -> metronome_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Play {
            bpm,
            beats,
            preset,
            volume,
            duration,
        } => run_play(bpm, beats, preset, volume, duration),
        Commands::Presets { json } => run_presets(json),
    }
}

fn run_play(
    bpm: u32,
    beats: u32,
    preset: String,
    volume: f32,
    duration: f64,
) -> metronome_core::Result<()> {
    let config = TransportConfig {
        bpm,
        beats_per_bar: beats,
        preset,
        volume,
    };
    config.validate()?;

    let metronome = Arc::new(Metronome::new(config)?);
    metronome.start()?;
    tracing::info!(bpm, beats, duration, "metronome running");

    // Low-frequency scheduler cadence. The audio clock, not this thread,
    // defines click timing, so sleep jitter here is harmless.
    let scheduler = {
        let metronome = Arc::clone(&metronome);
        thread::spawn(move || {
            while metronome.is_running() {
                if let Err(err) = metronome.tick() {
                    tracing::warn!(%err, "scheduler tick failed");
                }
                thread::sleep(Duration::from_millis(TICK_INTERVAL_MS));
            }
        })
    };

    // High-frequency display loop on the main thread.
    let mut stdout = std::io::stdout();
    let deadline = Instant::now() + Duration::from_secs_f64(duration.max(0.0));
    while Instant::now() < deadline {
        let sample = metronome.progress()?;
        render_gauge(&mut stdout, &sample, beats)?;
        thread::sleep(Duration::from_millis(16));
    }

    metronome.stop()?;
    let _ = scheduler.join();
    writeln!(stdout)?;
    Ok(())
}

fn render_gauge(
    out: &mut impl Write,
    sample: &ProgressSample,
    beats: u32,
) -> metronome_core::Result<()> {
    const WIDTH: usize = 24;
    let filled = ((sample.bar_fraction * WIDTH as f32).round() as usize).min(WIDTH);
    write!(
        out,
        "\r beat {}/{} [{}{}] {:>3.0}%",
        sample.beat,
        beats,
        "#".repeat(filled),
        "-".repeat(WIDTH - filled),
        sample.bar_fraction * 100.0
    )?;
    out.flush()?;
    Ok(())
}

fn run_presets(json: bool) -> metronome_core::Result<()> {
    if json {
        let rendered = serde_json::to_string_pretty(catalog())
            .map_err(|err| MetronomeError::msg(err.to_string()))?;
        println!("{rendered}");
    } else {
        for preset in catalog() {
            println!("{:<10} {}", preset.key, preset.summary);
        }
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Precision click-track metronome", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play the click track for a while.
    Play {
        /// Tempo in beats per minute.
        #[arg(short, long, default_value_t = 120,
              value_parser = clap::value_parser!(u32).range(MIN_BPM as i64..=MAX_BPM as i64))]
        bpm: u32,
        /// Beats per bar; the first beat of each bar is accented.
        #[arg(short = 'm', long, default_value_t = 4,
              value_parser = clap::value_parser!(u32).range(MIN_BEATS_PER_BAR as i64..=MAX_BEATS_PER_BAR as i64))]
        beats: u32,
        /// Sound preset key (see `presets`).
        #[arg(short, long, default_value = "Soft")]
        preset: String,
        /// Output volume in [0, 1].
        #[arg(short, long, default_value_t = 0.8)]
        volume: f32,
        /// How long to play, in seconds.
        #[arg(short, long, default_value_t = 10.0)]
        duration: f64,
    },
    /// List the available sound presets.
    Presets {
        /// Emit the catalog as JSON.
        #[arg(long)]
        json: bool,
    },
}
