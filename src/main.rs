use anyhow::Result;
use clap::{Parser, Subcommand};
use crossbeam_channel::unbounded;
use std::path::PathBuf;
use std::time::Duration;
use voicegate::audio::capture::{CpalBackend, list_input_devices};
use voicegate::audio::vad::{Clock, SystemClock, VoiceActivityGate};
use voicegate::audio::{CaptureBackend, FrameQueue};
use voicegate::config::Config;
use voicegate::session::DeviceLock;
use voicegate::session::recorder::SilenceGatedRecorder;

#[derive(Parser)]
#[command(name = "voicegate", version, about = "Voice capture front end core")]
struct Cli {
    /// Path to a config file (default: ~/.config/voicegate/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List audio input devices
    Devices {
        /// Print the device list as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record one silence-gated utterance to a WAV file
    Record {
        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Input device index (overrides config)
        #[arg(short, long)]
        device: Option<usize>,
        /// Calibrate thresholds from ambient noise before recording
        #[arg(long)]
        calibrate: bool,
    },
    /// Measure ambient noise and print calibrated thresholds
    Calibrate {
        /// How long to sample ambient noise, in seconds
        #[arg(long, default_value_t = 2.0)]
        seconds: f32,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Devices { json } => list_audio_devices(json)?,
        Commands::Record {
            output,
            device,
            calibrate,
        } => run_record(config, output, device, calibrate)?,
        Commands::Calibrate { seconds } => run_calibrate(config, seconds)?,
    }

    Ok(())
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/voicegate/config.toml)
/// 3. Built-in defaults with environment variable overrides
fn load_config(custom_path: Option<&std::path::Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path)?
    } else {
        Config::load_or_default(&Config::default_path())?
    };
    Ok(config.with_env_overrides())
}

/// List available audio input devices.
fn list_audio_devices(json: bool) -> Result<()> {
    let devices = list_input_devices()?;

    if devices.is_empty() {
        eprintln!("No audio input devices found");
        std::process::exit(1);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
    } else {
        println!("Available audio input devices:");
        for (idx, device) in devices.iter().enumerate() {
            println!("  [{}] {}", idx, device);
        }
    }

    Ok(())
}

/// Record a single utterance, stopping on silence.
fn run_record(
    mut config: Config,
    output: Option<PathBuf>,
    device: Option<usize>,
    calibrate: bool,
) -> Result<()> {
    if let Some(index) = device {
        config.audio.device_index = Some(index);
    }
    if let Some(path) = output {
        config.recording.output = Some(path);
    }
    if config.recording.output.is_none() {
        config.recording.output = Some(PathBuf::from(voicegate::defaults::OUTPUT_FILENAME));
    }
    if calibrate {
        config.recording.auto_calibrate = true;
    }

    let recorder_config = config.recorder_config()?;
    let out_path = recorder_config.output.clone();
    let backend = CpalBackend::new(config.recording_capture());
    let (done_tx, done_rx) = unbounded();
    let mut recorder = SilenceGatedRecorder::new(
        Box::new(backend),
        recorder_config,
        done_tx,
        DeviceLock::default(),
    );

    println!("Recording... speak now (stops after silence)");
    recorder.begin()?;

    match done_rx.recv() {
        Ok(artifact) => {
            println!(
                "Recorded {:.2}s ({} bytes)",
                artifact.duration().as_secs_f64(),
                artifact.byte_len()
            );
            if let Some(path) = out_path {
                println!("Saved to {}", path.display());
            }
        }
        Err(_) => {
            eprintln!("No audio captured");
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Sample ambient noise and print the calibrated threshold pair.
fn run_calibrate(config: Config, seconds: f32) -> Result<()> {
    let mut backend = CpalBackend::new(config.recording_capture());
    let queue = FrameQueue::new();
    backend.open(queue.clone())?;

    println!("Measuring ambient noise for {:.1}s, stay quiet...", seconds);

    let clock = SystemClock;
    let deadline = clock.now() + Duration::from_secs_f32(seconds);
    let mut gate = VoiceActivityGate::default()
        .with_margins(config.recording.margin_on, config.recording.margin_off);
    let noise = gate.calibrate(&queue, deadline, &clock, || true);
    backend.close();

    match noise {
        Some(noise) => {
            let thresholds = gate.thresholds();
            println!("Noise floor (median RMS): {:.1}", noise);
            println!("Suggested config:");
            println!();
            println!("[recording]");
            println!("voice_on_rms = {:.1}", thresholds.voice_on_rms());
            println!("voice_off_rms = {:.1}", thresholds.voice_off_rms());
        }
        None => {
            eprintln!("No audio frames arrived; check the input device");
            std::process::exit(1);
        }
    }

    Ok(())
}
