//! Default configuration constants for voicegate.
//!
//! Shared across config types so the same tuning appears in exactly one place.

/// Default capture block size for the command-listening stream, in samples.
///
/// Larger blocks suit streaming recognizers that segment utterances
/// themselves; at typical device rates this is a few hundred milliseconds.
pub const LISTEN_BLOCK_SIZE: u32 = 8000;

/// Default capture block size for utterance recording, in samples.
///
/// Smaller blocks give the silence timer finer granularity.
pub const RECORD_BLOCK_SIZE: u32 = 2048;

/// Default sample rate for utterance recording in Hz.
pub const RECORD_SAMPLE_RATE: u32 = 24_000;

/// Default channel count for capture.
pub const CHANNELS: u16 = 1;

/// Seconds of continuous non-voice before a recording auto-stops.
pub const SILENCE_DURATION_SECS: f32 = 1.0;

/// RMS at or above which a frame asserts voice (unnormalized int16 domain).
pub const VOICE_ON_RMS: f32 = 350.0;

/// RMS at or below which a frame counts as silence.
///
/// Must stay below [`VOICE_ON_RMS`]; the gap is the hysteresis dead zone.
pub const VOICE_OFF_RMS: f32 = 250.0;

/// Calibration margin added to the noise estimate for the on threshold.
pub const MARGIN_ON: f32 = 120.0;

/// Calibration margin added to the noise estimate for the off threshold.
pub const MARGIN_OFF: f32 = 60.0;

/// Maximum duration of the optional noise-calibration phase, in seconds.
pub const CALIB_MAX_SECS: f32 = 1.0;

/// Queue-pop timeout during calibration, in milliseconds.
///
/// Short so the calibration deadline is honored even with a silent mic.
pub const CALIB_POLL_MS: u64 = 200;

/// Bounded retry count for opening the capture device.
pub const OPEN_RETRIES: u32 = 3;

/// Fixed backoff between device-open attempts, in milliseconds.
pub const OPEN_RETRY_DELAY_MS: u64 = 150;

/// Consumer-loop queue-pop timeout in milliseconds.
///
/// The loop wakes at this cadence to re-check running flags and the
/// silence timer even when no frames arrive.
pub const QUEUE_POLL_MS: u64 = 500;

/// Deadline for joining a consumer thread on stop, in milliseconds.
pub const JOIN_TIMEOUT_MS: u64 = 2000;

/// Default output file for recording artifacts.
pub const OUTPUT_FILENAME: &str = "utterance.wav";

/// Default keyword set that starts an utterance recording.
pub const START_COMMANDS: &[&str] = &["шаня", "привет шаня", "шанни", "шань"];

/// Default keyword set that pauses command recognition.
pub const PAUSE_COMMANDS: &[&str] = &["пауза", "замри", "подожди"];

/// Default keyword set that resumes command recognition.
pub const RESUME_COMMANDS: &[&str] = &["продолжи", "продолжить", "возобнови", "продолжай"];

/// Default keyword set that shuts the whole front end down.
pub const STOP_COMMANDS: &[&str] = &["стоп", "останови"];
