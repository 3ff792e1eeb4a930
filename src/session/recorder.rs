//! Silence-gated utterance recording.
//!
//! The recorder appends every received frame to the artifact, then
//! classifies the frame's energy to drive the silence timer. Recording
//! ends after a configured span of continuous non-voice; the trailing
//! silence stays in the artifact. The timer is also checked when the queue
//! poll times out, so recording terminates even when the device goes quiet
//! enough that no frames arrive.

use crate::audio::capture::CaptureBackend;
use crate::audio::queue::{AudioFrame, FrameQueue};
use crate::audio::vad::{Clock, FrameLevel, SystemClock, VadThresholds, VoiceActivityGate, rms_i16};
use crate::audio::wav;
use crate::defaults;
use crate::error::Result;
use crate::session::{DeviceLock, join_with_deadline};
use crossbeam_channel::Sender;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// A finished utterance recording.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingArtifact {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl RecordingArtifact {
    /// Payload size in bytes (little-endian interleaved s16).
    pub fn byte_len(&self) -> usize {
        self.samples.len() * 2
    }

    /// Exact duration derived from the payload size:
    /// `bytes / (channels * 2 * sample_rate)` seconds.
    pub fn duration(&self) -> Duration {
        let denom = self.channels as f64 * 2.0 * self.sample_rate as f64;
        Duration::from_secs_f64(self.byte_len() as f64 / denom)
    }

    /// Persists the artifact as a WAV file.
    pub fn write_wav(&self, path: &std::path::Path) -> Result<()> {
        wav::write_wav(path, &self.samples, self.sample_rate, self.channels)
    }
}

/// Tuning for a recording session.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Continuous non-voice span after which recording stops.
    pub silence_duration: Duration,
    pub thresholds: VadThresholds,
    /// Calibrate thresholds from ambient noise before recording.
    pub auto_calibrate: bool,
    /// Upper bound on the calibration phase.
    pub calib_max: Duration,
    pub margin_on: f32,
    pub margin_off: f32,
    /// Hold the silence timer until the first voiced frame. Frames received
    /// while waiting are still part of the artifact.
    pub require_voice_first: bool,
    /// Also persist the artifact as a WAV file. Any pre-existing file at
    /// this path is removed when recording begins.
    pub output: Option<PathBuf>,
    pub queue_poll: Duration,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            silence_duration: Duration::from_secs_f32(defaults::SILENCE_DURATION_SECS),
            thresholds: VadThresholds::default(),
            auto_calibrate: false,
            calib_max: Duration::from_secs_f32(defaults::CALIB_MAX_SECS),
            margin_on: defaults::MARGIN_ON,
            margin_off: defaults::MARGIN_OFF,
            require_voice_first: false,
            output: None,
            queue_poll: Duration::from_millis(defaults::QUEUE_POLL_MS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecorderState {
    WaitingForVoice,
    Recording,
}

/// Pure recording state machine, time passed in explicitly.
pub struct RecorderEngine {
    state: RecorderState,
    gate: VoiceActivityGate,
    silence_duration: Duration,
    silence_started: Option<Instant>,
    samples: Vec<i16>,
}

impl RecorderEngine {
    pub fn new(gate: VoiceActivityGate, silence_duration: Duration, require_voice_first: bool) -> Self {
        Self {
            state: if require_voice_first {
                RecorderState::WaitingForVoice
            } else {
                RecorderState::Recording
            },
            gate,
            silence_duration,
            silence_started: None,
            samples: Vec::new(),
        }
    }

    /// Consumes one frame; returns true when recording should end.
    ///
    /// The frame is appended before classification, so pre-voice audio and
    /// the trailing silence both end up in the artifact.
    pub fn on_frame(&mut self, frame: &AudioFrame, now: Instant) -> bool {
        self.samples.extend_from_slice(&frame.samples);

        let level = self.gate.level(rms_i16(&frame.samples));
        match self.state {
            RecorderState::WaitingForVoice => {
                if level == FrameLevel::Voice {
                    self.state = RecorderState::Recording;
                    self.silence_started = None;
                }
                false
            }
            RecorderState::Recording => match level {
                FrameLevel::Voice | FrameLevel::DeadZone => {
                    self.silence_started = None;
                    false
                }
                FrameLevel::Silence => match self.silence_started {
                    None => {
                        self.silence_started = Some(now);
                        false
                    }
                    Some(started) => now.duration_since(started) >= self.silence_duration,
                },
            },
        }
    }

    /// Checks the silence timer without a frame; called when the queue poll
    /// times out. Returns true when recording should end.
    pub fn on_idle(&mut self, now: Instant) -> bool {
        if self.state != RecorderState::Recording {
            return false;
        }
        match self.silence_started {
            Some(started) => now.duration_since(started) >= self.silence_duration,
            None => false,
        }
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn into_samples(self) -> Vec<i16> {
        self.samples
    }
}

/// Recording consumer of the capture device.
///
/// `begin` opens the device and spawns a worker that runs the
/// [`RecorderEngine`] until silence terminates the utterance or `stop` is
/// called. Either way, a non-empty artifact is delivered exactly once on
/// the completion channel; an empty one is suppressed.
pub struct SilenceGatedRecorder {
    backend: Arc<Mutex<Box<dyn CaptureBackend>>>,
    config: RecorderConfig,
    done: Sender<RecordingArtifact>,
    queue: FrameQueue,
    running: Arc<AtomicBool>,
    clock: Arc<dyn Clock>,
    device_lock: DeviceLock,
    worker: Option<JoinHandle<()>>,
}

impl SilenceGatedRecorder {
    pub fn new(
        backend: Box<dyn CaptureBackend>,
        config: RecorderConfig,
        done: Sender<RecordingArtifact>,
        device_lock: DeviceLock,
    ) -> Self {
        Self {
            backend: Arc::new(Mutex::new(backend)),
            config,
            done,
            queue: FrameQueue::new(),
            running: Arc::new(AtomicBool::new(false)),
            clock: Arc::new(SystemClock),
            device_lock,
            worker: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn is_recording(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Starts a recording. Idempotent while one is in progress.
    pub fn begin(&mut self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(worker) = self.worker.take() {
            join_with_deadline(worker, Duration::from_millis(defaults::JOIN_TIMEOUT_MS));
        }

        if let Some(path) = &self.config.output
            && path.exists()
            && let Err(e) = std::fs::remove_file(path)
        {
            tracing::warn!("failed to remove stale output {}: {}", path.display(), e);
        }

        self.queue.drain();
        let info = {
            let _device = self.device_lock.lock().unwrap_or_else(|e| e.into_inner());
            let mut backend = self.backend.lock().unwrap_or_else(|e| e.into_inner());
            match backend.open(self.queue.clone()) {
                Ok(info) => info,
                Err(e) => {
                    self.running.store(false, Ordering::SeqCst);
                    return Err(e);
                }
            }
        };

        let queue = self.queue.clone();
        let running = Arc::clone(&self.running);
        let backend = Arc::clone(&self.backend);
        let device_lock = Arc::clone(&self.device_lock);
        let clock = Arc::clone(&self.clock);
        let config = self.config.clone();
        let done = self.done.clone();

        self.worker = Some(std::thread::spawn(move || {
            let mut gate = VoiceActivityGate::new(config.thresholds)
                .with_margins(config.margin_on, config.margin_off);

            if config.auto_calibrate {
                let deadline = clock.now() + config.calib_max;
                let keep_running = {
                    let running = Arc::clone(&running);
                    move || running.load(Ordering::SeqCst)
                };
                if let Some(noise) = gate.calibrate(&queue, deadline, clock.as_ref(), keep_running)
                {
                    let t = gate.thresholds();
                    tracing::info!(
                        noise_floor = noise,
                        voice_on = t.voice_on_rms(),
                        voice_off = t.voice_off_rms(),
                        "calibrated thresholds"
                    );
                }
            }

            let mut engine =
                RecorderEngine::new(gate, config.silence_duration, config.require_voice_first);

            while running.load(Ordering::SeqCst) {
                let finished = match queue.pop(config.queue_poll) {
                    Some(frame) => engine.on_frame(&frame, clock.now()),
                    None => engine.on_idle(clock.now()),
                };
                if finished {
                    tracing::debug!("silence threshold reached, recording done");
                    break;
                }
            }
            running.store(false, Ordering::SeqCst);

            {
                let _device = device_lock.lock().unwrap_or_else(|e| e.into_inner());
                let mut backend = backend.lock().unwrap_or_else(|e| e.into_inner());
                backend.close();
            }
            queue.drain();

            let samples = engine.into_samples();
            if samples.is_empty() {
                tracing::debug!("empty recording, no artifact");
                return;
            }

            let artifact = RecordingArtifact {
                samples,
                sample_rate: info.sample_rate,
                channels: info.channels,
            };
            if let Some(path) = &config.output
                && let Err(e) = artifact.write_wav(path)
            {
                tracing::error!("failed to persist recording to {}: {}", path.display(), e);
            }
            if done.send(artifact).is_err() {
                tracing::debug!("completion channel closed, artifact dropped");
            }
        }));
        Ok(())
    }

    /// Stops an in-progress recording. The artifact captured so far is
    /// still delivered if non-empty.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            join_with_deadline(worker, Duration::from_millis(defaults::JOIN_TIMEOUT_MS));
        }
    }
}

impl Drop for SilenceGatedRecorder {
    fn drop(&mut self) {
        self.stop();
    }
}
