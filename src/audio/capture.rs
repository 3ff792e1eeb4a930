//! Microphone capture using CPAL (Cross-Platform Audio Library).
//!
//! The capture layer owns the input device exclusively. A backend is opened
//! with a [`FrameQueue`] sink; the stream callback slices incoming samples
//! into fixed blocks and enqueues them, and does nothing else.

use crate::audio::queue::{AudioFrame, FrameQueue};
use crate::defaults;
use crate::error::{Result, VoicegateError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// This suppresses noisy ALSA/JACK/PipeWire messages that CPAL triggers
/// when probing audio backends. The messages are harmless but confusing to users.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` to save and restore file descriptor 2 (stderr).
/// Safe as long as no other thread is concurrently manipulating fd 2.
fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Sample format requested from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    I16,
    F32,
}

impl Default for SampleFormat {
    fn default() -> Self {
        Self::I16
    }
}

/// Parameters for opening a capture session.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Index into the host's input-device enumeration; `None` selects the
    /// first input-capable device.
    pub device_index: Option<usize>,
    /// Requested sample rate in Hz; `None` uses the device default.
    pub sample_rate: Option<u32>,
    pub channels: u16,
    /// Samples per frame delivered to the sink.
    pub block_size: u32,
    pub sample_format: SampleFormat,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_index: None,
            sample_rate: None,
            channels: defaults::CHANNELS,
            block_size: defaults::LISTEN_BLOCK_SIZE,
            sample_format: SampleFormat::I16,
        }
    }
}

/// Negotiated parameters of an open capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionInfo {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Seam between the sessions and the audio hardware.
///
/// `open` starts delivering frames to `sink` and returns the negotiated
/// session parameters. `close` is idempotent; closing a backend that is not
/// open is a no-op.
pub trait CaptureBackend: Send {
    fn open(&mut self, sink: FrameQueue) -> Result<SessionInfo>;
    fn close(&mut self);
    fn is_open(&self) -> bool;
}

/// List input-capable device names in enumeration order.
pub fn list_input_devices() -> Result<Vec<String>> {
    let devices = with_suppressed_stderr(|| {
        let host = cpal::default_host();
        host.input_devices()
    })
    .map_err(|e| VoicegateError::Device {
        message: format!("Failed to enumerate input devices: {}", e),
    })?;

    let mut names = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            names.push(name);
        }
    }
    Ok(names)
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: The stream is only touched by the thread that owns the backend;
/// play/pause/drop are called synchronously from that thread.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Real capture backend over CPAL.
///
/// Opening resolves the device and sample rate, builds an input stream with
/// a fixed buffer size, and starts it. The stream callback accumulates
/// samples and pushes complete blocks to the sink; a partial tail block is
/// held until it fills. Open failures are retried a bounded number of times
/// with a fixed backoff before becoming fatal.
pub struct CpalBackend {
    config: CaptureConfig,
    stream: Option<SendableStream>,
    info: Option<SessionInfo>,
}

impl CpalBackend {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            stream: None,
            info: None,
        }
    }

    fn select_device(&self) -> Result<cpal::Device> {
        with_suppressed_stderr(|| {
            let host = cpal::default_host();
            let devices = host.input_devices().map_err(|e| VoicegateError::Device {
                message: format!("Failed to enumerate input devices: {}", e),
            })?;

            match self.config.device_index {
                Some(index) => devices.into_iter().nth(index).ok_or_else(|| {
                    VoicegateError::DeviceNotFound {
                        device: format!("input device index {}", index),
                    }
                }),
                // First input-capable device, matching the order the
                // `devices` listing shows.
                None => devices.into_iter().next().ok_or_else(|| {
                    VoicegateError::DeviceNotFound {
                        device: "any input device".to_string(),
                    }
                }),
            }
        })
    }

    fn open_once(&mut self, sink: FrameQueue) -> Result<SessionInfo> {
        let device = self.select_device()?;

        let sample_rate = match self.config.sample_rate {
            Some(rate) => rate,
            None => {
                let default_config =
                    device
                        .default_input_config()
                        .map_err(|e| VoicegateError::Device {
                            message: format!("Failed to query default input config: {}", e),
                        })?;
                default_config.sample_rate().0
            }
        };

        let stream_config = cpal::StreamConfig {
            channels: self.config.channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Fixed(self.config.block_size),
        };

        let err_callback = |err| {
            tracing::warn!("audio stream error: {}", err);
        };

        let block_size = self.config.block_size as usize;
        let seq = Arc::new(AtomicU64::new(0));
        let mut pending: Vec<i16> = Vec::with_capacity(block_size);

        let stream = match self.config.sample_format {
            SampleFormat::I16 => device
                .build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        pending.extend_from_slice(data);
                        while pending.len() >= block_size {
                            let block: Vec<i16> = pending.drain(..block_size).collect();
                            let n = seq.fetch_add(1, Ordering::Relaxed);
                            sink.push(AudioFrame::new(n, block));
                        }
                    },
                    err_callback,
                    None,
                )
                .map_err(|e| VoicegateError::Device {
                    message: format!("Failed to build i16 input stream: {}", e),
                })?,
            SampleFormat::F32 => device
                .build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        pending.extend(
                            data.iter()
                                .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16),
                        );
                        while pending.len() >= block_size {
                            let block: Vec<i16> = pending.drain(..block_size).collect();
                            let n = seq.fetch_add(1, Ordering::Relaxed);
                            sink.push(AudioFrame::new(n, block));
                        }
                    },
                    err_callback,
                    None,
                )
                .map_err(|e| VoicegateError::Device {
                    message: format!("Failed to build f32 input stream: {}", e),
                })?,
        };

        stream.play().map_err(|e| VoicegateError::Device {
            message: format!("Failed to start input stream: {}", e),
        })?;

        let info = SessionInfo {
            sample_rate,
            channels: self.config.channels,
        };
        self.stream = Some(SendableStream(stream));
        self.info = Some(info);
        Ok(info)
    }
}

impl CaptureBackend for CpalBackend {
    fn open(&mut self, sink: FrameQueue) -> Result<SessionInfo> {
        if let Some(info) = self.info
            && self.stream.is_some()
        {
            return Ok(info);
        }

        let mut last_err = None;
        for attempt in 1..=defaults::OPEN_RETRIES {
            match self.open_once(sink.clone()) {
                Ok(info) => return Ok(info),
                Err(e @ VoicegateError::DeviceNotFound { .. }) => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        "capture open attempt {}/{} failed: {}",
                        attempt,
                        defaults::OPEN_RETRIES,
                        e
                    );
                    last_err = Some(e);
                    if attempt < defaults::OPEN_RETRIES {
                        std::thread::sleep(Duration::from_millis(defaults::OPEN_RETRY_DELAY_MS));
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| VoicegateError::Device {
            message: "capture open failed".to_string(),
        }))
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.0.pause() {
                tracing::warn!("failed to pause input stream on close: {}", e);
            }
        }
        self.info = None;
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

/// Scripted capture backend for tests. Frames queued with `enqueue_frames`
/// are delivered to the sink when `open` is called.
pub struct MockCaptureBackend {
    info: SessionInfo,
    frames: Vec<AudioFrame>,
    fail_open: bool,
    open: bool,
    open_count: usize,
    close_count: usize,
}

impl MockCaptureBackend {
    pub fn new() -> Self {
        Self {
            info: SessionInfo {
                sample_rate: defaults::RECORD_SAMPLE_RATE,
                channels: defaults::CHANNELS,
            },
            frames: Vec::new(),
            fail_open: false,
            open: false,
            open_count: 0,
            close_count: 0,
        }
    }

    pub fn with_session_info(mut self, info: SessionInfo) -> Self {
        self.info = info;
        self
    }

    pub fn with_frames(mut self, frames: Vec<AudioFrame>) -> Self {
        self.frames = frames;
        self
    }

    pub fn with_open_failure(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn open_count(&self) -> usize {
        self.open_count
    }

    pub fn close_count(&self) -> usize {
        self.close_count
    }
}

impl Default for MockCaptureBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for MockCaptureBackend {
    fn open(&mut self, sink: FrameQueue) -> Result<SessionInfo> {
        self.open_count += 1;
        if self.fail_open {
            return Err(VoicegateError::Device {
                message: "mock open failure".to_string(),
            });
        }
        for frame in self.frames.drain(..) {
            sink.push(frame);
        }
        self.open = true;
        Ok(self.info)
    }

    fn close(&mut self) {
        if self.open {
            self.close_count += 1;
            self.open = false;
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
