//! Audio capture, frame transport, voice activity detection and WAV I/O.

pub mod capture;
pub mod queue;
pub mod vad;
pub mod wav;

pub use capture::{
    CaptureBackend, CaptureConfig, CpalBackend, MockCaptureBackend, SampleFormat, SessionInfo,
    list_input_devices,
};
pub use queue::{AudioFrame, FrameQueue};
pub use vad::{
    Clock, FrameLevel, MockClock, SystemClock, VadThresholds, VoiceActivityGate, rms_i16,
};
