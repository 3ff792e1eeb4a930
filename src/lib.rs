//! voicegate - Real-time audio core for a local voice-controlled front end
//!
//! Continuous microphone capture with two mutually exclusive consumers:
//! streaming command recognition and silence-gated utterance recording,
//! coordinated by a Listening/Recording state machine.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod command;
pub mod config;
pub mod coordinator;
pub mod defaults;
pub mod error;
pub mod session;
pub mod stt;

// Core seams (capture → recognize/record → deliver)
pub use audio::capture::{CaptureBackend, CaptureConfig, CpalBackend, SessionInfo};
pub use audio::queue::{AudioFrame, FrameQueue};
pub use audio::vad::{Clock, SystemClock, VadThresholds, VoiceActivityGate};
pub use coordinator::{CollectorDelivery, Delivery, Mode, ModeCoordinator, WavFileDelivery};
pub use stt::engine::{EngineOutput, RecognitionEngine};

// Sessions
pub use command::{CommandClassifier, CommandEvent, CommandKind, KeywordSets};
pub use session::recognizer::{PausePolicy, StreamingRecognitionSession};
pub use session::recorder::{RecorderConfig, RecordingArtifact, SilenceGatedRecorder};

// Error handling
pub use error::{Result, VoicegateError};

// Config
pub use config::Config;
