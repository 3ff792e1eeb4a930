//! Recognition-engine seam and wire-format helpers.

pub mod engine;
pub mod json;

pub use engine::{EngineOutput, MockRecognitionEngine, RecognitionEngine};
pub use json::parse_transcript;
