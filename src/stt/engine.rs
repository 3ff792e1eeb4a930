//! Seam for external streaming recognition engines.

use crate::audio::queue::AudioFrame;
use crate::error::Result;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Result of feeding one frame to a streaming recognizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOutput {
    /// The engine is still accumulating; no utterance boundary yet.
    Pending,
    /// The engine closed an utterance and produced its final text.
    Finalized(String),
}

/// Streaming speech recognizer fed frame by frame.
///
/// Implementations wrap an external decoder (Vosk, Whisper streaming, a
/// network service). `reset` discards any partial utterance state; it is
/// called around pause/resume transitions so text never straddles a pause.
pub trait RecognitionEngine: Send {
    /// Feeds one frame; returns finalized text when the engine detects an
    /// utterance boundary.
    fn accept(&mut self, frame: &AudioFrame) -> Result<EngineOutput>;

    /// Discards partial utterance state.
    fn reset(&mut self);
}

/// Scripted engine for tests.
///
/// Each call to `accept` pops the next scripted result; once the script is
/// exhausted every frame yields [`EngineOutput::Pending`]. Reset calls are
/// counted on a shared handle so tests can observe them after the engine
/// moves into a session.
pub struct MockRecognitionEngine {
    script: VecDeque<Result<EngineOutput>>,
    resets: Arc<AtomicUsize>,
    accepted: Arc<AtomicUsize>,
}

impl MockRecognitionEngine {
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
            resets: Arc::new(AtomicUsize::new(0)),
            accepted: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Appends a finalized-text result to the script.
    pub fn push_finalized(&mut self, text: &str) {
        self.script.push_back(Ok(EngineOutput::Finalized(text.to_string())));
    }

    /// Appends a pending result to the script.
    pub fn push_pending(&mut self) {
        self.script.push_back(Ok(EngineOutput::Pending));
    }

    /// Appends an error result to the script.
    pub fn push_error(&mut self, error: crate::error::VoicegateError) {
        self.script.push_back(Err(error));
    }

    /// Shared counter of `reset` calls.
    pub fn resets_handle(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.resets)
    }

    /// Shared counter of `accept` calls.
    pub fn accepted_handle(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.accepted)
    }
}

impl Default for MockRecognitionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RecognitionEngine for MockRecognitionEngine {
    fn accept(&mut self, _frame: &AudioFrame) -> Result<EngineOutput> {
        self.accepted.fetch_add(1, Ordering::SeqCst);
        self.script.pop_front().unwrap_or(Ok(EngineOutput::Pending))
    }

    fn reset(&mut self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }
}
