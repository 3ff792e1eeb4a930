//! Consumer sessions: streaming command recognition and silence-gated
//! utterance recording. Exactly one session consumes the capture device at
//! a time; the coordinator enforces this with a shared device lock.

pub mod recognizer;
pub mod recorder;

pub use recognizer::{PausePolicy, StreamingRecognitionSession};
pub use recorder::{RecorderConfig, RecordingArtifact, SilenceGatedRecorder};

use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Shared lock serializing device open/close across sessions.
pub type DeviceLock = std::sync::Arc<std::sync::Mutex<()>>;

/// Waits for a worker thread to finish, up to `timeout`.
///
/// Polls `is_finished` so a wedged worker cannot block shutdown forever.
/// Returns false when the deadline passes with the thread still running;
/// the handle is dropped and the thread detached in that case.
pub(crate) fn join_with_deadline(handle: JoinHandle<()>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if handle.is_finished() {
            if let Err(e) = handle.join() {
                tracing::warn!("worker thread panicked: {:?}", e);
            }
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    tracing::warn!("worker thread did not stop within {:?}, detaching", timeout);
    false
}
