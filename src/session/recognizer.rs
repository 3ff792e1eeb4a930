//! Streaming command recognition session.
//!
//! A worker thread pulls frames from the capture queue and feeds them to an
//! external [`RecognitionEngine`]. Finalized text is normalized and, when
//! non-empty, classified and emitted as a [`CommandEvent`] on a channel.
//! While paused, frames are consumed and discarded so no backlog of stale
//! audio is recognized on resume.

use crate::command::{CommandClassifier, CommandEvent};
use crate::defaults;
use crate::error::Result;
use crate::audio::capture::CaptureBackend;
use crate::audio::queue::FrameQueue;
use crate::session::{DeviceLock, join_with_deadline};
use crate::stt::engine::{EngineOutput, RecognitionEngine};
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// Stream-level effect of pausing the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PausePolicy {
    /// Keep the capture stream open and discard frames in software.
    /// Resuming is instant.
    Gate,
    /// Physically close the capture stream on pause and reopen it on
    /// resume. Releases the device while paused.
    Restart,
}

impl Default for PausePolicy {
    fn default() -> Self {
        Self::Gate
    }
}

/// Command-listening consumer of the capture device.
pub struct StreamingRecognitionSession {
    backend: Arc<Mutex<Box<dyn CaptureBackend>>>,
    engine: Arc<Mutex<Box<dyn RecognitionEngine>>>,
    classifier: Arc<CommandClassifier>,
    events: Sender<CommandEvent>,
    queue: FrameQueue,
    running: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    pause_policy: PausePolicy,
    queue_poll: Duration,
    device_lock: DeviceLock,
    worker: Option<JoinHandle<()>>,
}

impl StreamingRecognitionSession {
    pub fn new(
        backend: Box<dyn CaptureBackend>,
        engine: Box<dyn RecognitionEngine>,
        classifier: CommandClassifier,
        events: Sender<CommandEvent>,
        device_lock: DeviceLock,
    ) -> Self {
        Self {
            backend: Arc::new(Mutex::new(backend)),
            engine: Arc::new(Mutex::new(engine)),
            classifier: Arc::new(classifier),
            events,
            queue: FrameQueue::new(),
            running: Arc::new(AtomicBool::new(false)),
            paused: Arc::new(AtomicBool::new(false)),
            pause_policy: PausePolicy::Gate,
            queue_poll: Duration::from_millis(defaults::QUEUE_POLL_MS),
            device_lock,
            worker: None,
        }
    }

    pub fn with_pause_policy(mut self, policy: PausePolicy) -> Self {
        self.pause_policy = policy;
        self
    }

    pub fn with_queue_poll(mut self, poll: Duration) -> Self {
        self.queue_poll = poll;
        self
    }

    /// The frame sink this session consumes from.
    pub fn queue(&self) -> FrameQueue {
        self.queue.clone()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Opens the capture device and starts the consumer thread.
    /// Idempotent while running.
    pub fn start(&mut self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        {
            let _device = self.device_lock.lock().unwrap_or_else(|e| e.into_inner());
            let mut backend = self.backend.lock().unwrap_or_else(|e| e.into_inner());
            if let Err(e) = backend.open(self.queue.clone()) {
                self.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        }

        let queue = self.queue.clone();
        let running = Arc::clone(&self.running);
        let paused = Arc::clone(&self.paused);
        let engine = Arc::clone(&self.engine);
        let classifier = Arc::clone(&self.classifier);
        let events = self.events.clone();
        let poll = self.queue_poll;

        self.worker = Some(std::thread::spawn(move || {
            tracing::debug!("recognition worker started");
            while running.load(Ordering::SeqCst) {
                let Some(frame) = queue.pop(poll) else {
                    continue;
                };
                if paused.load(Ordering::SeqCst) {
                    continue;
                }

                let output = {
                    let mut engine = engine.lock().unwrap_or_else(|e| e.into_inner());
                    engine.accept(&frame)
                };
                match output {
                    Ok(EngineOutput::Pending) => {}
                    Ok(EngineOutput::Finalized(raw)) => {
                        let event = classifier.event(&raw);
                        if event.text.is_empty() {
                            continue;
                        }
                        tracing::debug!(text = %event.text, kind = ?event.kind, "recognized");
                        if events.send(event).is_err() {
                            tracing::debug!("command channel closed, stopping worker");
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("recognition engine error, frame skipped: {}", e);
                    }
                }
            }
            tracing::debug!("recognition worker stopped");
        }));
        Ok(())
    }

    /// Suspends recognition. Idempotent; the engine is reset exactly once
    /// per actual transition.
    pub fn pause(&mut self) -> Result<()> {
        if self.paused.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        {
            let mut engine = self.engine.lock().unwrap_or_else(|e| e.into_inner());
            engine.reset();
        }

        if self.pause_policy == PausePolicy::Restart {
            let _device = self.device_lock.lock().unwrap_or_else(|e| e.into_inner());
            let mut backend = self.backend.lock().unwrap_or_else(|e| e.into_inner());
            backend.close();
        }
        self.queue.drain();
        Ok(())
    }

    /// Resumes recognition. Idempotent; resets the engine so no partial
    /// utterance straddles the pause.
    pub fn resume(&mut self) -> Result<()> {
        if !self.paused.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        {
            let mut engine = self.engine.lock().unwrap_or_else(|e| e.into_inner());
            engine.reset();
        }

        if self.pause_policy == PausePolicy::Restart && self.running.load(Ordering::SeqCst) {
            let _device = self.device_lock.lock().unwrap_or_else(|e| e.into_inner());
            let mut backend = self.backend.lock().unwrap_or_else(|e| e.into_inner());
            backend.open(self.queue.clone())?;
        }
        Ok(())
    }

    /// Stops the session: closes the device, drains the queue and joins the
    /// worker with a bounded deadline.
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        {
            let _device = self.device_lock.lock().unwrap_or_else(|e| e.into_inner());
            let mut backend = self.backend.lock().unwrap_or_else(|e| e.into_inner());
            backend.close();
        }

        let dropped = self.queue.drain();
        if dropped > 0 {
            tracing::debug!("dropped {} unconsumed frames on stop", dropped);
        }

        if let Some(worker) = self.worker.take() {
            join_with_deadline(worker, Duration::from_millis(defaults::JOIN_TIMEOUT_MS));
        }
    }
}

impl Drop for StreamingRecognitionSession {
    fn drop(&mut self) {
        self.stop();
    }
}
