//! Listening/Recording mode coordination.
//!
//! The coordinator is the single reader of the command and completion
//! channels. It guarantees exclusive device consumption: command
//! recognition is paused for the whole life of a recording and resumed
//! when the artifact is delivered. Stop is terminal from either mode.

use crate::command::{CommandEvent, CommandKind};
use crate::error::{Result, VoicegateError};
use crate::session::recognizer::StreamingRecognitionSession;
use crate::session::recorder::{RecordingArtifact, SilenceGatedRecorder};
use crossbeam_channel::{Receiver, select};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Which session currently consumes the capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Listening,
    Recording,
}

/// Downstream consumer of finished recordings.
pub trait Delivery: Send {
    fn deliver(&mut self, artifact: RecordingArtifact) -> Result<()>;
    fn name(&self) -> &str;
}

/// Accumulates artifacts in memory. Useful in tests and for callers that
/// poll for results.
pub struct CollectorDelivery {
    artifacts: Arc<Mutex<Vec<RecordingArtifact>>>,
}

impl CollectorDelivery {
    pub fn new() -> Self {
        Self {
            artifacts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared view of everything delivered so far.
    pub fn handle(&self) -> Arc<Mutex<Vec<RecordingArtifact>>> {
        Arc::clone(&self.artifacts)
    }
}

impl Default for CollectorDelivery {
    fn default() -> Self {
        Self::new()
    }
}

impl Delivery for CollectorDelivery {
    fn deliver(&mut self, artifact: RecordingArtifact) -> Result<()> {
        let mut artifacts = self.artifacts.lock().unwrap_or_else(|e| e.into_inner());
        artifacts.push(artifact);
        Ok(())
    }

    fn name(&self) -> &str {
        "collector"
    }
}

/// Persists each artifact as a numbered WAV file under a directory.
pub struct WavFileDelivery {
    dir: PathBuf,
    counter: u32,
}

impl WavFileDelivery {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir, counter: 0 }
    }
}

impl Delivery for WavFileDelivery {
    fn deliver(&mut self, artifact: RecordingArtifact) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        self.counter += 1;
        let path = self.dir.join(format!("utterance-{:04}.wav", self.counter));
        artifact.write_wav(&path)?;
        tracing::info!(path = %path.display(), duration = ?artifact.duration(), "recording saved");
        Ok(())
    }

    fn name(&self) -> &str {
        "wav-file"
    }
}

/// Callback invoked on the coordinator thread for every command event.
pub type CommandHandler = Box<dyn FnMut(&CommandEvent) -> Result<()> + Send>;

/// Listening ⇄ Recording state machine over the two sessions.
pub struct ModeCoordinator {
    mode: Mode,
    recognizer: StreamingRecognitionSession,
    recorder: SilenceGatedRecorder,
    delivery: Box<dyn Delivery>,
    commands: Receiver<CommandEvent>,
    completions: Receiver<RecordingArtifact>,
    on_command: Option<CommandHandler>,
}

impl ModeCoordinator {
    pub fn new(
        recognizer: StreamingRecognitionSession,
        recorder: SilenceGatedRecorder,
        delivery: Box<dyn Delivery>,
        commands: Receiver<CommandEvent>,
        completions: Receiver<RecordingArtifact>,
    ) -> Self {
        Self {
            mode: Mode::Listening,
            recognizer,
            recorder,
            delivery,
            commands,
            completions,
            on_command: None,
        }
    }

    /// Installs a command observer. Errors it returns are logged and never
    /// interrupt coordination.
    pub fn with_command_handler(mut self, handler: CommandHandler) -> Self {
        self.on_command = Some(handler);
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Runs until a stop command arrives or both channels close.
    pub fn run(mut self) -> Result<()> {
        self.recognizer.start()?;
        tracing::info!("listening for commands");

        let commands = self.commands.clone();
        let completions = self.completions.clone();
        loop {
            select! {
                recv(commands) -> event => {
                    match event {
                        Ok(event) => {
                            if self.handle_command(&event) {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                }
                recv(completions) -> artifact => {
                    match artifact {
                        Ok(artifact) => self.on_recording_done(artifact),
                        Err(_) => break,
                    }
                }
            }
        }

        self.shutdown();
        Ok(())
    }

    /// Applies one command event. Returns true when coordination should end.
    fn handle_command(&mut self, event: &CommandEvent) -> bool {
        if let Some(handler) = &mut self.on_command
            && let Err(e) = handler(event)
        {
            let e = VoicegateError::Handler {
                message: e.to_string(),
            };
            tracing::warn!("{}", e);
        }

        match event.kind {
            CommandKind::Start => {
                if self.mode == Mode::Recording {
                    tracing::debug!("start ignored, already recording");
                    return false;
                }
                self.enter_recording();
                false
            }
            CommandKind::Pause => {
                if let Err(e) = self.recognizer.pause() {
                    tracing::warn!("pause failed: {}", e);
                }
                false
            }
            CommandKind::Resume => {
                if let Err(e) = self.recognizer.resume() {
                    tracing::warn!("resume failed: {}", e);
                }
                false
            }
            CommandKind::Stop => {
                tracing::info!("stop command received");
                true
            }
            CommandKind::None => false,
        }
    }

    fn enter_recording(&mut self) {
        if let Err(e) = self.recognizer.pause() {
            tracing::warn!("failed to pause recognition: {}", e);
        }
        match self.recorder.begin() {
            Ok(()) => {
                self.mode = Mode::Recording;
                tracing::info!("recording started");
            }
            Err(e) => {
                tracing::error!("failed to start recording: {}", e);
                if let Err(e) = self.recognizer.resume() {
                    tracing::warn!("failed to resume recognition: {}", e);
                }
            }
        }
    }

    fn on_recording_done(&mut self, artifact: RecordingArtifact) {
        tracing::info!(duration = ?artifact.duration(), "recording finished");
        if let Err(e) = self.delivery.deliver(artifact) {
            tracing::error!("delivery to {} failed: {}", self.delivery.name(), e);
        }
        if let Err(e) = self.recognizer.resume() {
            tracing::warn!("failed to resume recognition: {}", e);
        }
        self.mode = Mode::Listening;
    }

    /// Stops both sessions. A recording cut short by stop still produces an
    /// artifact; it is delivered before the device is released for good.
    fn shutdown(&mut self) {
        self.recorder.stop();
        while let Ok(artifact) = self.completions.try_recv() {
            self.on_recording_done(artifact);
        }
        self.recognizer.stop();
        tracing::info!("coordinator stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::capture::MockCaptureBackend;
    use crate::audio::queue::AudioFrame;
    use crate::audio::vad::MockClock;
    use crate::command::CommandClassifier;
    use crate::session::DeviceLock;
    use crate::session::recorder::RecorderConfig;
    use crate::stt::engine::MockRecognitionEngine;
    use crossbeam_channel::unbounded;
    use std::time::Duration;

    struct FailingDelivery;

    impl Delivery for FailingDelivery {
        fn deliver(&mut self, _artifact: RecordingArtifact) -> Result<()> {
            Err(VoicegateError::Artifact {
                message: "disk full".to_string(),
            })
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    fn recognizer(
        engine: MockRecognitionEngine,
        lock: DeviceLock,
    ) -> (
        StreamingRecognitionSession,
        Receiver<CommandEvent>,
    ) {
        let (tx, rx) = unbounded();
        let session = StreamingRecognitionSession::new(
            Box::new(MockCaptureBackend::new()),
            Box::new(engine),
            CommandClassifier::default(),
            tx,
            lock,
        )
        .with_queue_poll(Duration::from_millis(20));
        (session, rx)
    }

    fn recorder(
        backend: MockCaptureBackend,
        lock: DeviceLock,
        clock: &MockClock,
    ) -> (SilenceGatedRecorder, Receiver<RecordingArtifact>) {
        let (tx, rx) = unbounded();
        let recorder = SilenceGatedRecorder::new(
            Box::new(backend),
            RecorderConfig {
                queue_poll: Duration::from_millis(20),
                ..RecorderConfig::default()
            },
            tx,
            lock,
        )
        .with_clock(std::sync::Arc::new(clock.clone()));
        (recorder, rx)
    }

    fn coordinator_parts(
        engine: MockRecognitionEngine,
        recorder_backend: MockCaptureBackend,
        clock: &MockClock,
    ) -> (ModeCoordinator, crate::audio::queue::FrameQueue) {
        let lock = DeviceLock::default();
        let (recognizer, command_rx) = recognizer(engine, Arc::clone(&lock));
        let queue = recognizer.queue();
        let (recorder, done_rx) = recorder(recorder_backend, lock, clock);
        let coordinator = ModeCoordinator::new(
            recognizer,
            recorder,
            Box::new(CollectorDelivery::new()),
            command_rx,
            done_rx,
        );
        (coordinator, queue)
    }

    fn event(kind: CommandKind, text: &str) -> CommandEvent {
        CommandEvent {
            text: text.to_string(),
            kind,
        }
    }

    #[test]
    fn test_start_while_recording_is_ignored() {
        let clock = MockClock::new();
        let backend = MockCaptureBackend::new();
        let (mut coordinator, _queue) =
            coordinator_parts(MockRecognitionEngine::new(), backend, &clock);

        assert!(!coordinator.handle_command(&event(CommandKind::Start, "шаня")));
        assert_eq!(coordinator.mode(), Mode::Recording);

        // A second start changes nothing.
        assert!(!coordinator.handle_command(&event(CommandKind::Start, "шаня")));
        assert_eq!(coordinator.mode(), Mode::Recording);
        coordinator.shutdown();
    }

    #[test]
    fn test_recording_mode_excludes_recognizer_consumption() {
        let clock = MockClock::new();
        let engine = MockRecognitionEngine::new();
        let accepted = engine.accepted_handle();
        let (mut coordinator, listen_queue) =
            coordinator_parts(engine, MockCaptureBackend::new(), &clock);

        coordinator.recognizer.start().unwrap();
        coordinator.handle_command(&event(CommandKind::Start, "шаня"));

        assert_eq!(coordinator.mode(), Mode::Recording);
        assert!(coordinator.recognizer.is_paused());
        assert!(coordinator.recorder.is_recording());

        // Frames arriving on the listening queue while Recording never
        // reach the engine.
        listen_queue.push(AudioFrame::new(0, vec![100i16; 32]));
        listen_queue.push(AudioFrame::new(1, vec![100i16; 32]));
        std::thread::sleep(Duration::from_millis(100));

        assert_eq!(accepted.load(std::sync::atomic::Ordering::SeqCst), 0);
        coordinator.shutdown();
    }

    #[test]
    fn test_stop_is_terminal_from_listening() {
        let clock = MockClock::new();
        let (mut coordinator, _queue) = coordinator_parts(
            MockRecognitionEngine::new(),
            MockCaptureBackend::new(),
            &clock,
        );

        assert!(coordinator.handle_command(&event(CommandKind::Stop, "стоп")));
        coordinator.shutdown();
    }

    #[test]
    fn test_stop_while_recording_delivers_partial_artifact() {
        let clock = MockClock::new();
        let backend =
            MockCaptureBackend::new().with_frames(vec![AudioFrame::new(0, vec![500i16; 1024])]);
        let lock = DeviceLock::default();
        let (recognizer, command_rx) = recognizer(MockRecognitionEngine::new(), Arc::clone(&lock));
        let (recorder, done_rx) = recorder(backend, lock, &clock);
        let delivery = CollectorDelivery::new();
        let delivered = delivery.handle();
        let mut coordinator = ModeCoordinator::new(
            recognizer,
            recorder,
            Box::new(delivery),
            command_rx,
            done_rx,
        );

        coordinator.handle_command(&event(CommandKind::Start, "шаня"));
        std::thread::sleep(Duration::from_millis(100));
        assert!(coordinator.handle_command(&event(CommandKind::Stop, "стоп")));
        coordinator.shutdown();

        let delivered = delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].samples.len(), 1024);
    }

    #[test]
    fn test_recording_completion_returns_to_listening() {
        let clock = MockClock::new();
        let (mut coordinator, _queue) = coordinator_parts(
            MockRecognitionEngine::new(),
            MockCaptureBackend::new(),
            &clock,
        );

        coordinator.handle_command(&event(CommandKind::Start, "шаня"));
        assert_eq!(coordinator.mode(), Mode::Recording);

        coordinator.on_recording_done(RecordingArtifact {
            samples: vec![0i16; 100],
            sample_rate: 24_000,
            channels: 1,
        });
        assert_eq!(coordinator.mode(), Mode::Listening);
        coordinator.shutdown();
    }

    #[test]
    fn test_delivery_failure_still_returns_to_listening() {
        let clock = MockClock::new();
        let lock = DeviceLock::default();
        let (recognizer, command_rx) = recognizer(MockRecognitionEngine::new(), Arc::clone(&lock));
        let (recorder, done_rx) = recorder(MockCaptureBackend::new(), lock, &clock);
        let mut coordinator = ModeCoordinator::new(
            recognizer,
            recorder,
            Box::new(FailingDelivery),
            command_rx,
            done_rx,
        );

        coordinator.handle_command(&event(CommandKind::Start, "шаня"));
        coordinator.on_recording_done(RecordingArtifact {
            samples: vec![0i16; 100],
            sample_rate: 24_000,
            channels: 1,
        });
        assert_eq!(coordinator.mode(), Mode::Listening);
        coordinator.shutdown();
    }

    #[test]
    fn test_recording_begin_failure_resumes_listening() {
        let clock = MockClock::new();
        let (mut coordinator, _queue) = coordinator_parts(
            MockRecognitionEngine::new(),
            MockCaptureBackend::new().with_open_failure(),
            &clock,
        );

        coordinator.handle_command(&event(CommandKind::Start, "шаня"));
        assert_eq!(coordinator.mode(), Mode::Listening);
        assert!(!coordinator.recognizer.is_paused());
        coordinator.shutdown();
    }

    #[test]
    fn test_command_handler_error_is_swallowed() {
        let clock = MockClock::new();
        let (coordinator, _queue) = coordinator_parts(
            MockRecognitionEngine::new(),
            MockCaptureBackend::new(),
            &clock,
        );
        let mut coordinator = coordinator.with_command_handler(Box::new(|_| {
            Err(VoicegateError::Other("handler broke".to_string()))
        }));

        assert!(!coordinator.handle_command(&event(CommandKind::None, "что-то")));
        coordinator.shutdown();
    }

    #[test]
    fn test_pause_and_resume_are_advisory() {
        let clock = MockClock::new();
        let engine = MockRecognitionEngine::new();
        let resets = engine.resets_handle();
        let (mut coordinator, _queue) =
            coordinator_parts(engine, MockCaptureBackend::new(), &clock);

        coordinator.handle_command(&event(CommandKind::Pause, "пауза"));
        assert!(coordinator.recognizer.is_paused());
        assert_eq!(coordinator.mode(), Mode::Listening);

        coordinator.handle_command(&event(CommandKind::Resume, "продолжи"));
        assert!(!coordinator.recognizer.is_paused());
        assert_eq!(resets.load(std::sync::atomic::Ordering::SeqCst), 2);
        coordinator.shutdown();
    }

    #[test]
    fn test_end_to_end_start_record_stop() {
        let clock = MockClock::new();
        let mut engine = MockRecognitionEngine::new();
        engine.push_finalized("шаня найди");
        engine.push_finalized("стоп");

        let recorder_backend = MockCaptureBackend::new().with_frames(vec![
            AudioFrame::new(0, vec![500i16; 2048]),
            AudioFrame::new(1, vec![0i16; 2048]),
        ]);

        let lock = DeviceLock::default();
        let (recognizer, command_rx) = recognizer(engine, Arc::clone(&lock));
        let listen_queue = recognizer.queue();
        let (recorder, done_rx) = recorder(recorder_backend, lock, &clock);

        let delivery = CollectorDelivery::new();
        let delivered = delivery.handle();
        let seen: Arc<Mutex<Vec<CommandKind>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_in_handler = Arc::clone(&seen);

        let coordinator = ModeCoordinator::new(
            recognizer,
            recorder,
            Box::new(delivery),
            command_rx,
            done_rx,
        )
        .with_command_handler(Box::new(move |event| {
            seen_in_handler
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(event.kind);
            Ok(())
        }));

        let runner = std::thread::spawn(move || coordinator.run());

        // "шаня найди" starts a recording.
        listen_queue.push(AudioFrame::new(0, vec![100i16; 32]));

        // Wait for the recording to drain its frames, then let silence end it.
        std::thread::sleep(Duration::from_millis(200));
        clock.advance(Duration::from_secs(2));

        // Poll until the artifact has been delivered and listening resumed.
        let deadline = std::time::Instant::now() + Duration::from_secs(3);
        while std::time::Instant::now() < deadline {
            if !delivered.lock().unwrap_or_else(|e| e.into_inner()).is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }

        // Delivery happens just before the recognizer resumes; give the
        // coordinator a moment so the stop frame is not discarded as paused.
        std::thread::sleep(Duration::from_millis(50));

        // "стоп" shuts everything down.
        listen_queue.push(AudioFrame::new(1, vec![100i16; 32]));

        runner.join().unwrap().unwrap();

        let delivered = delivered.lock().unwrap_or_else(|e| e.into_inner());
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].samples.len(), 2 * 2048);

        let seen = seen.lock().unwrap_or_else(|e| e.into_inner());
        assert_eq!(seen.as_slice(), &[CommandKind::Start, CommandKind::Stop]);
    }
}
