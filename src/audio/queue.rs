//! Frame queue between the capture callback and the active consumer.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use std::time::Duration;

/// A fixed block of consecutive signed 16-bit mono samples from the capture
/// layer. Sample rate and channel count are implicit, inherited from the
/// session that produced the frame.
///
/// Immutable once created; consumed exactly once by the active session.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Monotonic sequence number assigned by the producer.
    pub seq: u64,
    /// Signed 16-bit PCM samples.
    pub samples: Vec<i16>,
}

impl AudioFrame {
    /// Creates a new frame.
    pub fn new(seq: u64, samples: Vec<i16>) -> Self {
        Self { seq, samples }
    }

    /// Little-endian byte length of the frame payload.
    pub fn byte_len(&self) -> usize {
        self.samples.len() * 2
    }
}

/// Ordered frame buffer between the real-time producer and one consumer.
///
/// `push` never blocks and never fails: the capture callback runs in a
/// hardware-driven context and must only enqueue. Backpressure policy is
/// grow-unbounded (no frame is ever dropped or reordered); `drain` empties
/// the queue when a session stops so no stale frames leak into the next
/// consumer.
#[derive(Clone)]
pub struct FrameQueue {
    tx: Sender<AudioFrame>,
    rx: Receiver<AudioFrame>,
}

impl FrameQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Enqueues a frame. Non-blocking; safe to call from the capture callback.
    pub fn push(&self, frame: AudioFrame) {
        // Send on an unbounded channel only fails when every receiver is
        // gone, and self holds one.
        let _ = self.tx.send(frame);
    }

    /// Dequeues the oldest frame, waiting up to `timeout`.
    pub fn pop(&self, timeout: Duration) -> Option<AudioFrame> {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Some(frame),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Discards every buffered frame, returning how many were dropped.
    pub fn drain(&self) -> usize {
        let mut dropped = 0;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }

    /// Number of frames currently buffered.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Returns true when no frames are buffered.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new()
    }
}
