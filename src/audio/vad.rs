//! Voice activity detection over raw signed 16-bit sample energy.
//!
//! Levels are computed as root-mean-square over the unnormalized int16
//! sample values, so silence sits near zero and normal speech reaches the
//! hundreds. Detection is hysteretic: a frame asserts voice at or above
//! `voice_on_rms` and releases only at or below `voice_off_rms`, with the
//! band between counting as activity for silence-timing purposes.

use crate::audio::queue::FrameQueue;
use crate::defaults;
use crate::error::{Result, VoicegateError};
use std::time::{Duration, Instant};

/// Clock abstraction for time-dependent logic, injectable for tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Production clock backed by [`Instant::now`].
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for deterministic tests.
#[derive(Clone)]
pub struct MockClock {
    now: std::sync::Arc<std::sync::Mutex<Instant>>,
}

impl MockClock {
    pub fn new() -> Self {
        Self {
            now: std::sync::Arc::new(std::sync::Mutex::new(Instant::now())),
        }
    }

    /// Moves the clock forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += duration;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Root-mean-square energy of a frame, in the raw int16 domain.
///
/// Empty input yields 0.0.
pub fn rms_i16(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f64 = samples
        .iter()
        .map(|&s| {
            let v = s as f64;
            v * v
        })
        .sum();
    (sum_squares / samples.len() as f64).sqrt() as f32
}

/// Hysteresis threshold pair. Always satisfies `voice_off_rms < voice_on_rms`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VadThresholds {
    voice_on_rms: f32,
    voice_off_rms: f32,
}

impl VadThresholds {
    /// Builds a threshold pair, rejecting a non-positive gap.
    pub fn new(voice_on_rms: f32, voice_off_rms: f32) -> Result<Self> {
        if voice_off_rms >= voice_on_rms {
            return Err(VoicegateError::ConfigInvalidValue {
                key: "voice_off_rms".to_string(),
                message: format!(
                    "must be below voice_on_rms ({voice_off_rms} >= {voice_on_rms})"
                ),
            });
        }
        Ok(Self {
            voice_on_rms,
            voice_off_rms,
        })
    }

    pub fn voice_on_rms(&self) -> f32 {
        self.voice_on_rms
    }

    pub fn voice_off_rms(&self) -> f32 {
        self.voice_off_rms
    }
}

impl Default for VadThresholds {
    fn default() -> Self {
        Self {
            voice_on_rms: defaults::VOICE_ON_RMS,
            voice_off_rms: defaults::VOICE_OFF_RMS,
        }
    }
}

/// Classification of a single frame's energy against the threshold pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLevel {
    /// At or above the on threshold.
    Voice,
    /// Strictly between off and on. Counts as activity, not as silence.
    DeadZone,
    /// At or below the off threshold.
    Silence,
}

/// Frame-level voice classifier with hysteresis thresholds and optional
/// noise calibration. Consumers drive their own state from [`FrameLevel`];
/// the dead zone counts as activity, not as silence.
pub struct VoiceActivityGate {
    thresholds: VadThresholds,
    margin_on: f32,
    margin_off: f32,
}

impl VoiceActivityGate {
    pub fn new(thresholds: VadThresholds) -> Self {
        Self {
            thresholds,
            margin_on: defaults::MARGIN_ON,
            margin_off: defaults::MARGIN_OFF,
        }
    }

    /// Overrides the calibration margins.
    pub fn with_margins(mut self, margin_on: f32, margin_off: f32) -> Self {
        self.margin_on = margin_on;
        self.margin_off = margin_off;
        self
    }

    pub fn thresholds(&self) -> VadThresholds {
        self.thresholds
    }

    /// Classifies an energy value without touching the gate state.
    pub fn level(&self, rms: f32) -> FrameLevel {
        if rms >= self.thresholds.voice_on_rms {
            FrameLevel::Voice
        } else if rms <= self.thresholds.voice_off_rms {
            FrameLevel::Silence
        } else {
            FrameLevel::DeadZone
        }
    }

    /// Derives a threshold pair from collected ambient energies.
    ///
    /// The noise floor is the median of `energies`; the new thresholds are
    /// `on = max(noise + margin_on, noise * 1.5)` and
    /// `off = max(noise + margin_off, noise * 1.2)`, with `off` pulled down
    /// to `max(noise + margin_off, on * 0.7)` should it ever reach `on`.
    /// Returns the noise floor, or `None` when no energies were collected
    /// (thresholds untouched).
    pub fn apply_calibration(&mut self, energies: &[f32]) -> Option<f32> {
        if energies.is_empty() {
            return None;
        }
        let noise = median(energies);
        let on = (noise + self.margin_on).max(noise * 1.5);
        let mut off = (noise + self.margin_off).max(noise * 1.2);
        if off >= on {
            off = (noise + self.margin_off).max(on * 0.7);
        }
        // Margins guarantee off < on here, so construction cannot fail.
        if let Ok(thresholds) = VadThresholds::new(on, off) {
            self.thresholds = thresholds;
        }
        Some(noise)
    }

    /// Collects ambient frames from `queue` until `deadline` and calibrates
    /// from them.
    ///
    /// Pops use a short timeout so the deadline is honored even when no
    /// frames arrive. Collection aborts early, discarding nothing already
    /// gathered, when a frame reaches the current on threshold (the room is
    /// not quiet). `keep_running` is polled each iteration so a stopping
    /// session cuts calibration short.
    pub fn calibrate(
        &mut self,
        queue: &FrameQueue,
        deadline: Instant,
        clock: &dyn Clock,
        keep_running: impl Fn() -> bool,
    ) -> Option<f32> {
        let poll = Duration::from_millis(defaults::CALIB_POLL_MS);
        let mut energies = Vec::new();
        while keep_running() && clock.now() < deadline {
            let Some(frame) = queue.pop(poll) else {
                continue;
            };
            let rms = rms_i16(&frame.samples);
            if rms >= self.thresholds.voice_on_rms {
                break;
            }
            energies.push(rms);
        }
        self.apply_calibration(&energies)
    }
}

impl Default for VoiceActivityGate {
    fn default() -> Self {
        Self::new(VadThresholds::default())
    }
}

fn median(values: &[f32]) -> f32 {
    let mut sorted: Vec<f32> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
