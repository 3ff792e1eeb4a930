use crate::audio::capture::{CaptureConfig, SampleFormat};
use crate::audio::vad::VadThresholds;
use crate::command::KeywordSets;
use crate::defaults;
use crate::error::{Result, VoicegateError};
use crate::session::recognizer::PausePolicy;
use crate::session::recorder::RecorderConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioSection,
    pub listening: ListeningSection,
    pub recording: RecordingSection,
    pub commands: KeywordSets,
}

/// Capture device configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioSection {
    /// Index into the input-device enumeration; None picks the first
    /// input-capable device.
    pub device_index: Option<usize>,
    /// Sample rate for the listening stream; None uses the device default.
    pub sample_rate: Option<u32>,
    pub channels: u16,
    pub sample_format: SampleFormat,
}

/// Command-listening configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ListeningSection {
    pub block_size: u32,
    pub pause_policy: PausePolicy,
    pub queue_poll_ms: u64,
}

/// Utterance-recording configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecordingSection {
    pub block_size: u32,
    pub sample_rate: u32,
    pub silence_duration_secs: f32,
    pub voice_on_rms: f32,
    pub voice_off_rms: f32,
    pub auto_calibrate: bool,
    pub calib_max_secs: f32,
    pub margin_on: f32,
    pub margin_off: f32,
    pub require_voice_first: bool,
    /// Optional WAV path the artifact is also written to.
    pub output: Option<PathBuf>,
}

impl Default for AudioSection {
    fn default() -> Self {
        Self {
            device_index: None,
            sample_rate: None,
            channels: defaults::CHANNELS,
            sample_format: SampleFormat::I16,
        }
    }
}

impl Default for ListeningSection {
    fn default() -> Self {
        Self {
            block_size: defaults::LISTEN_BLOCK_SIZE,
            pause_policy: PausePolicy::Gate,
            queue_poll_ms: defaults::QUEUE_POLL_MS,
        }
    }
}

impl Default for RecordingSection {
    fn default() -> Self {
        Self {
            block_size: defaults::RECORD_BLOCK_SIZE,
            sample_rate: defaults::RECORD_SAMPLE_RATE,
            silence_duration_secs: defaults::SILENCE_DURATION_SECS,
            voice_on_rms: defaults::VOICE_ON_RMS,
            voice_off_rms: defaults::VOICE_OFF_RMS,
            auto_calibrate: false,
            calib_max_secs: defaults::CALIB_MAX_SECS,
            margin_on: defaults::MARGIN_ON,
            margin_off: defaults::MARGIN_OFF,
            require_voice_first: false,
            output: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file is missing or contains invalid TOML.
    /// Missing fields use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VoicegateError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                VoicegateError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file, falling back to defaults when the
    /// file is missing. Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(VoicegateError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VOICEGATE_DEVICE → audio.device_index
    /// - VOICEGATE_OUTPUT → recording.output
    /// - VOICEGATE_SILENCE_SECS → recording.silence_duration_secs
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(device) = std::env::var("VOICEGATE_DEVICE")
            && let Ok(index) = device.parse::<usize>()
        {
            self.audio.device_index = Some(index);
        }

        if let Ok(output) = std::env::var("VOICEGATE_OUTPUT")
            && !output.is_empty()
        {
            self.recording.output = Some(PathBuf::from(output));
        }

        if let Ok(silence) = std::env::var("VOICEGATE_SILENCE_SECS")
            && let Ok(secs) = silence.parse::<f32>()
            && secs > 0.0
        {
            self.recording.silence_duration_secs = secs;
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/voicegate/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("voicegate")
            .join("config.toml")
    }

    /// Capture parameters for the command-listening stream.
    pub fn listening_capture(&self) -> CaptureConfig {
        CaptureConfig {
            device_index: self.audio.device_index,
            sample_rate: self.audio.sample_rate,
            channels: self.audio.channels,
            block_size: self.listening.block_size,
            sample_format: self.audio.sample_format,
        }
    }

    /// Capture parameters for the utterance-recording stream.
    pub fn recording_capture(&self) -> CaptureConfig {
        CaptureConfig {
            device_index: self.audio.device_index,
            sample_rate: Some(self.recording.sample_rate),
            channels: self.audio.channels,
            block_size: self.recording.block_size,
            sample_format: self.audio.sample_format,
        }
    }

    /// Recorder tuning, validating the threshold pair.
    pub fn recorder_config(&self) -> Result<RecorderConfig> {
        let thresholds =
            VadThresholds::new(self.recording.voice_on_rms, self.recording.voice_off_rms)?;
        Ok(RecorderConfig {
            silence_duration: Duration::from_secs_f32(self.recording.silence_duration_secs),
            thresholds,
            auto_calibrate: self.recording.auto_calibrate,
            calib_max: Duration::from_secs_f32(self.recording.calib_max_secs),
            margin_on: self.recording.margin_on,
            margin_off: self.recording.margin_off,
            require_voice_first: self.recording.require_voice_first,
            output: self.recording.output.clone(),
            queue_poll: Duration::from_millis(defaults::QUEUE_POLL_MS),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_voicegate_env() {
        remove_env("VOICEGATE_DEVICE");
        remove_env("VOICEGATE_OUTPUT");
        remove_env("VOICEGATE_SILENCE_SECS");
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = Config::default();

        assert_eq!(config.audio.device_index, None);
        assert_eq!(config.audio.sample_rate, None);
        assert_eq!(config.audio.channels, 1);

        assert_eq!(config.listening.block_size, 8000);
        assert_eq!(config.listening.pause_policy, PausePolicy::Gate);

        assert_eq!(config.recording.block_size, 2048);
        assert_eq!(config.recording.sample_rate, 24_000);
        assert_eq!(config.recording.silence_duration_secs, 1.0);
        assert_eq!(config.recording.voice_on_rms, 350.0);
        assert_eq!(config.recording.voice_off_rms, 250.0);
        assert!(!config.recording.auto_calibrate);
        assert!(!config.recording.require_voice_first);

        assert!(config.commands.start.contains(&"шаня".to_string()));
        assert!(config.commands.stop.contains(&"стоп".to_string()));
    }

    #[test]
    fn test_load_from_toml_file() {
        let toml_content = r#"
            [audio]
            device_index = 2
            sample_rate = 48000
            sample_format = "f32"

            [listening]
            block_size = 4000
            pause_policy = "restart"

            [recording]
            silence_duration_secs = 2.5
            voice_on_rms = 400.0
            voice_off_rms = 300.0
            auto_calibrate = true
            output = "/tmp/utterance.wav"

            [commands]
            start = ["джарвис"]
            stop = ["хватит"]
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.audio.device_index, Some(2));
        assert_eq!(config.audio.sample_rate, Some(48000));
        assert_eq!(config.audio.sample_format, SampleFormat::F32);

        assert_eq!(config.listening.block_size, 4000);
        assert_eq!(config.listening.pause_policy, PausePolicy::Restart);

        assert_eq!(config.recording.silence_duration_secs, 2.5);
        assert_eq!(config.recording.voice_on_rms, 400.0);
        assert!(config.recording.auto_calibrate);
        assert_eq!(
            config.recording.output,
            Some(PathBuf::from("/tmp/utterance.wav"))
        );

        assert_eq!(config.commands.start, vec!["джарвис".to_string()]);
        assert_eq!(config.commands.stop, vec!["хватит".to_string()]);
        // Untouched sets keep their defaults.
        assert!(config.commands.pause.contains(&"пауза".to_string()));
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let toml_content = r#"
            [recording]
            silence_duration_secs = 0.8
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.recording.silence_duration_secs, 0.8);
        assert_eq!(config.recording.voice_on_rms, 350.0);
        assert_eq!(config.listening.block_size, 8000);
    }

    #[test]
    fn test_env_override_device() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_voicegate_env();

        set_env("VOICEGATE_DEVICE", "3");
        let config = Config::default().with_env_overrides();
        assert_eq!(config.audio.device_index, Some(3));

        clear_voicegate_env();
    }

    #[test]
    fn test_env_override_output_and_silence() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_voicegate_env();

        set_env("VOICEGATE_OUTPUT", "/tmp/cmd.wav");
        set_env("VOICEGATE_SILENCE_SECS", "1.5");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.recording.output, Some(PathBuf::from("/tmp/cmd.wav")));
        assert_eq!(config.recording.silence_duration_secs, 1.5);

        clear_voicegate_env();
    }

    #[test]
    fn test_env_override_invalid_values_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_voicegate_env();

        set_env("VOICEGATE_DEVICE", "not-a-number");
        set_env("VOICEGATE_SILENCE_SECS", "-2");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.audio.device_index, None);
        assert_eq!(config.recording.silence_duration_secs, 1.0);

        clear_voicegate_env();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let invalid_toml = r#"
            [audio
            device_index = "broken
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(invalid_toml.as_bytes()).unwrap();

        assert!(Config::load(temp_file.path()).is_err());
    }

    #[test]
    fn test_load_or_default_returns_default_for_missing_file() {
        let missing = Path::new("/tmp/nonexistent_voicegate_config_12345.toml");
        let config = Config::load_or_default(missing).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_or_default_propagates_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[recording\nbroken").unwrap();
        assert!(Config::load_or_default(temp_file.path()).is_err());
    }

    #[test]
    fn test_default_path_is_xdg_compliant() {
        let path = Config::default_path();
        let path_str = path.to_string_lossy();
        assert!(path_str.contains("voicegate"));
        assert!(path_str.ends_with("config.toml"));
    }

    #[test]
    fn test_recorder_config_rejects_inverted_thresholds() {
        let mut config = Config::default();
        config.recording.voice_on_rms = 100.0;
        config.recording.voice_off_rms = 200.0;
        assert!(config.recorder_config().is_err());
    }

    #[test]
    fn test_capture_configs_carry_section_values() {
        let mut config = Config::default();
        config.audio.device_index = Some(1);

        let listen = config.listening_capture();
        assert_eq!(listen.block_size, 8000);
        assert_eq!(listen.sample_rate, None);
        assert_eq!(listen.device_index, Some(1));

        let record = config.recording_capture();
        assert_eq!(record.block_size, 2048);
        assert_eq!(record.sample_rate, Some(24_000));
        assert_eq!(record.device_index, Some(1));
    }
}
