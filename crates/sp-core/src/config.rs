use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Complete system configuration, read once at startup.
///
/// Serializable to TOML. Every section and field has a sane default, so an
/// empty file is a valid configuration.
///
/// # Example
/// ```
/// use sp_core::config::SystemConfig;
/// let config = SystemConfig::default();
/// assert_eq!(config.audio.sample_rate, 48_000);
/// assert!((config.detection.confidence_threshold - 85.0).abs() < f32::EPSILON);
/// ```
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SystemConfig {
    pub audio: AudioConfig,
    pub detection: DetectionConfig,
    pub sequence: SequenceConfig,
    pub pillow: PillowConfig,
    pub gpio: GpioConfig,
    pub model: ModelConfig,
    pub store: StoreConfig,
}

/// Capture and feature-extraction parameters.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Capture and analysis sample rate in Hz.
    pub sample_rate: u32,
    /// Clip length in seconds.
    pub clip_secs: u32,
    /// Mel bands for the time-series pipeline when the model does not fix it.
    pub n_mels: usize,
    /// Upper mel frequency for the time-series pipeline.
    pub fmax_hz: f32,
    /// Directory receiving `recording_*.wav` clips.
    pub recordings_dir: PathBuf,
    /// Clips kept on disk by the retention sweep.
    pub max_audio_files: usize,
}

/// Classification decision and supervisory loop timing.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Percent; a positive label must score strictly above it.
    pub confidence_threshold: f32,
    /// Initial auto-run pause after a triggering detection, minutes (1..=60).
    pub detection_delay_minutes: u32,
    /// Labels treated as the triggering condition (exact match).
    pub positive_labels: Vec<String>,
    /// Pause after a non-triggering cycle, seconds.
    pub retry_secs: u64,
    /// Pause when the loop finds a capture or sequence in progress, seconds.
    pub busy_poll_secs: u64,
    /// Back-off after an unexpected loop error, seconds.
    pub error_backoff_secs: u64,
}

/// Actuation sequence timings. Durations are counted in ticks.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct SequenceConfig {
    pub stage1_secs: u64,
    pub interval_secs: u64,
    pub stage2_secs: u64,
    /// Interval progress is logged every this many ticks.
    pub progress_every_secs: u64,
    /// Length of one tick (cancellation polling granularity), milliseconds.
    pub tick_ms: u64,
    /// Valve/pump settle delay inside one engage call, milliseconds.
    pub settle_ms: u64,
    /// Upper bound on joining the supervisory loop at stop, seconds.
    pub stop_join_timeout_secs: u64,
}

/// Manual pillow operations.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct PillowConfig {
    /// Channel-2 deflate run before inflating to a level, seconds.
    pub pre_deflate_secs: u64,
    /// Channel-1 inflate time for levels 1, 2 and 3, seconds.
    pub level_secs: [u64; 3],
    /// Full deflate run, seconds.
    pub deflate_secs: u64,
}

/// Output lines for the two pump+valve channels.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct GpioConfig {
    pub chip: PathBuf,
    pub pump1_line: u32,
    pub pump2_line: u32,
    pub valve1_line: u32,
    pub valve2_line: u32,
}

/// Model artifacts.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelConfig {
    pub path: PathBuf,
    pub label_mapping: PathBuf,
    pub metadata: PathBuf,
    /// Labels for class 0 and class 1 when no mapping file is present.
    pub fallback_labels: [String; 2],
}

/// In-memory buffer capacities.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub max_detection_history: usize,
    pub max_activity_log: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            clip_secs: 5,
            n_mels: 128,
            fmax_hz: 8000.0,
            recordings_dir: PathBuf::from("recordings"),
            max_audio_files: 20,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 85.0,
            detection_delay_minutes: 5,
            positive_labels: vec!["snoring".to_string()],
            retry_secs: 5,
            busy_poll_secs: 2,
            error_backoff_secs: 10,
        }
    }
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            stage1_secs: 50,
            interval_secs: 60,
            stage2_secs: 20,
            progress_every_secs: 60,
            tick_ms: 1000,
            settle_ms: 100,
            stop_join_timeout_secs: 5,
        }
    }
}

impl Default for PillowConfig {
    fn default() -> Self {
        Self {
            pre_deflate_secs: 20,
            level_secs: [15, 30, 50],
            deflate_secs: 30,
        }
    }
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            chip: PathBuf::from("/dev/gpiochip0"),
            pump1_line: 17,
            pump2_line: 27,
            valve1_line: 23,
            valve2_line: 24,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("snore_detection_model.onnx"),
            label_mapping: PathBuf::from("label_mapping.json"),
            metadata: PathBuf::from("model_metadata.json"),
            fallback_labels: ["not_snoring".to_string(), "snoring".to_string()],
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_detection_history: 50,
            max_activity_log: 200,
        }
    }
}

impl AudioConfig {
    /// Samples in one clip at the configured rate.
    #[must_use]
    pub fn clip_samples(&self) -> usize {
        self.sample_rate as usize * self.clip_secs as usize
    }

    #[must_use]
    pub fn clip_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.clip_secs))
    }
}

impl DetectionConfig {
    /// `true` when `label` belongs to the configured positive set.
    #[must_use]
    pub fn is_positive(&self, label: &str) -> bool {
        self.positive_labels.iter().any(|l| l == label)
    }
}

impl SequenceConfig {
    #[must_use]
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    #[must_use]
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    #[must_use]
    pub fn stop_join_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_join_timeout_secs)
    }
}

/// Valid range for the auto-run delay, minutes.
pub const DETECTION_DELAY_RANGE: std::ops::RangeInclusive<u32> = 1..=60;

impl SystemConfig {
    /// Reject out-of-range values. Nothing is clamped.
    ///
    /// # Errors
    /// Returns [`CoreError::Config`] naming the first invalid field.
    pub fn validate(&self) -> Result<(), CoreError> {
        let invalid = |msg: &str| Err(CoreError::Config(msg.to_string()));

        if self.audio.sample_rate < 8000 {
            return invalid("audio.sample_rate must be at least 8000 Hz");
        }
        if self.audio.clip_secs == 0 {
            return invalid("audio.clip_secs must be positive");
        }
        if self.audio.n_mels == 0 {
            return invalid("audio.n_mels must be positive");
        }
        if self.audio.fmax_hz <= 0.0 {
            return invalid("audio.fmax_hz must be positive");
        }
        if !(0.0..=100.0).contains(&self.detection.confidence_threshold) {
            return invalid("detection.confidence_threshold must lie in 0..=100");
        }
        if !DETECTION_DELAY_RANGE.contains(&self.detection.detection_delay_minutes) {
            return invalid("detection.detection_delay_minutes must lie in 1..=60");
        }
        if self.detection.positive_labels.is_empty() {
            return invalid("detection.positive_labels must not be empty");
        }
        if self.sequence.tick_ms == 0 {
            return invalid("sequence.tick_ms must be positive");
        }
        if self.sequence.progress_every_secs == 0 {
            return invalid("sequence.progress_every_secs must be positive");
        }
        if self.store.max_detection_history == 0 || self.store.max_activity_log == 0 {
            return invalid("store capacities must be positive");
        }
        Ok(())
    }
}

/// Load a TOML file over the defaults and validate it.
///
/// # Errors
/// Returns an error if the file cannot be read, parsed, or fails validation.
///
/// # Example
/// ```no_run
/// use sp_core::config::load_config;
/// use std::path::Path;
/// let config = load_config(Path::new("config/default.toml")).unwrap();
/// ```
pub fn load_config(path: &Path) -> Result<SystemConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read {}", path.display()))?;

    let config: SystemConfig = toml::from_str(&content)
        .with_context(|| format!("TOML parse error in {}", path.display()))?;

    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;
    Ok(config)
}
