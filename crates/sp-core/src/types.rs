use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Opaque identifier of the user on whose behalf an operation runs.
pub type UserId = u64;

/// Feature pipeline family the loaded model was recognised as.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelVariant {
    /// Flat 40-coefficient cepstral summary.
    Legacy,
    /// Time-major mel-band matrix.
    Improved,
    /// Shape not recognised; extraction falls back to the legacy pipeline.
    #[default]
    Unknown,
}

impl ModelVariant {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Improved => "improved",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Orchestrator state as published in the status snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Capturing,
    Classifying,
    Stage1,
    Interval,
    Stage2,
    /// Manual pillow adjustment or deflation.
    Manual,
    ShuttingDown,
}

/// Point-in-time copy of the system flags.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct SystemStatus {
    pub recording: bool,
    /// Any pump currently energised.
    pub pump: bool,
    pub auto_run: bool,
    pub detection_delay_minutes: u32,
    pub model_loaded: bool,
    pub actuator_ready: bool,
    pub sequence_active: bool,
    pub phase: Phase,
    pub model_variant: ModelVariant,
}

impl SystemStatus {
    #[must_use]
    pub fn new(detection_delay_minutes: u32) -> Self {
        Self {
            recording: false,
            pump: false,
            auto_run: false,
            detection_delay_minutes,
            model_loaded: false,
            actuator_ready: false,
            sequence_active: false,
            phase: Phase::Idle,
            model_variant: ModelVariant::Unknown,
        }
    }

    /// A capture or an actuation sequence is in progress.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.recording || self.sequence_active
    }
}

/// Partial status update; `None` fields are left untouched.
#[derive(Clone, Debug, Default)]
pub struct StatusUpdate {
    pub recording: Option<bool>,
    pub pump: Option<bool>,
    pub auto_run: Option<bool>,
    pub detection_delay_minutes: Option<u32>,
    pub model_loaded: Option<bool>,
    pub actuator_ready: Option<bool>,
    pub sequence_active: Option<bool>,
    pub phase: Option<Phase>,
    pub model_variant: Option<ModelVariant>,
}

impl StatusUpdate {
    pub(crate) fn apply(self, status: &mut SystemStatus) {
        if let Some(v) = self.recording {
            status.recording = v;
        }
        if let Some(v) = self.pump {
            status.pump = v;
        }
        if let Some(v) = self.auto_run {
            status.auto_run = v;
        }
        if let Some(v) = self.detection_delay_minutes {
            status.detection_delay_minutes = v;
        }
        if let Some(v) = self.model_loaded {
            status.model_loaded = v;
        }
        if let Some(v) = self.actuator_ready {
            status.actuator_ready = v;
        }
        if let Some(v) = self.sequence_active {
            status.sequence_active = v;
        }
        if let Some(v) = self.phase {
            status.phase = v;
        }
        if let Some(v) = self.model_variant {
            status.model_variant = v;
        }
    }
}

/// Output of one classification.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ClassificationResult {
    pub label: String,
    pub class_index: usize,
    /// Percent, 0..=100.
    pub confidence: f32,
    pub model_variant: ModelVariant,
}

/// One entry of the bounded detection history.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct DetectionRecord {
    pub timestamp: DateTime<Local>,
    pub label: String,
    pub confidence: f32,
    pub model_variant: ModelVariant,
    pub audio_ref: PathBuf,
    pub actuation_triggered: bool,
}

impl DetectionRecord {
    #[must_use]
    pub fn new(result: &ClassificationResult, audio_ref: PathBuf, actuation_triggered: bool) -> Self {
        Self {
            timestamp: Local::now(),
            label: result.label.clone(),
            confidence: result.confidence,
            model_variant: result.model_variant,
            audio_ref,
            actuation_triggered,
        }
    }
}

/// One line of the bounded activity log.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ActivityLogEntry {
    pub timestamp: DateTime<Local>,
    pub message: String,
}
