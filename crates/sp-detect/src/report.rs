use std::path::PathBuf;

use serde::Serialize;
use sp_core::{ClassificationResult, ModelVariant};

/// Outcome of one capture→classify cycle.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CycleReport {
    pub result: ClassificationResult,
    pub audio_path: PathBuf,
    /// Positive label above the confidence threshold.
    pub detected: bool,
    /// This cycle started the actuation sequence.
    pub triggered: bool,
}

/// Static description of the running system.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SystemInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub model_path: PathBuf,
    pub model_loaded: bool,
    pub model_variant: ModelVariant,
    pub actuator_ready: bool,
    pub confidence_threshold: f32,
    pub positive_labels: Vec<String>,
    pub stage1_secs: u64,
    pub interval_secs: u64,
    pub stage2_secs: u64,
}

/// Operator-adjustable settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub auto_run: bool,
    pub detection_delay_minutes: u32,
}
