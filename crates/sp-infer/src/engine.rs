use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use ndarray::Axis;
use sp_core::config::{AudioConfig, ModelConfig};
use sp_core::{ClassificationResult, ModelVariant, SharedStateStore, StatusUpdate};

use crate::classifier::{Classifier, detect_variant};
use crate::error::InferenceError;
use crate::features::FeatureExtractor;
use crate::labels::{LabelTable, load_metadata};

/// Score above which a single-output model calls the positive class.
pub const BINARY_THRESHOLD: f32 = 0.5;

/// Classifies clip files with a model loaded once at startup.
///
/// The model's declared input shape selects the feature pipeline. One
/// prediction runs at a time; concurrent callers wait on the engine mutex.
pub struct InferenceEngine {
    model: Option<Mutex<Box<dyn Classifier>>>,
    extractor: FeatureExtractor,
    input_shape: Vec<Option<usize>>,
    labels: Option<LabelTable>,
    fallback_labels: [String; 2],
    metadata: Option<serde_json::Value>,
    model_path: PathBuf,
    store: Arc<SharedStateStore>,
}

impl InferenceEngine {
    /// Wrap the outcome of loading the model.
    ///
    /// A load failure is recorded in the status and activity log; the
    /// engine then rejects every prediction with
    /// [`InferenceError::ModelUnloaded`]. The optional label mapping and
    /// metadata files are read here; problems with them are logged and
    /// ignored.
    #[must_use]
    pub fn new(
        loaded: anyhow::Result<Box<dyn Classifier>>,
        audio: &AudioConfig,
        model_config: &ModelConfig,
        store: Arc<SharedStateStore>,
    ) -> Self {
        let (model, input_shape, variant) = match loaded {
            Ok(model) => {
                let shape = model.input_shape();
                let variant = detect_variant(&shape);
                log::info!("Model input shape: {}", format_shape(&shape));
                if variant == ModelVariant::Unknown {
                    log::warn!("Unknown model type, falling back to legacy features");
                }
                store.update_status(StatusUpdate {
                    model_loaded: Some(true),
                    model_variant: Some(variant),
                    ..StatusUpdate::default()
                });
                store.append_log(format!("AI model loaded successfully (Type: {variant})"));
                (Some(Mutex::new(model)), shape, variant)
            }
            Err(e) => {
                log::error!("Model loading failed: {e:#}");
                store.update_status(StatusUpdate {
                    model_loaded: Some(false),
                    ..StatusUpdate::default()
                });
                store.append_log(format!("Model loading failed: {e:#}"));
                (None, Vec::new(), ModelVariant::Unknown)
            }
        };

        let labels = if model_config.label_mapping.exists() {
            LabelTable::load(&model_config.label_mapping)
                .inspect(|t| log::info!("Label mapping loaded: {} classes", t.len()))
                .inspect_err(|e| log::warn!("{e:#}"))
                .ok()
        } else {
            None
        };
        let metadata = load_metadata(&model_config.metadata)
            .inspect_err(|e| log::warn!("{e:#}"))
            .ok()
            .flatten();
        if let Some(meta) = &metadata {
            log::info!("Model metadata loaded: {meta}");
        }

        Self {
            model,
            extractor: FeatureExtractor::new(variant, audio, &input_shape),
            input_shape,
            labels,
            fallback_labels: model_config.fallback_labels.clone(),
            metadata,
            model_path: model_config.path.clone(),
            store,
        }
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    #[must_use]
    pub fn variant(&self) -> ModelVariant {
        self.extractor.variant()
    }

    #[must_use]
    pub fn input_shape(&self) -> &[Option<usize>] {
        &self.input_shape
    }

    #[must_use]
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    #[must_use]
    pub fn metadata(&self) -> Option<&serde_json::Value> {
        self.metadata.as_ref()
    }

    /// Classify one clip.
    ///
    /// # Errors
    /// Returns an error if no model is loaded, the file is missing or
    /// undecodable, features are empty, or the forward pass fails. Each
    /// failure is also appended to the activity log.
    pub fn predict(&self, path: &Path) -> Result<ClassificationResult, InferenceError> {
        let model = self.model.as_ref().ok_or(InferenceError::ModelUnloaded)?;
        let mut model = model.lock().unwrap_or_else(PoisonError::into_inner);

        let result = self.run(model.as_mut(), path);
        if let Err(e) = &result {
            self.store.append_log(format!("Prediction failed: {e}"));
        }
        result
    }

    fn run(&self, model: &mut dyn Classifier, path: &Path) -> Result<ClassificationResult, InferenceError> {
        log::debug!("Starting prediction for: {}", path.display());
        if !path.exists() {
            return Err(InferenceError::FileNotFound(path.to_path_buf()));
        }
        let features = self.extractor.extract(path)?;
        let batched = features.insert_axis(Axis(0));

        let scores = model
            .predict(batched.view())
            .map_err(|e| InferenceError::Model(format!("{e:#}")))?;
        log::debug!("Raw prediction: {scores:?}");

        let (class_index, confidence) = decide(&scores)?;
        let label = self.label_for(class_index);
        log::debug!("Class {class_index} ({label}), confidence {confidence:.1}%");

        Ok(ClassificationResult {
            label,
            class_index,
            confidence,
            model_variant: self.variant(),
        })
    }

    fn label_for(&self, class_index: usize) -> String {
        match &self.labels {
            Some(table) => table.resolve(class_index),
            None => self
                .fallback_labels
                .get(class_index)
                .cloned()
                .unwrap_or_else(|| crate::labels::UNKNOWN_LABEL.to_string()),
        }
    }
}

/// Winning class and its confidence in percent.
///
/// A single score is a sigmoid output: class 1 when above
/// [`BINARY_THRESHOLD`], and the confidence is that of the winning side.
/// Several scores are treated as class probabilities.
///
/// # Errors
/// Returns an error for an empty or non-finite score vector.
pub fn decide(scores: &[f32]) -> Result<(usize, f32), InferenceError> {
    if scores.iter().any(|s| !s.is_finite()) {
        return Err(InferenceError::Model(format!("non-finite scores {scores:?}")));
    }
    match scores {
        [] => Err(InferenceError::Model("model returned no scores".into())),
        [p] if *p > BINARY_THRESHOLD => Ok((1, p * 100.0)),
        [p] => Ok((0, (1.0 - p) * 100.0)),
        _ => {
            let (index, p) = scores
                .iter()
                .copied()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |best, (i, p)| if p > best.1 { (i, p) } else { best });
            Ok((index, p * 100.0))
        }
    }
}

fn format_shape(shape: &[Option<usize>]) -> String {
    let dims: Vec<String> = shape
        .iter()
        .map(|d| d.map_or_else(|| "?".to_string(), |n| n.to_string()))
        .collect();
    format!("({})", dims.join(", "))
}
