/// Snore classification: model port, shape-based pipeline selection,
/// feature extraction, and label resolution.

pub mod classifier;
pub mod engine;
pub mod error;
pub mod features;
pub mod labels;
#[cfg(feature = "onnx")]
pub mod onnx;

pub use classifier::{Classifier, detect_variant};
pub use engine::InferenceEngine;
pub use error::InferenceError;
pub use features::FeatureExtractor;
pub use labels::LabelTable;
#[cfg(feature = "onnx")]
pub use onnx::OnnxClassifier;
