use std::path::PathBuf;

use thiserror::Error;

/// Errors originating from classification.
#[derive(Error, Debug)]
pub enum InferenceError {
    /// Clip file does not exist.
    #[error("Audio file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Clip decoded to zero samples.
    #[error("Empty audio file")]
    EmptyClip,

    /// Feature extraction produced nothing to classify.
    #[error("Feature extraction produced no values")]
    EmptyFeatures,

    /// No model was loaded at startup.
    #[error("Model is not loaded")]
    ModelUnloaded,

    /// Clip could not be decoded.
    #[error("Cannot decode clip: {0}")]
    Decode(String),

    /// Forward pass failed or returned unusable output.
    #[error("Prediction failed: {0}")]
    Model(String),
}
