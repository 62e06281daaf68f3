//! ONNX Runtime backend.

use std::path::Path;

use anyhow::{Context, Result, bail};
use ndarray::ArrayViewD;
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::{Tensor, ValueType};

use crate::classifier::Classifier;

/// Classifier backed by an exported `.onnx` graph with one input and one
/// output.
pub struct OnnxClassifier {
    session: Session,
    input_shape: Vec<Option<usize>>,
}

impl OnnxClassifier {
    /// Load and optimize the graph at `path`.
    ///
    /// # Errors
    /// Returns an error if the file is missing, cannot be parsed, or its
    /// first input is not a tensor.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!("Model file not found: {}", path.display());
        }
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(1)?
            .commit_from_file(path)
            .with_context(|| format!("Cannot load model: {}", path.display()))?;

        let input = session.inputs.first().context("Model declares no inputs")?;
        let ValueType::Tensor { dimensions, .. } = &input.input_type else {
            bail!("Model input '{}' is not a tensor", input.name);
        };
        let input_shape = dimensions
            .iter()
            .map(|&d| usize::try_from(d).ok().filter(|n| *n > 0))
            .collect();
        Ok(Self { session, input_shape })
    }
}

impl Classifier for OnnxClassifier {
    fn input_shape(&self) -> Vec<Option<usize>> {
        self.input_shape.clone()
    }

    fn predict(&mut self, input: ArrayViewD<'_, f32>) -> Result<Vec<f32>> {
        let shape: Vec<usize> = input.shape().to_vec();
        let batch = shape.first().copied().unwrap_or(1).max(1);
        let data: Vec<f32> = input.iter().copied().collect();
        let tensor = Tensor::from_array((shape, data))?;

        let outputs = self.session.run(ort::inputs![tensor]?)?;
        let (_, scores) = outputs[0].try_extract_raw_tensor::<f32>()?;
        let per_item = scores.len() / batch;
        Ok(scores[..per_item].to_vec())
    }
}
