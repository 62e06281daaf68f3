use ndarray::ArrayViewD;
use sp_core::ModelVariant;

/// Number of cepstral coefficients the legacy pipeline produces.
pub const LEGACY_FEATURES: usize = 40;

/// A loaded model able to score one batched feature tensor.
pub trait Classifier: Send {
    /// Declared input shape, batch axis first; `None` marks a dynamic axis.
    fn input_shape(&self) -> Vec<Option<usize>>;

    /// Forward pass; returns the scores of the first batch item.
    ///
    /// # Errors
    /// Returns an error if the backend rejects the input or fails.
    fn predict(&mut self, input: ArrayViewD<'_, f32>) -> anyhow::Result<Vec<f32>>;
}

/// Pick the feature pipeline family from a declared input shape.
///
/// | shape | variant |
/// |---|---|
/// | `(batch, 40)` | legacy |
/// | `(batch, time, mels)` | improved |
/// | `(batch, n)`, n ≠ 40 | unknown |
/// | anything else | legacy |
///
/// # Example
/// ```
/// use sp_core::ModelVariant;
/// use sp_infer::detect_variant;
/// assert_eq!(detect_variant(&[None, Some(40)]), ModelVariant::Legacy);
/// assert_eq!(detect_variant(&[None, None, Some(128)]), ModelVariant::Improved);
/// ```
#[must_use]
pub fn detect_variant(shape: &[Option<usize>]) -> ModelVariant {
    match shape {
        [_, Some(LEGACY_FEATURES)] => ModelVariant::Legacy,
        [_, _] => ModelVariant::Unknown,
        [_, _, _] => ModelVariant::Improved,
        _ => ModelVariant::Legacy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shapes_map_to_variants() {
        assert_eq!(detect_variant(&[None, Some(40)]), ModelVariant::Legacy);
        assert_eq!(detect_variant(&[Some(1), Some(40)]), ModelVariant::Legacy);
        assert_eq!(detect_variant(&[None, Some(13)]), ModelVariant::Unknown);
        assert_eq!(detect_variant(&[None, None]), ModelVariant::Unknown);
        assert_eq!(detect_variant(&[None, Some(216), Some(128)]), ModelVariant::Improved);
        assert_eq!(detect_variant(&[None, Some(128), Some(216), Some(1)]), ModelVariant::Legacy);
        assert_eq!(detect_variant(&[Some(40)]), ModelVariant::Legacy);
        assert_eq!(detect_variant(&[]), ModelVariant::Legacy);
    }
}
