use std::path::Path;

use ndarray::{Array1, Array2, ArrayD, Axis};
use sp_audio::decode::load_clip;
use sp_audio::dsp::{fit_length, peak_normalize, trim_silence};
use sp_audio::mel::{mel_spectrogram, mfcc_mean, power_to_db};
use sp_core::ModelVariant;
use sp_core::config::AudioConfig;

use crate::classifier::LEGACY_FEATURES;
use crate::error::InferenceError;

pub const N_FFT: usize = 2048;
pub const HOP: usize = 512;
/// Mel bands feeding the cepstral transform.
pub const MFCC_MELS: usize = 128;

const LEGACY_TOP_DB: f32 = 30.0;
const IMPROVED_TOP_DB: f32 = 20.0;
const ZSCORE_EPS: f32 = 1e-6;

/// Turns a clip file into the tensor a model variant expects (batch axis
/// not included).
#[derive(Clone, Debug)]
pub struct FeatureExtractor {
    variant: ModelVariant,
    sample_rate: u32,
    clip_samples: usize,
    n_mels: usize,
    fmax: f32,
    /// Fixed time-axis length declared by the model, if any.
    time_steps: Option<usize>,
}

impl FeatureExtractor {
    /// Configure for `variant`. For the improved pipeline, a band count
    /// fixed by the model shape overrides the configured one.
    #[must_use]
    pub fn new(variant: ModelVariant, audio: &AudioConfig, input_shape: &[Option<usize>]) -> Self {
        let (time_steps, n_mels) = match (variant, input_shape) {
            (ModelVariant::Improved, [_, time, mels]) => (*time, mels.unwrap_or(audio.n_mels)),
            _ => (None, audio.n_mels),
        };
        Self {
            variant,
            sample_rate: audio.sample_rate,
            clip_samples: audio.clip_samples(),
            n_mels,
            fmax: audio.fmax_hz,
            time_steps,
        }
    }

    #[must_use]
    pub fn variant(&self) -> ModelVariant {
        self.variant
    }

    #[must_use]
    pub fn n_mels(&self) -> usize {
        self.n_mels
    }

    /// Decode `path` and run the pipeline matching the variant; the unknown
    /// variant uses the legacy pipeline.
    ///
    /// # Errors
    /// Returns an error if the clip cannot be decoded, is empty, or yields
    /// no features.
    pub fn extract(&self, path: &Path) -> Result<ArrayD<f32>, InferenceError> {
        let samples = load_clip(path, self.sample_rate).map_err(|e| InferenceError::Decode(format!("{e:#}")))?;
        if samples.is_empty() {
            return Err(InferenceError::EmptyClip);
        }
        log::debug!("Loaded {} samples @ {}Hz", samples.len(), self.sample_rate);

        let features = match self.variant {
            ModelVariant::Improved => self.improved(&samples).into_dyn(),
            ModelVariant::Legacy | ModelVariant::Unknown => self.legacy(&samples).into_dyn(),
        };
        if features.is_empty() {
            return Err(InferenceError::EmptyFeatures);
        }
        log::debug!("{} features: shape={:?}", self.variant, features.shape());
        Ok(features)
    }

    /// Trim, pad or truncate to the clip length, then peak-normalize.
    fn condition(&self, samples: &[f32], top_db: f32) -> Vec<f32> {
        let mut clip = trim_silence(samples, top_db).to_vec();
        log::debug!("After trim: {} samples", clip.len());
        fit_length(&mut clip, self.clip_samples);
        peak_normalize(&mut clip);
        clip
    }

    /// Time-averaged MFCC vector of length 40.
    #[must_use]
    pub fn legacy(&self, samples: &[f32]) -> Array1<f32> {
        let clip = self.condition(samples, LEGACY_TOP_DB);
        mfcc_mean(&clip, self.sample_rate, N_FFT, HOP, MFCC_MELS, LEGACY_FEATURES)
    }

    /// Standardized log-mel matrix, time-major `(frames, n_mels)`.
    #[must_use]
    pub fn improved(&self, samples: &[f32]) -> Array2<f32> {
        let clip = self.condition(samples, IMPROVED_TOP_DB);
        let mut mel = mel_spectrogram(&clip, self.sample_rate, N_FFT, HOP, self.n_mels, self.fmax);
        let reference = mel.iter().copied().fold(0.0f32, f32::max);
        power_to_db(&mut mel, reference);
        standardize(&mut mel);

        match self.time_steps {
            Some(steps) if steps != mel.nrows() => {
                log::warn!("Model expects {steps} frames, clip has {}; fitting", mel.nrows());
                fit_frames(&mel, steps)
            }
            _ => mel,
        }
    }
}

/// Zero mean, unit variance over the whole matrix.
fn standardize(m: &mut Array2<f32>) {
    let n = m.len().max(1) as f32;
    let mean = m.sum() / n;
    let var = m.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
    let std = var.sqrt();
    m.mapv_inplace(|v| (v - mean) / (std + ZSCORE_EPS));
}

/// Truncate or zero-pad along the time axis.
fn fit_frames(m: &Array2<f32>, steps: usize) -> Array2<f32> {
    let mut out = Array2::zeros((steps, m.ncols()));
    let keep = steps.min(m.nrows());
    out.slice_axis_mut(Axis(0), (0..keep).into())
        .assign(&m.slice_axis(Axis(0), (0..keep).into()));
    out
}
