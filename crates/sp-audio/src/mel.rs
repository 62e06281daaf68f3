//! Mel filterbank, decibel conversion and cepstral coefficients.
//!
//! Conventions follow the common Slaney mel scale with area-normalised
//! triangular filters, which is what most pretrained audio classifiers
//! were fed during training.

use ndarray::{Array1, Array2, Axis};

use crate::stft::Stft;

/// Floor applied before taking logarithms.
pub const AMIN: f32 = 1e-10;
/// Dynamic range kept by [`power_to_db`].
pub const TOP_DB: f32 = 80.0;

const F_SP: f32 = 200.0 / 3.0;
const MIN_LOG_HZ: f32 = 1000.0;
const MIN_LOG_MEL: f32 = MIN_LOG_HZ / F_SP;

fn log_step() -> f32 {
    6.4f32.ln() / 27.0
}

#[must_use]
pub fn hz_to_mel(hz: f32) -> f32 {
    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / log_step()
    } else {
        hz / F_SP
    }
}

#[must_use]
pub fn mel_to_hz(mel: f32) -> f32 {
    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    } else {
        F_SP * mel
    }
}

/// `10·log10(max(p, AMIN))`.
#[inline]
#[must_use]
pub fn power_to_db_scalar(power: f32) -> f32 {
    10.0 * power.max(AMIN).log10()
}

/// Convert a power matrix to dB relative to `reference`, keeping at most
/// [`TOP_DB`] of dynamic range below the loudest cell.
pub fn power_to_db(power: &mut Array2<f32>, reference: f32) {
    let ref_db = power_to_db_scalar(reference);
    power.mapv_inplace(|p| power_to_db_scalar(p) - ref_db);
    let max = power.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let floor = max - TOP_DB;
    power.mapv_inplace(|v| v.max(floor));
}

/// One triangular filter, stored as its non-zero bin span.
struct Filter {
    start: usize,
    weights: Vec<f32>,
}

/// Triangular mel filterbank applied to power spectra.
pub struct MelFilterbank {
    filters: Vec<Filter>,
    bins: usize,
}

impl MelFilterbank {
    /// Build `n_mels` filters between `fmin` and `fmax` for an `n_fft`
    /// spectrum at `sample_rate`.
    #[must_use]
    pub fn new(sample_rate: u32, n_fft: usize, n_mels: usize, fmin: f32, fmax: f32) -> Self {
        let bins = n_fft / 2 + 1;
        let nyquist = sample_rate as f32 / 2.0;
        let fmax = fmax.min(nyquist);
        let fft_freqs: Vec<f32> = (0..bins).map(|i| i as f32 * nyquist / (bins - 1) as f32).collect();

        let mel_min = hz_to_mel(fmin);
        let mel_max = hz_to_mel(fmax);
        let mel_f: Vec<f32> = (0..n_mels + 2)
            .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * i as f32 / (n_mels + 1) as f32))
            .collect();

        let filters = (0..n_mels)
            .map(|m| {
                let (lo, centre, hi) = (mel_f[m], mel_f[m + 1], mel_f[m + 2]);
                let enorm = 2.0 / (hi - lo);
                let weights: Vec<f32> = fft_freqs
                    .iter()
                    .map(|&f| {
                        let lower = (f - lo) / (centre - lo);
                        let upper = (hi - f) / (hi - centre);
                        lower.min(upper).max(0.0) * enorm
                    })
                    .collect();
                let start = weights.iter().position(|w| *w > 0.0).unwrap_or(bins);
                let end = weights.iter().rposition(|w| *w > 0.0).map_or(start, |e| e + 1);
                Filter {
                    start,
                    weights: weights[start..end].to_vec(),
                }
            })
            .collect();

        Self { filters, bins }
    }

    #[must_use]
    pub fn n_mels(&self) -> usize {
        self.filters.len()
    }

    /// Apply to time-major power frames; returns `(frames, n_mels)`.
    #[must_use]
    pub fn apply(&self, frames: &[Vec<f32>]) -> Array2<f32> {
        let mut out = Array2::zeros((frames.len(), self.filters.len()));
        for (mut row, frame) in out.axis_iter_mut(Axis(0)).zip(frames) {
            debug_assert_eq!(frame.len(), self.bins);
            for (cell, filter) in row.iter_mut().zip(&self.filters) {
                *cell = filter
                    .weights
                    .iter()
                    .zip(&frame[filter.start..])
                    .map(|(w, p)| w * p)
                    .sum();
            }
        }
        out
    }
}

/// Mel power spectrogram, time-major `(frames, n_mels)`.
#[must_use]
pub fn mel_spectrogram(
    samples: &[f32],
    sample_rate: u32,
    n_fft: usize,
    hop: usize,
    n_mels: usize,
    fmax: f32,
) -> Array2<f32> {
    let mut stft = Stft::new(n_fft, hop);
    let frames = stft.power_frames(samples);
    MelFilterbank::new(sample_rate, n_fft, n_mels, 0.0, fmax).apply(&frames)
}

/// Orthonormal DCT-II along the band axis, keeping the first `n_coeffs`.
#[must_use]
pub fn dct_ortho(log_mel: &Array2<f32>, n_coeffs: usize) -> Array2<f32> {
    let (frames, n) = log_mel.dim();
    let n_f = n as f32;
    let basis = Array2::from_shape_fn((n_coeffs, n), |(k, i)| {
        let scale = if k == 0 { (1.0 / n_f).sqrt() } else { (2.0 / n_f).sqrt() };
        scale * (std::f32::consts::PI * k as f32 * (2.0 * i as f32 + 1.0) / (2.0 * n_f)).cos()
    });
    let mut out = Array2::zeros((frames, n_coeffs));
    for (mut row, bands) in out.axis_iter_mut(Axis(0)).zip(log_mel.axis_iter(Axis(0))) {
        row.assign(&basis.dot(&bands));
    }
    out
}

/// Time-averaged MFCC vector.
///
/// Uses `n_mels` bands over the full spectrum, dB with unit reference.
#[must_use]
pub fn mfcc_mean(samples: &[f32], sample_rate: u32, n_fft: usize, hop: usize, n_mels: usize, n_mfcc: usize) -> Array1<f32> {
    let mut mel = mel_spectrogram(samples, sample_rate, n_fft, hop, n_mels, sample_rate as f32 / 2.0);
    power_to_db(&mut mel, 1.0);
    let coeffs = dct_ortho(&mel, n_mfcc);
    coeffs
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(n_mfcc))
}
