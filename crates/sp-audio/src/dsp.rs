//! Sample-domain preprocessing shared by capture and feature extraction.

use crate::mel::{AMIN, power_to_db_scalar};

/// Analysis frame used by [`trim_silence`].
pub const TRIM_FRAME: usize = 2048;
/// Hop between [`trim_silence`] frames.
pub const TRIM_HOP: usize = 512;

/// Peak absolute amplitude.
#[must_use]
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max)
}

/// Scale so the largest absolute sample is 1.0. Silent input is left as is.
///
/// # Example
/// ```
/// use sp_audio::dsp::peak_normalize;
/// let mut s = vec![0.25, -0.5, 0.1];
/// peak_normalize(&mut s);
/// assert_eq!(s, vec![0.5, -1.0, 0.2]);
/// ```
pub fn peak_normalize(samples: &mut [f32]) {
    let p = peak(samples);
    if p > 0.0 {
        for s in samples.iter_mut() {
            *s /= p;
        }
    }
}

/// Truncate or zero-pad to exactly `len` samples.
pub fn fit_length(samples: &mut Vec<f32>, len: usize) {
    samples.resize(len, 0.0);
}

/// Strip leading and trailing frames quieter than `top_db` below the
/// loudest frame.
///
/// Frames are `TRIM_FRAME` long, centred every `TRIM_HOP` samples, and
/// zero-padded at the edges. A fully silent clip is returned unchanged.
#[must_use]
pub fn trim_silence(samples: &[f32], top_db: f32) -> &[f32] {
    if samples.is_empty() {
        return samples;
    }
    let energies = frame_mean_square(samples, TRIM_FRAME, TRIM_HOP);
    let reference = energies.iter().copied().fold(0.0f32, f32::max);
    let ref_db = power_to_db_scalar(reference.max(AMIN));

    let loud = |e: &f32| power_to_db_scalar(*e) - ref_db > -top_db;
    let Some(first) = energies.iter().position(loud) else {
        return &samples[..0];
    };
    let last = energies.iter().rposition(loud).unwrap_or(first);

    let start = (first * TRIM_HOP).min(samples.len());
    let end = ((last + 1) * TRIM_HOP).min(samples.len());
    &samples[start..end.max(start)]
}

/// Mean square energy of centred, zero-padded frames.
fn frame_mean_square(samples: &[f32], frame: usize, hop: usize) -> Vec<f32> {
    let n_frames = 1 + samples.len() / hop;
    let half = frame / 2;
    (0..n_frames)
        .map(|i| {
            let centre = i * hop;
            let lo = centre.saturating_sub(half);
            let hi = (centre + half).min(samples.len());
            let sum: f32 = samples[lo..hi].iter().map(|s| s * s).sum();
            sum / frame as f32
        })
        .collect()
}

/// Linear-interpolation resampler.
#[must_use]
pub fn resample_linear(samples: &[f32], from_hz: u32, to_hz: u32) -> Vec<f32> {
    if from_hz == to_hz || samples.is_empty() || from_hz == 0 {
        return samples.to_vec();
    }
    let ratio = f64::from(from_hz) / f64::from(to_hz);
    let out_len = ((samples.len() as f64) / ratio).round() as usize;
    let last = samples.len() - 1;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = pos.floor() as usize;
            if idx >= last {
                return samples[last];
            }
            let frac = (pos - idx as f64) as f32;
            samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(len: usize, amp: f32) -> Vec<f32> {
        (0..len)
            .map(|i| amp * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 16_000.0).sin())
            .collect()
    }

    #[test]
    fn trim_removes_silent_edges() {
        let mut clip = vec![0.0; 8000];
        clip.extend(tone(8000, 0.8));
        clip.extend(vec![0.0; 8000]);

        let trimmed = trim_silence(&clip, 30.0);
        assert!(trimmed.len() < clip.len());
        assert!(trimmed.len() >= 8000);
        // Leading silence mostly gone: the first kept sample lies within two
        // frames of the tone onset.
        let offset = trimmed.as_ptr() as usize - clip.as_ptr() as usize;
        let offset = offset / std::mem::size_of::<f32>();
        assert!(offset > 8000 - 2 * TRIM_FRAME);
    }

    #[test]
    fn stricter_threshold_trims_more() {
        let mut clip = tone(4000, 0.01);
        clip.extend(tone(8000, 1.0));
        clip.extend(tone(4000, 0.01));

        // Quiet edges sit 40 dB down: kept at top_db 60, dropped at 20.
        let loose = trim_silence(&clip, 60.0);
        let strict = trim_silence(&clip, 20.0);
        assert!(strict.len() < loose.len());
    }

    #[test]
    fn silent_clip_is_kept_whole() {
        let clip = vec![0.0; 4096];
        assert_eq!(trim_silence(&clip, 20.0).len(), clip.len());
    }

    #[test]
    fn fit_length_pads_and_truncates() {
        let mut short = vec![1.0; 3];
        fit_length(&mut short, 5);
        assert_eq!(short, vec![1.0, 1.0, 1.0, 0.0, 0.0]);

        let mut long = vec![1.0; 10];
        fit_length(&mut long, 4);
        assert_eq!(long.len(), 4);
    }

    #[test]
    fn silent_normalize_is_noop() {
        let mut s = vec![0.0; 16];
        peak_normalize(&mut s);
        assert!(s.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn resample_halves_length() {
        let s = tone(16_000, 0.5);
        let out = resample_linear(&s, 16_000, 8000);
        assert_eq!(out.len(), 8000);
        assert!((out[100] - s[200]).abs() < 1e-6);
    }
}
