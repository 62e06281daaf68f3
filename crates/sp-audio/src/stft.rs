use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};

/// Short-time power spectrum using realfft.
///
/// Pre-allocates the FFT plan, window and scratch buffers once; each frame
/// reuses them. Frames are centred on `i * hop` with zero padding of
/// `n_fft / 2` at both ends.
///
/// # Example
/// ```
/// use sp_audio::stft::Stft;
/// let mut stft = Stft::new(256, 64);
/// let frames = stft.power_frames(&vec![0.0f32; 1024]);
/// assert_eq!(frames.len(), 1 + 1024 / 64);
/// assert_eq!(frames[0].len(), 129); // N/2 + 1
/// ```
pub struct Stft {
    n_fft: usize,
    hop: usize,
    input_buf: Vec<f32>,
    spectrum_buf: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    plan: Arc<dyn RealToComplex<f32>>,
    /// Periodic Hann window.
    window: Vec<f32>,
}

impl Stft {
    /// # Panics
    /// Panics if `n_fft` or `hop` is 0.
    #[must_use]
    pub fn new(n_fft: usize, hop: usize) -> Self {
        assert!(n_fft > 0 && hop > 0, "STFT size and hop must be > 0");

        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(n_fft);

        let window = (0..n_fft)
            .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / n_fft as f32).cos())
            .collect();

        Self {
            n_fft,
            hop,
            input_buf: plan.make_input_vec(),
            spectrum_buf: plan.make_output_vec(),
            scratch: plan.make_scratch_vec(),
            plan,
            window,
        }
    }

    /// Number of frequency bins per frame.
    #[must_use]
    pub fn bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    #[must_use]
    pub fn n_fft(&self) -> usize {
        self.n_fft
    }

    /// Power spectrum `|X|²` of every frame, time-major.
    pub fn power_frames(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        let n_frames = 1 + samples.len() / self.hop;
        let half = self.n_fft / 2;
        let mut frames = Vec::with_capacity(n_frames);

        for i in 0..n_frames {
            let centre = i * self.hop;
            for (k, slot) in self.input_buf.iter_mut().enumerate() {
                // Index into the virtually zero-padded signal.
                let idx = (centre + k).checked_sub(half);
                let sample = idx.and_then(|j| samples.get(j)).copied().unwrap_or(0.0);
                *slot = sample * self.window[k];
            }

            if self
                .plan
                .process_with_scratch(&mut self.input_buf, &mut self.spectrum_buf, &mut self.scratch)
                .is_err()
            {
                frames.push(vec![0.0; self.spectrum_buf.len()]);
                continue;
            }

            frames.push(self.spectrum_buf.iter().map(Complex::norm_sqr).collect());
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tone_peaks_at_expected_bin() {
        let sr = 8000.0;
        let n_fft = 512;
        let freq = 1000.0;
        let samples: Vec<f32> = (0..4096)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sr).sin())
            .collect();

        let mut stft = Stft::new(n_fft, 128);
        let frames = stft.power_frames(&samples);
        let mid = &frames[frames.len() / 2];
        let (argmax, _) = mid
            .iter()
            .enumerate()
            .fold((0, 0.0f32), |best, (i, &p)| if p > best.1 { (i, p) } else { best });

        let expected = (freq / sr * n_fft as f32).round() as usize;
        assert_eq!(argmax, expected);
    }

    #[test]
    fn silence_has_zero_power() {
        let mut stft = Stft::new(64, 16);
        let frames = stft.power_frames(&[0.0; 200]);
        assert!(frames.iter().flatten().all(|p| *p == 0.0));
    }
}
