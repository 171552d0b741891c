//! Filtered-noise branch of the synthesizer.
//!
//! Each frame takes a hop-sized block of white noise and shapes it in
//! the frequency domain with the frame's band magnitudes (one-sided
//! spectrum of a hop-length FFT, `hop/2 + 1` bands). The noise source
//! is a seeded ChaCha8 stream, so rendering identical inputs is
//! bit-reproducible.

use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

/// Frequency-domain noise shaper.
///
/// Pre-plans the forward and inverse FFTs on construction; call
/// [`NoiseSynth::render`] per request.
pub struct NoiseSynth {
    hop_size: usize,
    seed: u64,
    fft: Arc<dyn Fft<f32>>,
    ifft: Arc<dyn Fft<f32>>,
}

impl NoiseSynth {
    pub fn new(hop_size: usize, seed: u64) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(hop_size);
        let ifft = planner.plan_fft_inverse(hop_size);
        Self {
            hop_size,
            seed,
            fft,
            ifft,
        }
    }

    /// Number of one-sided spectrum bands per frame.
    pub fn num_bands(&self) -> usize {
        self.hop_size / 2 + 1
    }

    /// Render filtered noise.
    ///
    /// - `magnitudes`: row-major `[num_frames, num_bands]` band gains
    /// - `gain`: per-frame linear amplitude, `[num_frames]`
    ///
    /// Returns `num_frames * hop_size` samples. The caller guarantees
    /// the inputs agree in frame count.
    pub fn render(&self, magnitudes: &[f32], gain: &[f32]) -> Vec<f32> {
        let bands = self.num_bands();
        let num_frames = gain.len();
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut out = Vec::with_capacity(num_frames * self.hop_size);
        let mut buf = vec![Complex::new(0.0f32, 0.0); self.hop_size];

        for frame in 0..num_frames {
            for slot in buf.iter_mut() {
                *slot = Complex::new(rng.gen_range(-1.0f32..1.0), 0.0);
            }
            self.fft.process(&mut buf);

            // Shape the one-sided spectrum; mirror interior bins to keep
            // the signal real after the inverse transform.
            let row = &magnitudes[frame * bands..(frame + 1) * bands];
            for (bin, &mag) in row.iter().enumerate() {
                buf[bin] = buf[bin] * mag;
                if bin > 0 && bin < bands - 1 {
                    let mirror = self.hop_size - bin;
                    buf[mirror] = buf[mirror] * mag;
                }
            }

            self.ifft.process(&mut buf);
            // rustfft leaves the inverse unnormalized.
            let scale = gain[frame] / self.hop_size as f32;
            out.extend(buf.iter().map(|c| c.re * scale));
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_length() {
        let synth = NoiseSynth::new(64, 1);
        let frames = 5;
        let mags = vec![1.0f32; frames * synth.num_bands()];
        let gain = vec![1.0f32; frames];
        assert_eq!(synth.render(&mags, &gain).len(), frames * 64);
    }

    #[test]
    fn rendering_is_deterministic() {
        let synth = NoiseSynth::new(64, 7);
        let frames = 3;
        let mags = vec![0.5f32; frames * synth.num_bands()];
        let gain = vec![0.25f32; frames];
        let a = synth.render(&mags, &gain);
        let b = synth.render(&mags, &gain);
        assert_eq!(a, b);
    }

    #[test]
    fn different_seeds_differ() {
        let frames = 2;
        let a = NoiseSynth::new(64, 1);
        let b = NoiseSynth::new(64, 2);
        let mags = vec![1.0f32; frames * a.num_bands()];
        let gain = vec![1.0f32; frames];
        assert_ne!(a.render(&mags, &gain), b.render(&mags, &gain));
    }

    #[test]
    fn zero_magnitudes_give_silence() {
        let synth = NoiseSynth::new(64, 3);
        let frames = 4;
        let mags = vec![0.0f32; frames * synth.num_bands()];
        let gain = vec![1.0f32; frames];
        assert!(synth.render(&mags, &gain).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn flat_spectrum_roundtrips_the_noise() {
        // With all band gains at 1 the filter is the identity, so the
        // output is the raw noise block itself.
        let synth = NoiseSynth::new(8, 11);
        let mags = vec![1.0f32; synth.num_bands()];
        let gain = vec![1.0f32];
        let out = synth.render(&mags, &gain);

        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for (n, &s) in out.iter().enumerate() {
            let expected: f32 = rng.gen_range(-1.0f32..1.0);
            assert!((s - expected).abs() < 1e-5, "sample {n}: {s} vs {expected}");
        }
    }
}
