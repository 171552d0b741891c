//! Harmonic oscillator bank.
//!
//! The f0 contour drives a bank of harmonically related sinusoids.
//! Per-frame controls (fundamental, overall amplitude, normalized
//! harmonic distribution) are linearly interpolated up to sample rate,
//! phase is accumulated per harmonic, and any harmonic that would land
//! at or above Nyquist is silenced.

/// Convert a (fractional) MIDI note number to Hz. 69 ↦ 440 Hz.
pub fn midi_to_hz(note: f32) -> f32 {
    440.0 * ((note - 69.0) / 12.0).exp2()
}

/// Convert Hz to a fractional MIDI note number.
pub fn hz_to_midi(hz: f32) -> f32 {
    69.0 + 12.0 * (hz / 440.0).log2()
}

/// Convert decibels to linear amplitude. 0 dB ↦ 1.0.
pub fn db_to_amplitude(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// Linearly upsample frame-rate values to sample rate.
///
/// Interpolates between consecutive frames and holds the final frame,
/// so the output has exactly `frames.len() * hop_size` values.
pub fn upsample(frames: &[f32], hop_size: usize) -> Vec<f32> {
    let n = frames.len();
    let mut out = Vec::with_capacity(n * hop_size);
    for i in 0..n {
        let a = frames[i];
        let b = if i + 1 < n { frames[i + 1] } else { frames[i] };
        for k in 0..hop_size {
            let t = k as f32 / hop_size as f32;
            out.push(a + (b - a) * t);
        }
    }
    out
}

/// Render the harmonic branch of the synthesizer.
///
/// - `f0_hz`: per-frame fundamental, `[num_frames]`
/// - `amplitude`: per-frame overall linear amplitude, `[num_frames]`
/// - `distribution`: per-frame harmonic weights, row-major
///   `[num_frames, num_harmonics]`, expected to sum to ~1 per frame
///
/// Returns `num_frames * hop_size` samples. The caller guarantees the
/// inputs agree in frame count.
pub fn render_harmonics(
    f0_hz: &[f32],
    amplitude: &[f32],
    distribution: &[f32],
    num_harmonics: usize,
    hop_size: usize,
    sample_rate: u32,
) -> Vec<f32> {
    let num_frames = f0_hz.len();
    let num_samples = num_frames * hop_size;
    let nyquist = sample_rate as f32 / 2.0;
    let sr = sample_rate as f64;

    let f0_up = upsample(f0_hz, hop_size);
    let amp_up = upsample(amplitude, hop_size);

    // Per-harmonic running phase, accumulated in f64 and wrapped each
    // sample to keep precision over long notes.
    let mut phases = vec![0.0f64; num_harmonics];
    let mut out = Vec::with_capacity(num_samples);

    for n in 0..num_samples {
        let f0 = f0_up[n];
        let amp = amp_up[n];

        // Harmonic weights interpolated on the fly between frames.
        let frame = n / hop_size;
        let frac = (n % hop_size) as f32 / hop_size as f32;
        let row = &distribution[frame * num_harmonics..(frame + 1) * num_harmonics];
        let next_row = if frame + 1 < num_frames {
            &distribution[(frame + 1) * num_harmonics..(frame + 2) * num_harmonics]
        } else {
            row
        };

        let mut sample = 0.0f32;
        for k in 0..num_harmonics {
            let harmonic_hz = f0 * (k + 1) as f32;
            let phase = phases[k] + std::f64::consts::TAU * harmonic_hz as f64 / sr;
            phases[k] = phase % std::f64::consts::TAU;
            if harmonic_hz >= nyquist {
                continue;
            }
            let weight = row[k] + (next_row[k] - row[k]) * frac;
            sample += weight * phases[k].sin() as f32;
        }
        out.push(amp * sample);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn midi_reference_points() {
        assert!((midi_to_hz(69.0) - 440.0).abs() < 1e-3);
        assert!((midi_to_hz(60.0) - 261.6256).abs() < 1e-3);
        assert!((midi_to_hz(9.0) - 12.9783).abs() < 1e-3);
        // Round trip
        for note in [9.0f32, 60.0, 69.0, 120.0] {
            assert!((hz_to_midi(midi_to_hz(note)) - note).abs() < 1e-4);
        }
    }

    #[test]
    fn db_reference_points() {
        assert!((db_to_amplitude(0.0) - 1.0).abs() < 1e-7);
        assert!((db_to_amplitude(-20.0) - 0.1).abs() < 1e-7);
        assert!((db_to_amplitude(-120.0) - 1e-6).abs() < 1e-9);
    }

    #[test]
    fn upsample_length_and_endpoints() {
        let up = upsample(&[0.0, 1.0, 1.0], 4);
        assert_eq!(up.len(), 12);
        assert_eq!(up[0], 0.0);
        assert!((up[2] - 0.5).abs() < 1e-7); // halfway into the first hop
        assert_eq!(up[4], 1.0);
        assert_eq!(up[11], 1.0); // last frame held
    }

    #[test]
    fn single_harmonic_is_a_sine() {
        let frames = 10;
        let hop = 64;
        let sr = 16_000;
        let f0 = vec![440.0f32; frames];
        let amp = vec![1.0f32; frames];
        // All weight on the fundamental.
        let mut dist = vec![0.0f32; frames * 4];
        for f in 0..frames {
            dist[f * 4] = 1.0;
        }
        let audio = render_harmonics(&f0, &amp, &dist, 4, hop, sr);
        assert_eq!(audio.len(), frames * hop);

        // Compare against a directly computed sine. Phase accumulation
        // starts one step in, so sample n corresponds to phase (n+1)·ω.
        for (n, &s) in audio.iter().enumerate().take(200) {
            let expected = (std::f64::consts::TAU * 440.0 * (n + 1) as f64 / sr as f64).sin();
            assert!(
                (s as f64 - expected).abs() < 1e-4,
                "sample {n}: {s} vs {expected}"
            );
        }
    }

    #[test]
    fn harmonics_above_nyquist_are_silent() {
        let frames = 4;
        let hop = 64;
        let sr = 16_000;
        // f0 = 5 kHz: harmonic 2 is 10 kHz, above the 8 kHz Nyquist.
        let f0 = vec![5_000.0f32; frames];
        let amp = vec![1.0f32; frames];
        // All weight on harmonic 2 — everything must be masked.
        let mut dist = vec![0.0f32; frames * 2];
        for f in 0..frames {
            dist[f * 2 + 1] = 1.0;
        }
        let audio = render_harmonics(&f0, &amp, &dist, 2, hop, sr);
        assert!(audio.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn zero_amplitude_is_silence() {
        let f0 = vec![440.0f32; 8];
        let amp = vec![0.0f32; 8];
        let dist = vec![1.0f32; 8];
        let audio = render_harmonics(&f0, &amp, &dist, 1, 16, 16_000);
        assert!(audio.iter().all(|&s| s == 0.0));
    }
}
