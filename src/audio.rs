//! Audio DSP and I/O: oscillator bank, filtered noise, WAV files.

pub mod harmonic;
pub mod noise;
pub mod wav;

pub use harmonic::{db_to_amplitude, hz_to_midi, midi_to_hz};
pub use wav::{peak_normalize, read_wav, write_wav};
