//! Audio buffer and I/O utilities

mod buffer;
mod io;

pub use buffer::{peak, AudioBuffer};
pub use io::{read_mono_wav, write_pcm16_wav, WavData};
