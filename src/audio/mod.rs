//! Audio byte-level collaborators — WAV framing, PCM helpers, and one-shot
//! microphone utterance capture.
//!
//! ```text
//! Microphone → cpal callback → AudioChunk (mpsc) → to_mono → resample
//!           → Endpointer → encode_pcm16_mono → WAV bytes → Transcriber
//! ```

pub mod listen;
pub mod pcm;
pub mod wav;

pub use listen::{CaptureError, Endpointer, EndpointerEvent, MicSource, UtteranceSource};
pub use pcm::{resample, rms, to_mono};
pub use wav::{decode, encode_pcm16_mono, DecodedWav, WavError};
