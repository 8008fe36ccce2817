//! Speech stages: transcription in, synthesis out.
//!
//! The engine traits ([`Transcriber`], [`Synthesizer`]) are the swappable
//! seams; the stage wrappers ([`TranscriptionStage`], [`SynthesisStage`])
//! add the shared concurrency policy — at most one in-flight call per stage
//! unless the engine declares itself reentrant.

pub mod synthesize;
pub mod transcribe;

pub use synthesize::{ApiSynthesizer, SynthesisError, SynthesisStage, Synthesizer};
pub use transcribe::{
    TranscribeError, Transcriber, TranscriptionStage, UnavailableTranscriber, WhisperTranscriber,
};
