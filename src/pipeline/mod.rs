//! Speech-turn orchestration.
//!
//! ```text
//! TurnInput
//!    │
//!    ├─ Audio(wav) → TranscriptionStage (spawn_blocking, gated)
//!    │
//!    ▼
//! ProviderRouter::route  (default → fallback, or override path)
//!    │
//!    ▼
//! SynthesisStage (gated, skipped when disabled)
//!    │
//!    ▼
//! TurnResult { reply, audio, provider, model }
//! ```
//!
//! Turns share only read-only state and run concurrently; the first failing
//! stage terminates the turn.

pub mod turn;

pub use turn::{PipelineError, TurnInput, TurnPipeline, TurnResult, TurnState};
