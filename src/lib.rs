//! Voxen — a local-first voice assistant service.
//!
//! One HTTP process wires four concerns together:
//!
//! * [`config`] — TOML settings loaded once at startup.
//! * [`provider`] — LLM backend clients plus the routing policy
//!   (default → fallback, runtime credential override).
//! * [`speech`] / [`audio`] — transcription and synthesis engines behind
//!   gated stages, with WAV/PCM plumbing and microphone capture.
//! * [`pipeline`] / [`server`] — the speech-turn orchestrator and the
//!   axum surface (`POST /chat`, `GET /listen`, `GET /health`).

pub mod audio;
pub mod config;
pub mod pipeline;
pub mod provider;
pub mod server;
pub mod speech;
