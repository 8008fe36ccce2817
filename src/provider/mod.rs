//! LLM provider clients and routing.
//!
//! A [`ProviderClient`] speaks one backend wire format; the
//! [`ProviderRouter`] owns selection, per-call timeouts, single-shot
//! fallback, and the runtime credential override path.

pub mod client;
pub mod hosted;
pub mod local;
pub mod router;

pub use client::{ChatMessage, Completion, CompletionRequest, ProviderClient, ProviderError, Role};
pub use hosted::HostedApiClient;
pub use local::LocalInferenceClient;
pub use router::{ProviderFailure, ProviderRouter, RouteError, RuntimeOverride};
