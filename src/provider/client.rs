//! Shared provider-facing types: chat messages, requests, results and the
//! [`ProviderClient`] seam every backend implements.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::config::ProviderSpec;

/// Persona prepended to every conversation. Replies are spoken aloud, so the
/// prompt pushes the model toward short conversational answers.
pub const SYSTEM_PROMPT: &str = "You are Voxen, a helpful voice assistant. \
Your replies are read aloud, so keep them short, conversational and free of \
markup or lists unless the user asks for detail.";

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Chat role as understood by both wire formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message in a chat exchange.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// CompletionRequest / Completion
// ---------------------------------------------------------------------------

/// One turn's prompt: the user message plus any prior turns the caller wants
/// the model to see. History lives only for the duration of the request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// The current user message.
    pub message: String,
    /// Prior turns, oldest first. Empty for a fresh conversation.
    pub history: Vec<ChatMessage>,
}

impl CompletionRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            history: Vec::new(),
        }
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }

    /// The full message list sent on the wire: system prompt, history, then
    /// the current user message.
    pub fn messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(ChatMessage::system(SYSTEM_PROMPT));
        messages.extend(self.history.iter().cloned());
        messages.push(ChatMessage::user(self.message.clone()));
        messages
    }
}

/// A successful completion. `provider` names the config entry (or override
/// backend) that actually produced the reply.
#[derive(Debug, Clone)]
pub struct Completion {
    pub reply: String,
    pub provider: String,
    pub model: String,
}

// ---------------------------------------------------------------------------
// ProviderError
// ---------------------------------------------------------------------------

/// A single provider attempt's failure. The detail strings never contain
/// upstream response bodies or credential material.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The call exceeded its timeout and was aborted.
    #[error("provider call timed out")]
    Timeout,

    /// The backend answered but the answer was unusable (non-2xx status or
    /// a malformed body).
    #[error("upstream error: {0}")]
    Upstream(String),

    /// The backend could not be reached at all.
    #[error("provider unreachable: {0}")]
    Unreachable(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else if err.is_connect() {
            ProviderError::Unreachable(err.without_url().to_string())
        } else {
            ProviderError::Upstream(err.without_url().to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// ProviderClient
// ---------------------------------------------------------------------------

/// One backend wire format. Implementations make exactly one HTTP call per
/// invocation: no retries, no fallback — that policy belongs to the router.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Send `request` to the backend described by `spec` and return the
    /// reply text. `credential` is a per-request bearer token that takes
    /// precedence over any key in the spec. `timeout` bounds the whole call;
    /// exceeding it aborts the in-flight request.
    async fn complete(
        &self,
        request: &CompletionRequest,
        spec: &ProviderSpec,
        credential: Option<&str>,
        timeout: Duration,
    ) -> Result<String, ProviderError>;
}
