//! Text-to-speech engines and the gated synthesis stage.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::TtsConfig;

// ---------------------------------------------------------------------------
// SynthesisError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SynthesisError {
    /// The request could not be sent or the connection failed.
    #[error("synthesis request failed: {0}")]
    Request(String),

    /// The backend did not answer within the configured timeout.
    #[error("synthesis timed out")]
    Timeout,

    /// The backend answered with a non-2xx status.
    #[error("synthesis backend returned HTTP {0}")]
    Api(u16),

    /// The backend answered 2xx but with an empty body.
    #[error("synthesis produced no audio")]
    EmptyAudio,
}

impl From<reqwest::Error> for SynthesisError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SynthesisError::Timeout
        } else {
            SynthesisError::Request(err.without_url().to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Synthesizer trait
// ---------------------------------------------------------------------------

/// Turns reply text into encoded audio. Non-empty input must yield
/// non-empty audio or an error.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SynthesisError>;

    /// Engines that tolerate concurrent calls return `true` and skip the
    /// stage gate.
    fn is_reentrant(&self) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// ApiSynthesizer
// ---------------------------------------------------------------------------

/// OpenAI-compatible `POST {base}/v1/audio/speech` client.
///
/// Stays behind the stage gate (the default, non-reentrant) so a burst of
/// turns does not fan out into parallel TTS calls.
pub struct ApiSynthesizer {
    http: reqwest::Client,
    config: TtsConfig,
}

impl ApiSynthesizer {
    pub fn new(config: TtsConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl Synthesizer for ApiSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SynthesisError> {
        let url = format!(
            "{}/v1/audio/speech",
            self.config.base_url.trim_end_matches('/')
        );

        let body = json!({
            "model": self.config.model,
            "input": text,
            "voice": self.config.voice,
            "response_format": "wav",
        });

        let mut builder = self
            .http
            .post(&url)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .json(&body);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SynthesisError::Api(status.as_u16()));
        }

        let audio = response.bytes().await?.to_vec();
        if audio.is_empty() {
            return Err(SynthesisError::EmptyAudio);
        }
        Ok(audio)
    }
}

// ---------------------------------------------------------------------------
// SynthesisStage
// ---------------------------------------------------------------------------

/// Concurrency wrapper around a [`Synthesizer`]: at most one in-flight
/// synthesis unless the engine is reentrant.
pub struct SynthesisStage {
    engine: Arc<dyn Synthesizer>,
    gate: Option<Mutex<()>>,
}

impl SynthesisStage {
    pub fn new(engine: Arc<dyn Synthesizer>) -> Self {
        let gate = (!engine.is_reentrant()).then(|| Mutex::new(()));
        Self { engine, gate }
    }

    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SynthesisError> {
        let _guard = match &self.gate {
            Some(gate) => Some(gate.lock().await),
            None => None,
        };
        self.engine.synthesize(text).await
    }
}

// ---------------------------------------------------------------------------
// MockSynthesizer  (test-only)
// ---------------------------------------------------------------------------

/// Test double yielding fixed bytes (or a fixed failure).
#[cfg(test)]
pub struct MockSynthesizer {
    audio: Option<Vec<u8>>,
    pub calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockSynthesizer {
    pub fn ok(audio: Vec<u8>) -> Self {
        Self {
            audio: Some(audio),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            audio: None,
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl Synthesizer for MockSynthesizer {
    async fn synthesize(&self, _text: &str) -> Result<Vec<u8>, SynthesisError> {
        self.calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        match &self.audio {
            Some(audio) => Ok(audio.clone()),
            None => Err(SynthesisError::Api(500)),
        }
    }

    fn is_reentrant(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
