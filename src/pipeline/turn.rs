//! The speech-turn pipeline: transcription → completion → synthesis.

use std::sync::Arc;

use thiserror::Error;

use crate::provider::router::{ProviderFailure, RouteError};
use crate::provider::{CompletionRequest, ProviderRouter, RuntimeOverride};
use crate::speech::synthesize::{SynthesisError, SynthesisStage};
use crate::speech::transcribe::{TranscribeError, TranscriptionStage};

// ---------------------------------------------------------------------------
// TurnInput / TurnState / TurnResult
// ---------------------------------------------------------------------------

/// What the caller handed us. Text input skips transcription entirely; the
/// enum makes that unrepresentable any other way.
#[derive(Debug, Clone)]
pub enum TurnInput {
    Text(String),
    Audio(Vec<u8>),
}

/// Where a turn currently is; used for turn-scoped logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Received,
    Transcribing,
    Completing,
    Synthesizing,
    Done,
    Failed,
}

impl TurnState {
    pub fn label(&self) -> &'static str {
        match self {
            TurnState::Received => "received",
            TurnState::Transcribing => "transcribing",
            TurnState::Completing => "completing",
            TurnState::Synthesizing => "synthesizing",
            TurnState::Done => "done",
            TurnState::Failed => "failed",
        }
    }
}

/// A completed turn. `audio` is empty exactly when synthesis is disabled
/// by configuration.
#[derive(Debug, Clone)]
pub struct TurnResult {
    pub reply: String,
    pub audio: Vec<u8>,
    pub provider: String,
    pub model: String,
}

// ---------------------------------------------------------------------------
// PipelineError
// ---------------------------------------------------------------------------

/// A turn's terminal failure: which stage gave up and why.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("all providers failed ({} attempted)", causes.len())]
    AllProvidersFailed { causes: Vec<ProviderFailure> },

    #[error("transcription failed: {0}")]
    TranscriptionFailed(#[from] TranscribeError),

    #[error("synthesis failed: {0}")]
    SynthesisFailed(#[from] SynthesisError),
}

impl PipelineError {
    /// Stable machine-readable tag for the HTTP error body.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::AllProvidersFailed { .. } => "all_providers_failed",
            PipelineError::TranscriptionFailed(_) => "transcription_failed",
            PipelineError::SynthesisFailed(_) => "synthesis_failed",
        }
    }
}

impl From<RouteError> for PipelineError {
    fn from(err: RouteError) -> Self {
        match err {
            RouteError::AllProvidersFailed { causes } => {
                PipelineError::AllProvidersFailed { causes }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TurnPipeline
// ---------------------------------------------------------------------------

/// Orchestrates one speech turn end to end. Holds only `Arc`s to shared
/// read-only engines, so any number of turns can run concurrently; per-stage
/// serialization lives inside the stages themselves.
pub struct TurnPipeline {
    router: Arc<ProviderRouter>,
    transcription: Arc<TranscriptionStage>,
    synthesis: Arc<SynthesisStage>,
    synthesis_enabled: bool,
}

impl TurnPipeline {
    pub fn new(
        router: Arc<ProviderRouter>,
        transcription: Arc<TranscriptionStage>,
        synthesis: Arc<SynthesisStage>,
        synthesis_enabled: bool,
    ) -> Self {
        Self {
            router,
            transcription,
            synthesis,
            synthesis_enabled,
        }
    }

    /// Run one turn to completion. Fail-fast: the first failing stage
    /// terminates the turn and later stages never run. Dropping the returned
    /// future (client disconnect) cancels the in-flight provider call.
    pub async fn run_turn(
        &self,
        input: TurnInput,
        runtime_override: Option<&RuntimeOverride>,
    ) -> Result<TurnResult, PipelineError> {
        log::debug!("turn state: {}", TurnState::Received.label());

        let result = self.run_turn_inner(input, runtime_override).await;
        match &result {
            Ok(turn) => log::info!(
                "turn {}: provider \"{}\" model \"{}\" replied {} chars, {} audio bytes",
                TurnState::Done.label(),
                turn.provider,
                turn.model,
                turn.reply.len(),
                turn.audio.len()
            ),
            Err(err) => log::warn!("turn {}: {err}", TurnState::Failed.label()),
        }
        result
    }

    async fn run_turn_inner(
        &self,
        input: TurnInput,
        runtime_override: Option<&RuntimeOverride>,
    ) -> Result<TurnResult, PipelineError> {
        let message = match input {
            TurnInput::Text(text) => text,
            TurnInput::Audio(wav_bytes) => {
                log::debug!("turn state: {}", TurnState::Transcribing.label());
                self.transcription.transcribe(wav_bytes).await?
            }
        };

        log::debug!("turn state: {}", TurnState::Completing.label());
        let request = CompletionRequest::new(message);
        let completion = self.router.route(&request, runtime_override).await?;

        let audio = if self.synthesis_enabled {
            log::debug!("turn state: {}", TurnState::Synthesizing.label());
            self.synthesis.synthesize(&completion.reply).await?
        } else {
            Vec::new()
        };

        Ok(TurnResult {
            reply: completion.reply,
            audio,
            provider: completion.provider,
            model: completion.model,
        })
    }

    /// Transcription only — the listen endpoint's entry point.
    pub async fn transcribe(&self, wav_bytes: Vec<u8>) -> Result<String, PipelineError> {
        Ok(self.transcription.transcribe(wav_bytes).await?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::config::{ProviderConfig, ProviderKind, ProviderSpec};
    use crate::provider::client::{ProviderClient, ProviderError};
    use crate::speech::synthesize::MockSynthesizer;
    use crate::speech::transcribe::MockTranscriber;

    /// Provider double: records the message it was asked to complete.
    struct EchoClient {
        calls: AtomicUsize,
        last_message: Mutex<Option<String>>,
        reply: Option<&'static str>,
    }

    impl EchoClient {
        fn ok(reply: &'static str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                last_message: Mutex::new(None),
                reply: Some(reply),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                last_message: Mutex::new(None),
                reply: None,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProviderClient for EchoClient {
        async fn complete(
            &self,
            request: &CompletionRequest,
            _spec: &ProviderSpec,
            _credential: Option<&str>,
            _timeout: Duration,
        ) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_message.lock().unwrap() = Some(request.message.clone());
            match self.reply {
                Some(reply) => Ok(reply.to_string()),
                None => Err(ProviderError::Timeout),
            }
        }
    }

    fn config() -> ProviderConfig {
        let mut backends = BTreeMap::new();
        backends.insert(
            "ollama".to_string(),
            ProviderSpec {
                kind: ProviderKind::LocalInference,
                base_url: "http://example.invalid".into(),
                default_model: "qwen2.5:0.5b".into(),
                api_key: None,
                num_ctx: None,
                num_gpu: None,
                temperature: None,
                max_tokens: None,
                timeout_secs: None,
            },
        );
        ProviderConfig {
            backends,
            default_provider: "ollama".into(),
            fallback_provider: None,
            timeout_secs: 30,
        }
    }

    struct Fixture {
        pipeline: TurnPipeline,
        client: Arc<EchoClient>,
        transcriber: Arc<MockTranscriber>,
        synthesizer: Arc<MockSynthesizer>,
    }

    fn fixture(
        client: Arc<EchoClient>,
        transcriber: MockTranscriber,
        synthesizer: MockSynthesizer,
        synthesis_enabled: bool,
    ) -> Fixture {
        let transcriber = Arc::new(transcriber);
        let synthesizer = Arc::new(synthesizer);
        let hosted = EchoClient::failing();
        let router = Arc::new(ProviderRouter::with_clients(
            config(),
            client.clone(),
            hosted,
        ));
        let pipeline = TurnPipeline::new(
            router,
            Arc::new(TranscriptionStage::new(
                transcriber.clone() as Arc<dyn crate::speech::transcribe::Transcriber>
            )),
            Arc::new(SynthesisStage::new(
                synthesizer.clone() as Arc<dyn crate::speech::synthesize::Synthesizer>
            )),
            synthesis_enabled,
        );
        Fixture {
            pipeline,
            client,
            transcriber,
            synthesizer,
        }
    }

    #[tokio::test]
    async fn audio_input_is_transcribed_before_completion() {
        let fx = fixture(
            EchoClient::ok("the reply"),
            MockTranscriber::ok("what time is it"),
            MockSynthesizer::ok(vec![9, 9, 9]),
            true,
        );

        let result = fx
            .pipeline
            .run_turn(TurnInput::Audio(vec![0u8; 16]), None)
            .await
            .unwrap();

        assert_eq!(fx.transcriber.call_count(), 1);
        // The provider saw the transcript, not the raw audio.
        assert_eq!(
            fx.client.last_message.lock().unwrap().as_deref(),
            Some("what time is it")
        );
        assert_eq!(result.reply, "the reply");
        assert_eq!(result.provider, "ollama");
    }

    #[tokio::test]
    async fn text_input_never_touches_transcription() {
        let fx = fixture(
            EchoClient::ok("hi"),
            MockTranscriber::ok("should not be used"),
            MockSynthesizer::ok(vec![1]),
            true,
        );

        fx.pipeline
            .run_turn(TurnInput::Text("hello".into()), None)
            .await
            .unwrap();

        assert_eq!(fx.transcriber.call_count(), 0);
        assert_eq!(
            fx.client.last_message.lock().unwrap().as_deref(),
            Some("hello")
        );
    }

    #[tokio::test]
    async fn transcription_failure_short_circuits_the_turn() {
        let fx = fixture(
            EchoClient::ok("unused"),
            MockTranscriber::err(TranscribeError::Engine("boom".into())),
            MockSynthesizer::ok(vec![1]),
            true,
        );

        let err = fx
            .pipeline
            .run_turn(TurnInput::Audio(vec![0u8; 16]), None)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "transcription_failed");
        assert_eq!(fx.client.calls(), 0);
        assert_eq!(fx.synthesizer.call_count(), 0);
    }

    #[tokio::test]
    async fn empty_transcript_is_a_transcription_failure() {
        let fx = fixture(
            EchoClient::ok("unused"),
            MockTranscriber::ok("   "),
            MockSynthesizer::ok(vec![1]),
            true,
        );

        let err = fx
            .pipeline
            .run_turn(TurnInput::Audio(vec![0u8; 16]), None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::TranscriptionFailed(TranscribeError::EmptyTranscript)
        ));
        assert_eq!(fx.client.calls(), 0);
    }

    #[tokio::test]
    async fn provider_failure_skips_synthesis() {
        let fx = fixture(
            EchoClient::failing(),
            MockTranscriber::ok("unused"),
            MockSynthesizer::ok(vec![1]),
            true,
        );

        let err = fx
            .pipeline
            .run_turn(TurnInput::Text("hello".into()), None)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "all_providers_failed");
        assert_eq!(fx.synthesizer.call_count(), 0);
    }

    #[tokio::test]
    async fn synthesis_yields_non_empty_audio_for_non_empty_reply() {
        let fx = fixture(
            EchoClient::ok("spoken reply"),
            MockTranscriber::ok("unused"),
            MockSynthesizer::ok(vec![4, 5, 6, 7]),
            true,
        );

        let result = fx
            .pipeline
            .run_turn(TurnInput::Text("hello".into()), None)
            .await
            .unwrap();

        assert!(!result.audio.is_empty());
        assert_eq!(fx.synthesizer.call_count(), 1);
    }

    #[tokio::test]
    async fn disabled_synthesis_returns_empty_audio_without_calling_engine() {
        let fx = fixture(
            EchoClient::ok("text-only reply"),
            MockTranscriber::ok("unused"),
            MockSynthesizer::ok(vec![1, 2, 3]),
            false,
        );

        let result = fx
            .pipeline
            .run_turn(TurnInput::Text("hello".into()), None)
            .await
            .unwrap();

        assert!(result.audio.is_empty());
        assert_eq!(result.reply, "text-only reply");
        assert_eq!(fx.synthesizer.call_count(), 0);
    }

    #[tokio::test]
    async fn synthesis_failure_fails_the_turn() {
        let fx = fixture(
            EchoClient::ok("reply"),
            MockTranscriber::ok("unused"),
            MockSynthesizer::failing(),
            true,
        );

        let err = fx
            .pipeline
            .run_turn(TurnInput::Text("hello".into()), None)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "synthesis_failed");
    }

    #[tokio::test]
    async fn transcribe_entry_point_returns_text_only() {
        let fx = fixture(
            EchoClient::ok("unused"),
            MockTranscriber::ok("turn on the lights"),
            MockSynthesizer::ok(vec![1]),
            true,
        );

        let text = fx.pipeline.transcribe(vec![0u8; 16]).await.unwrap();
        assert_eq!(text, "turn on the lights");
        assert_eq!(fx.client.calls(), 0);
        assert_eq!(fx.synthesizer.call_count(), 0);
    }
}
