//! Speech-to-text engines and the gated transcription stage.
//!
//! [`Transcriber`] is object-safe and `Send + Sync` so it can be held behind
//! an `Arc<dyn Transcriber>`. [`WhisperTranscriber`] is the production
//! implementation; [`UnavailableTranscriber`] stands in when no model file
//! is present so the rest of the service still starts.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::audio::pcm::{resample, to_mono};
use crate::audio::wav;

// ---------------------------------------------------------------------------
// TranscribeError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error)]
pub enum TranscribeError {
    /// The GGML model file was not found at the given path.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// whisper-rs failed to initialise a context or per-call state.
    #[error("whisper initialisation failed: {0}")]
    EngineInit(String),

    /// The inference pass itself failed.
    #[error("transcription failed: {0}")]
    Engine(String),

    /// The input bytes were not decodable audio.
    #[error("invalid audio input: {0}")]
    InvalidAudio(String),

    /// The engine ran but produced no text.
    #[error("transcription produced an empty transcript")]
    EmptyTranscript,

    /// No transcription engine is loaded (startup ran without a model).
    #[error("transcription engine unavailable: no model loaded")]
    Unavailable,
}

// ---------------------------------------------------------------------------
// Transcriber trait
// ---------------------------------------------------------------------------

/// Object-safe, thread-safe speech-to-text engine.
///
/// Input is a complete WAV-encoded utterance. Implementations block; the
/// stage wrapper runs them under `spawn_blocking`.
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, wav_bytes: &[u8]) -> Result<String, TranscribeError>;

    /// Engines that tolerate concurrent calls return `true` and skip the
    /// stage gate.
    fn is_reentrant(&self) -> bool {
        false
    }
}

const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn Transcriber>) {}
};

// ---------------------------------------------------------------------------
// WhisperTranscriber
// ---------------------------------------------------------------------------

/// Production engine wrapping a `whisper_rs::WhisperContext`.
///
/// The model is loaded once; a fresh `WhisperState` is created per call, so
/// concurrent transcriptions are safe and the engine reports itself
/// reentrant.
pub struct WhisperTranscriber {
    ctx: WhisperContext,
    language: String,
}

impl std::fmt::Debug for WhisperTranscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperTranscriber")
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}

// `WhisperContext` holds a raw pointer internally but declares
// `unsafe impl Send`/`Sync` in whisper-rs — the weights are read-only after
// loading, and all mutable inference state lives in the per-call
// `WhisperState`.
// SAFETY: WhisperContext is Send+Sync as declared by whisper-rs.
unsafe impl Send for WhisperTranscriber {}
unsafe impl Sync for WhisperTranscriber {}

impl WhisperTranscriber {
    /// Load a GGML model from `model_path`.
    ///
    /// `language` is an ISO-639-1 code, or `"auto"` for detection.
    pub fn load(
        model_path: impl AsRef<Path>,
        language: impl Into<String>,
    ) -> Result<Self, TranscribeError> {
        let path = model_path.as_ref();

        if !path.exists() {
            return Err(TranscribeError::ModelNotFound(path.display().to_string()));
        }

        let path_str = path.to_str().ok_or_else(|| {
            TranscribeError::ModelNotFound(format!(
                "model path contains non-UTF-8 characters: {}",
                path.display()
            ))
        })?;

        let ctx = WhisperContext::new_with_params(path_str, WhisperContextParameters::default())
            .map_err(|e| TranscribeError::EngineInit(e.to_string()))?;

        Ok(Self {
            ctx,
            language: language.into(),
        })
    }
}

impl Transcriber for WhisperTranscriber {
    fn transcribe(&self, wav_bytes: &[u8]) -> Result<String, TranscribeError> {
        let decoded =
            wav::decode(wav_bytes).map_err(|e| TranscribeError::InvalidAudio(e.to_string()))?;
        let mono = to_mono(&decoded.samples, decoded.channels);
        let audio = resample(&mono, decoded.sample_rate, 16_000);

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        let lang: Option<&str> = if self.language == "auto" {
            None
        } else {
            Some(self.language.as_str())
        };
        params.set_language(lang);
        params.set_print_progress(false);
        params.set_print_realtime(false);

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| TranscribeError::EngineInit(e.to_string()))?;

        state
            .full(params, &audio)
            .map_err(|e| TranscribeError::Engine(e.to_string()))?;

        let n_segments = state
            .full_n_segments()
            .map_err(|e| TranscribeError::Engine(e.to_string()))?;

        let mut text = String::new();
        for i in 0..n_segments {
            let segment = state
                .full_get_segment_text(i)
                .map_err(|e| TranscribeError::Engine(format!("segment {i}: {e}")))?;
            text.push_str(&segment);
        }

        Ok(text.trim().to_string())
    }

    fn is_reentrant(&self) -> bool {
        true // per-call WhisperState, shared read-only weights
    }
}

// ---------------------------------------------------------------------------
// UnavailableTranscriber
// ---------------------------------------------------------------------------

/// Startup degrade: keeps the service alive when no model file exists.
/// Every call fails with [`TranscribeError::Unavailable`].
pub struct UnavailableTranscriber;

impl Transcriber for UnavailableTranscriber {
    fn transcribe(&self, _wav_bytes: &[u8]) -> Result<String, TranscribeError> {
        Err(TranscribeError::Unavailable)
    }

    fn is_reentrant(&self) -> bool {
        true // nothing to protect
    }
}

// ---------------------------------------------------------------------------
// TranscriptionStage
// ---------------------------------------------------------------------------

/// Async wrapper around a blocking [`Transcriber`].
///
/// Runs the engine under `spawn_blocking` and, for non-reentrant engines,
/// funnels calls through a gate so at most one transcription is in flight
/// at a time. An empty transcript is an error: later stages require text.
pub struct TranscriptionStage {
    engine: Arc<dyn Transcriber>,
    gate: Option<Mutex<()>>,
}

impl TranscriptionStage {
    pub fn new(engine: Arc<dyn Transcriber>) -> Self {
        let gate = (!engine.is_reentrant()).then(|| Mutex::new(()));
        Self { engine, gate }
    }

    pub async fn transcribe(&self, wav_bytes: Vec<u8>) -> Result<String, TranscribeError> {
        let _guard = match &self.gate {
            Some(gate) => Some(gate.lock().await),
            None => None,
        };

        let engine = Arc::clone(&self.engine);
        let text = tokio::task::spawn_blocking(move || engine.transcribe(&wav_bytes))
            .await
            .map_err(|e| TranscribeError::Engine(format!("transcription task failed: {e}")))??;

        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(TranscribeError::EmptyTranscript);
        }
        Ok(text)
    }
}

// ---------------------------------------------------------------------------
// MockTranscriber  (test-only)
// ---------------------------------------------------------------------------

/// Test double returning a pre-configured response without any model file.
#[cfg(test)]
pub struct MockTranscriber {
    response: Result<String, TranscribeError>,
    reentrant: bool,
    pub calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockTranscriber {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            response: Ok(text.into()),
            reentrant: true,
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn err(error: TranscribeError) -> Self {
        Self {
            response: Err(error),
            reentrant: true,
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
impl Transcriber for MockTranscriber {
    fn transcribe(&self, _wav_bytes: &[u8]) -> Result<String, TranscribeError> {
        self.calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.response.clone()
    }

    fn is_reentrant(&self) -> bool {
        self.reentrant
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[test]
    fn load_missing_model_returns_model_not_found() {
        let result = WhisperTranscriber::load("/nonexistent/model.bin", "auto");
        assert!(matches!(result, Err(TranscribeError::ModelNotFound(_))));
    }

    #[test]
    fn unavailable_engine_always_fails() {
        let engine = UnavailableTranscriber;
        assert!(matches!(
            engine.transcribe(&[0u8; 4]),
            Err(TranscribeError::Unavailable)
        ));
    }

    #[tokio::test]
    async fn stage_passes_text_through() {
        let stage = TranscriptionStage::new(Arc::new(MockTranscriber::ok("  hello world  ")));
        let text = stage.transcribe(vec![0u8; 4]).await.unwrap();
        assert_eq!(text, "hello world");
    }

    #[tokio::test]
    async fn stage_rejects_empty_transcript() {
        let stage = TranscriptionStage::new(Arc::new(MockTranscriber::ok("   ")));
        let err = stage.transcribe(vec![0u8; 4]).await.unwrap_err();
        assert!(matches!(err, TranscribeError::EmptyTranscript));
    }

    #[tokio::test]
    async fn stage_propagates_engine_errors() {
        let stage = TranscriptionStage::new(Arc::new(MockTranscriber::err(
            TranscribeError::Engine("boom".into()),
        )));
        let err = stage.transcribe(vec![0u8; 4]).await.unwrap_err();
        assert!(matches!(err, TranscribeError::Engine(_)));
    }

    /// Engine that records whether two calls ever ran concurrently.
    struct OverlapProbe {
        in_flight: AtomicBool,
        overlapped: AtomicBool,
    }

    impl OverlapProbe {
        fn new() -> Self {
            Self {
                in_flight: AtomicBool::new(false),
                overlapped: AtomicBool::new(false),
            }
        }
    }

    impl Transcriber for OverlapProbe {
        fn transcribe(&self, _wav_bytes: &[u8]) -> Result<String, TranscribeError> {
            if self.in_flight.swap(true, Ordering::SeqCst) {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            std::thread::sleep(Duration::from_millis(10));
            self.in_flight.store(false, Ordering::SeqCst);
            Ok("ok".into())
        }
        // default is_reentrant() == false → stage must gate
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn non_reentrant_engine_never_overlaps() {
        let probe = Arc::new(OverlapProbe::new());
        let stage = Arc::new(TranscriptionStage::new(
            probe.clone() as Arc<dyn Transcriber>
        ));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let stage = Arc::clone(&stage);
            handles.push(tokio::spawn(
                async move { stage.transcribe(vec![0u8; 4]).await },
            ));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert!(!probe.overlapped.load(Ordering::SeqCst));
    }
}
