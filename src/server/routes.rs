//! Route table, request/response DTOs and error-to-status mapping.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::audio::listen::UtteranceSource;
use crate::pipeline::{PipelineError, TurnInput, TurnPipeline};
use crate::provider::RuntimeOverride;

/// Header carrying a per-request provider credential.
const PROVIDER_KEY_HEADER: &str = "x-provider-key";

// ---------------------------------------------------------------------------
// AppContext
// ---------------------------------------------------------------------------

/// Everything the handlers share. Built once in `main`, read-only after.
pub struct AppContext {
    pub pipeline: TurnPipeline,
    /// `None` when no microphone was found at startup; the listen endpoint
    /// then answers 503 instead of the whole service refusing to start.
    pub mic: Option<Arc<dyn UtteranceSource>>,
}

/// Build the route table.
pub fn router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/listen", get(listen))
        .route("/health", get(health))
        .with_state(ctx)
}

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    reply: String,
    /// Base64-encoded synthesized audio; empty when synthesis is disabled.
    audio: String,
    provider_used: String,
    model_used: String,
}

#[derive(Debug, Serialize)]
struct ListenResponse {
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    detail: String,
}

// ---------------------------------------------------------------------------
// ApiError
// ---------------------------------------------------------------------------

/// HTTP-shaped error: a status code plus the machine-readable kind.
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    detail: String,
}

impl ApiError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "bad_request",
            detail: detail.into(),
        }
    }

    fn no_microphone() -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            kind: "no_microphone",
            detail: "no microphone is available on this host".into(),
        }
    }

    fn capture(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind: "capture_failed",
            detail: detail.into(),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let status = match &err {
            PipelineError::AllProvidersFailed { .. } => StatusCode::BAD_GATEWAY,
            PipelineError::TranscriptionFailed(_) | PipelineError::SynthesisFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            kind: err.kind(),
            detail: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.kind,
            detail: self.detail,
        };
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health() -> &'static str {
    "ok"
}

async fn chat(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if request.message.trim().is_empty() {
        return Err(ApiError::bad_request("message must not be empty"));
    }

    let runtime_override = headers
        .get(PROVIDER_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|key| !key.trim().is_empty())
        .map(RuntimeOverride::new);

    let result = ctx
        .pipeline
        .run_turn(TurnInput::Text(request.message), runtime_override.as_ref())
        .await?;

    Ok(Json(ChatResponse {
        reply: result.reply,
        audio: BASE64.encode(&result.audio),
        provider_used: result.provider,
        model_used: result.model,
    }))
}

async fn listen(State(ctx): State<Arc<AppContext>>) -> Result<Json<ListenResponse>, ApiError> {
    let mic = ctx.mic.clone().ok_or_else(ApiError::no_microphone)?;

    // Capture blocks on hardware for the length of the utterance.
    let wav_bytes = tokio::task::spawn_blocking(move || mic.capture_utterance())
        .await
        .map_err(|e| ApiError::capture(format!("capture task failed: {e}")))?
        .map_err(|e| ApiError::capture(e.to_string()))?;

    let message = ctx.pipeline.transcribe(wav_bytes).await?;
    Ok(Json(ListenResponse { message }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
