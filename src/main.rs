//! Application entry point.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] (missing file → defaults; invalid file → fatal).
//! 3. Load the Whisper model once (degrade to an unavailable stub when the
//!    model file is absent).
//! 4. Probe the microphone (degrade to none — `/listen` answers 503).
//! 5. Build the synthesizer, provider router and turn pipeline.
//! 6. Serve the axum router until shutdown.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use voxen::audio::listen::{MicSource, UtteranceSource};
use voxen::config::AppConfig;
use voxen::pipeline::TurnPipeline;
use voxen::provider::ProviderRouter;
use voxen::server::{router, AppContext};
use voxen::speech::synthesize::{ApiSynthesizer, SynthesisStage, Synthesizer};
use voxen::speech::transcribe::{
    Transcriber, TranscriptionStage, UnavailableTranscriber, WhisperTranscriber,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("voxen starting up");

    let config_path =
        std::env::var("VOXEN_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let config = AppConfig::load_or_default(Path::new(&config_path))
        .with_context(|| format!("invalid configuration at {config_path}"))?;

    // STT engine — loaded once, shared by every turn. A missing model file
    // must not keep the chat endpoint from serving text turns.
    let model_path = &config.speech.stt.model_path;
    let transcriber: Arc<dyn Transcriber> =
        match WhisperTranscriber::load(model_path, config.speech.stt.language.clone()) {
            Ok(engine) => {
                log::info!("whisper model loaded: {}", model_path.display());
                Arc::new(engine)
            }
            Err(e) => {
                log::warn!(
                    "could not load whisper model ({}): {e} — audio input disabled",
                    model_path.display()
                );
                Arc::new(UnavailableTranscriber)
            }
        };

    let mic: Option<Arc<dyn UtteranceSource>> =
        match MicSource::new(config.speech.listen.clone()) {
            Ok(source) => Some(Arc::new(source)),
            Err(e) => {
                log::warn!("microphone unavailable: {e} — /listen will answer 503");
                None
            }
        };

    let synthesizer: Arc<dyn Synthesizer> =
        Arc::new(ApiSynthesizer::new(config.speech.tts.clone()));

    let pipeline = TurnPipeline::new(
        Arc::new(ProviderRouter::new(config.providers.clone())),
        Arc::new(TranscriptionStage::new(transcriber)),
        Arc::new(SynthesisStage::new(synthesizer)),
        config.speech.synthesis_enabled,
    );

    let app = router(Arc::new(AppContext { pipeline, mic }));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    log::info!("listening on http://{addr}");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
