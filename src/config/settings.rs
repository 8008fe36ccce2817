//! Application settings structs, defaults and TOML loading.
//!
//! [`AppConfig`] is read once at startup and never mutated afterwards; every
//! concurrent turn shares it read-only behind an `Arc`. A missing file is
//! treated as a first run and yields [`AppConfig::default`], but a file that
//! exists and fails to parse or violates the provider invariants is a fatal
//! [`ConfigError`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Startup configuration failures. None of these are retryable at runtime;
/// callers must treat them as fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    /// The config file is not valid TOML (or has the wrong shape).
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// The `[providers]` section has an empty backend mapping.
    #[error("no providers configured — at least one backend entry is required")]
    NoProviders,

    /// `default_provider` or `fallback_provider` names a backend that does
    /// not exist in the mapping.
    #[error("{role} \"{name}\" does not match any configured backend")]
    UnknownProvider { role: &'static str, name: String },

    /// A backend entry is missing a required value.
    #[error("provider \"{provider}\" has an empty {field}")]
    MissingField {
        provider: String,
        field: &'static str,
    },
}

// ---------------------------------------------------------------------------
// ProviderKind
// ---------------------------------------------------------------------------

/// The closed set of backend families.
///
/// Dispatch happens on this tag, never on provider name strings; adding a
/// new backend family means adding a variant here plus a client for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// A locally reachable inference server (Ollama-style `/api/chat`).
    /// No credential required.
    LocalInference,
    /// A remote OpenAI-compatible `/v1/chat/completions` endpoint.
    /// Requires a bearer credential from config or a runtime override.
    HostedApi,
}

// ---------------------------------------------------------------------------
// ProviderSpec
// ---------------------------------------------------------------------------

/// One backend entry in the `[providers.backends]` mapping.
///
/// Owned exclusively by [`ProviderConfig`]; the router clones a spec only to
/// build the ephemeral variant carrying a runtime override credential.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSpec {
    /// Which backend family this entry belongs to.
    pub kind: ProviderKind,
    /// Base endpoint URL without a trailing slash or version suffix
    /// (e.g. `http://localhost:11434`, `https://openrouter.ai/api`).
    pub base_url: String,
    /// Model identifier sent when the request carries no explicit model.
    pub default_model: String,
    /// Bearer credential for hosted-API backends. `None` for local ones.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Context window forwarded to local inference (`options.num_ctx`).
    #[serde(default)]
    pub num_ctx: Option<u32>,
    /// GPU layer hint forwarded to local inference (`options.num_gpu`).
    #[serde(default)]
    pub num_gpu: Option<u32>,
    /// Sampling temperature forwarded to hosted backends.
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Completion length cap forwarded to hosted backends.
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Per-backend timeout. May lower the router ceiling
    /// ([`ProviderConfig::timeout_secs`]) but never raise it.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

// ---------------------------------------------------------------------------
// ProviderConfig
// ---------------------------------------------------------------------------

/// Process-wide description of the known LLM backends plus the routing
/// policy knobs. Immutable after [`AppConfig::load_or_default`] returns.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Backend name → spec. `BTreeMap` keeps iteration order deterministic,
    /// which the override-backend resolution relies on.
    #[serde(default)]
    pub backends: BTreeMap<String, ProviderSpec>,
    /// Name of the backend tried first on every turn without an override.
    pub default_provider: String,
    /// Backend tried exactly once after the default fails. `None` disables
    /// fallback entirely.
    #[serde(default)]
    pub fallback_provider: Option<String>,
    /// Interactive timeout ceiling in seconds applied to every provider call
    /// whose spec carries no tighter `timeout_secs`.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ProviderConfig {
    /// A single local Ollama backend, matching first-run behaviour.
    fn default() -> Self {
        let mut backends = BTreeMap::new();
        backends.insert(
            "ollama".to_string(),
            ProviderSpec {
                kind: ProviderKind::LocalInference,
                base_url: "http://localhost:11434".into(),
                default_model: "qwen2.5:0.5b".into(),
                api_key: None,
                num_ctx: Some(1024),
                num_gpu: Some(0),
                temperature: None,
                max_tokens: None,
                timeout_secs: None,
            },
        );
        Self {
            backends,
            default_provider: "ollama".into(),
            fallback_provider: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ProviderConfig {
    /// Check every invariant the router depends on.
    ///
    /// Called once at startup; a failure here means the process must not
    /// start, never a partially usable config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backends.is_empty() {
            return Err(ConfigError::NoProviders);
        }

        if !self.backends.contains_key(&self.default_provider) {
            return Err(ConfigError::UnknownProvider {
                role: "default_provider",
                name: self.default_provider.clone(),
            });
        }

        if let Some(fallback) = &self.fallback_provider {
            if !self.backends.contains_key(fallback) {
                return Err(ConfigError::UnknownProvider {
                    role: "fallback_provider",
                    name: fallback.clone(),
                });
            }
        }

        for (name, spec) in &self.backends {
            if spec.base_url.trim().is_empty() {
                return Err(ConfigError::MissingField {
                    provider: name.clone(),
                    field: "base_url",
                });
            }
            if spec.default_model.trim().is_empty() {
                return Err(ConfigError::MissingField {
                    provider: name.clone(),
                    field: "default_model",
                });
            }
        }

        Ok(())
    }

    /// Look up a backend spec by name.
    pub fn spec(&self, name: &str) -> Option<&ProviderSpec> {
        self.backends.get(name)
    }

    /// Resolve the backend that serves runtime-override requests.
    ///
    /// Preference order: the default provider when it is hosted, then the
    /// fallback provider when it is hosted, then the first hosted entry in
    /// name order. `None` when no hosted-API backend is configured at all.
    pub fn hosted_backend(&self) -> Option<(&str, &ProviderSpec)> {
        let is_hosted = |name: &str| {
            self.backends
                .get(name)
                .filter(|s| s.kind == ProviderKind::HostedApi)
        };

        if let Some(spec) = is_hosted(&self.default_provider) {
            return Some((self.default_provider.as_str(), spec));
        }
        if let Some(fallback) = &self.fallback_provider {
            if let Some(spec) = is_hosted(fallback) {
                return Some((fallback.as_str(), spec));
            }
        }
        self.backends
            .iter()
            .find(|(_, spec)| spec.kind == ProviderKind::HostedApi)
            .map(|(name, spec)| (name.as_str(), spec))
    }
}

// ---------------------------------------------------------------------------
// SpeechConfig
// ---------------------------------------------------------------------------

/// Settings for the Whisper transcription engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    /// Path to the GGML model file loaded once at startup.
    pub model_path: PathBuf,
    /// Speech language as an ISO-639-1 code, or `"auto"` for detection.
    pub language: String,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/ggml-base.bin"),
            language: "auto".into(),
        }
    }
}

/// Settings for the speech-synthesis backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Base URL of an OpenAI-compatible `/v1/audio/speech` endpoint.
    pub base_url: String,
    /// Bearer credential; optional for self-hosted TTS servers.
    pub api_key: Option<String>,
    /// TTS model identifier.
    pub model: String,
    /// Voice preset name.
    pub voice: String,
    /// Maximum seconds to wait for synthesized audio.
    pub timeout_secs: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".into(),
            api_key: None,
            model: "tts-1".into(),
            voice: "alloy".into(),
            timeout_secs: 30,
        }
    }
}

/// Microphone endpointing knobs for `GET /listen`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    /// RMS amplitude above which a 30 ms frame counts as speech.
    pub rms_threshold: f32,
    /// Milliseconds of continuous silence that end an utterance.
    pub silence_ms: u64,
    /// Hard cap on utterance length in seconds.
    pub max_utterance_secs: f32,
    /// Seconds to wait for speech to start before giving up.
    pub start_timeout_secs: f32,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            rms_threshold: 0.01,
            silence_ms: 800,
            max_utterance_secs: 30.0,
            start_timeout_secs: 10.0,
        }
    }
}

/// Top-level speech settings: transcription in, synthesis out.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// When `false`, turns complete without audio (text-only replies).
    pub synthesis_enabled: bool,
    pub stt: SttConfig,
    pub tts: TtsConfig,
    pub listen: ListenConfig,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            synthesis_enabled: true,
            stt: SttConfig::default(),
            tts: TtsConfig::default(),
            listen: ListenConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8017,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, deserialised from `config.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP listener settings.
    pub server: ServerConfig,
    /// LLM backend mapping and routing policy.
    pub providers: ProviderConfig,
    /// Transcription / synthesis / microphone settings.
    pub speech: SpeechConfig,
}

impl AppConfig {
    /// Load configuration from `path`, validating the provider section.
    ///
    /// A missing file is a first run and returns the defaults (a local
    /// `ollama` backend). A file that exists but cannot be read, parsed, or
    /// validated is a [`ConfigError`] and must abort startup.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::warn!(
                "config file {} not found — using defaults (local ollama)",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.providers.validate()?;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
