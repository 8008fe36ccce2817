//! Configuration module.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for each subsystem,
//! and TOML loading via `AppConfig::load_or_default`.

pub mod settings;

pub use settings::{
    AppConfig, ConfigError, ListenConfig, ProviderConfig, ProviderKind, ProviderSpec,
    ServerConfig, SpeechConfig, SttConfig, TtsConfig,
};
