//! Provider selection, bounded timeouts and single-shot fallback.
//!
//! The router is the only place that decides *which* backend handles a turn
//! and *how long* it may take. Policy, in order:
//!
//! 1. A request carrying a [`RuntimeOverride`] goes to the hosted-API
//!    backend resolved from config, with the override credential. If that
//!    attempt fails the error is returned directly — configured providers
//!    are never consulted on the override path.
//! 2. Otherwise the default provider is tried once.
//! 3. If it fails and a distinct fallback provider is configured, the
//!    fallback is tried once.
//! 4. When every attempt failed, [`RouteError::AllProvidersFailed`] carries
//!    each attempt's provider name and error.
//!
//! No provider is ever invoked more than once per turn.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::config::{ProviderConfig, ProviderKind, ProviderSpec};
use crate::provider::client::{Completion, CompletionRequest, ProviderClient, ProviderError};
use crate::provider::hosted::HostedApiClient;
use crate::provider::local::LocalInferenceClient;

// ---------------------------------------------------------------------------
// RuntimeOverride
// ---------------------------------------------------------------------------

/// A caller-supplied bearer credential for one request.
///
/// `Debug` is redacted so the credential can never leak through logging.
#[derive(Clone)]
pub struct RuntimeOverride {
    credential: String,
}

impl RuntimeOverride {
    pub fn new(credential: impl Into<String>) -> Self {
        Self {
            credential: credential.into(),
        }
    }

    pub fn credential(&self) -> &str {
        &self.credential
    }
}

impl fmt::Debug for RuntimeOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RuntimeOverride(<redacted>)")
    }
}

// ---------------------------------------------------------------------------
// RouteError
// ---------------------------------------------------------------------------

/// One failed attempt: which provider and why.
#[derive(Debug)]
pub struct ProviderFailure {
    pub provider: String,
    pub error: ProviderError,
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.provider, self.error)
    }
}

/// Routing failed after exhausting the attempt budget for this turn.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("all providers failed ({} attempted)", causes.len())]
    AllProvidersFailed { causes: Vec<ProviderFailure> },
}

// ---------------------------------------------------------------------------
// ProviderRouter
// ---------------------------------------------------------------------------

pub struct ProviderRouter {
    config: ProviderConfig,
    local: Arc<dyn ProviderClient>,
    hosted: Arc<dyn ProviderClient>,
}

impl ProviderRouter {
    /// Router with the production wire clients.
    pub fn new(config: ProviderConfig) -> Self {
        Self::with_clients(
            config,
            Arc::new(LocalInferenceClient::new()),
            Arc::new(HostedApiClient::new()),
        )
    }

    /// Router with injected clients. Tests swap in scripted doubles here.
    pub fn with_clients(
        config: ProviderConfig,
        local: Arc<dyn ProviderClient>,
        hosted: Arc<dyn ProviderClient>,
    ) -> Self {
        Self {
            config,
            local,
            hosted,
        }
    }

    fn client_for(&self, kind: ProviderKind) -> &Arc<dyn ProviderClient> {
        match kind {
            ProviderKind::LocalInference => &self.local,
            ProviderKind::HostedApi => &self.hosted,
        }
    }

    /// A spec's own timeout may tighten the configured ceiling but never
    /// extend it.
    fn effective_timeout(&self, spec: &ProviderSpec) -> Duration {
        let ceiling = self.config.timeout_secs;
        let secs = spec.timeout_secs.unwrap_or(ceiling).min(ceiling);
        Duration::from_secs(secs)
    }

    async fn attempt(
        &self,
        name: &str,
        spec: &ProviderSpec,
        request: &CompletionRequest,
        credential: Option<&str>,
    ) -> Result<Completion, ProviderFailure> {
        let timeout = self.effective_timeout(spec);
        log::debug!("attempting provider \"{name}\" (timeout {timeout:?})");

        match self
            .client_for(spec.kind)
            .complete(request, spec, credential, timeout)
            .await
        {
            Ok(reply) => Ok(Completion {
                reply,
                provider: name.to_string(),
                model: spec.default_model.clone(),
            }),
            Err(error) => {
                log::warn!("provider \"{name}\" failed: {error}");
                Err(ProviderFailure {
                    provider: name.to_string(),
                    error,
                })
            }
        }
    }

    /// Route one completion request per the policy above.
    pub async fn route(
        &self,
        request: &CompletionRequest,
        runtime_override: Option<&RuntimeOverride>,
    ) -> Result<Completion, RouteError> {
        if let Some(ovr) = runtime_override {
            return self.route_override(request, ovr).await;
        }

        let default_name = self.config.default_provider.clone();
        let mut causes = Vec::new();

        // Validation guarantees the default entry exists.
        if let Some(spec) = self.config.spec(&default_name) {
            match self.attempt(&default_name, spec, request, None).await {
                Ok(completion) => return Ok(completion),
                Err(failure) => causes.push(failure),
            }
        }

        if let Some(fallback_name) = self.config.fallback_provider.clone() {
            if fallback_name != default_name {
                if let Some(spec) = self.config.spec(&fallback_name) {
                    match self.attempt(&fallback_name, spec, request, None).await {
                        Ok(completion) => {
                            log::info!("fallback provider \"{fallback_name}\" served the turn");
                            return Ok(completion);
                        }
                        Err(failure) => causes.push(failure),
                    }
                }
            }
        }

        Err(RouteError::AllProvidersFailed { causes })
    }

    /// Override path: one attempt against the resolved hosted backend with
    /// the caller's credential, never falling back to configured providers.
    async fn route_override(
        &self,
        request: &CompletionRequest,
        ovr: &RuntimeOverride,
    ) -> Result<Completion, RouteError> {
        let (name, spec) = match self.config.hosted_backend() {
            Some(found) => found,
            None => {
                return Err(RouteError::AllProvidersFailed {
                    causes: vec![ProviderFailure {
                        provider: "override".into(),
                        error: ProviderError::Unreachable(
                            "no hosted-api backend configured to accept an override credential"
                                .into(),
                        ),
                    }],
                });
            }
        };

        let name = name.to_string();
        let spec = spec.clone();
        match self
            .attempt(&name, &spec, request, Some(ovr.credential()))
            .await
        {
            Ok(completion) => Ok(completion),
            Err(failure) => Err(RouteError::AllProvidersFailed {
                causes: vec![failure],
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
