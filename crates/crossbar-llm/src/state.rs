//! Request-time routing: provider selection, load accounting, error
//! classification, and quarantine.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crossbar_config::{ModelsConfig, ProviderConfig};

use crate::client::UpstreamError;
use crate::error::{self, LlmError};
use crate::index::ModelIndex;
use crate::protocol::{ChatCompletionRequest, ChatCompletionResponse};
use crate::provider::{ActiveGuard, Provider, ProviderRegistry};
use crate::usage::TokenEstimator;

/// Shared state for the LLM route handlers
#[derive(Clone)]
pub struct LlmState {
    inner: Arc<LlmStateInner>,
}

struct LlmStateInner {
    index: Arc<ModelIndex>,
    refresh_on_list: bool,
}

/// Everything needed to relay one streaming completion
pub struct StreamingCompletion {
    pub upstream: reqwest::Response,
    pub estimator: TokenEstimator,
    pub guard: ActiveGuard,
}

/// Per-provider snapshot for the health endpoint
#[derive(Debug, serde::Serialize)]
pub struct ProviderStatus {
    pub enabled: bool,
    pub healthy: bool,
    pub active: i64,
}

impl LlmState {
    /// Build the state from configuration, constructing all providers.
    ///
    /// # Errors
    ///
    /// Returns an error if a provider client fails to initialize.
    pub fn from_config(
        providers: &IndexMap<String, ProviderConfig>,
        models: &ModelsConfig,
    ) -> Result<Self, anyhow::Error> {
        let registry = Arc::new(ProviderRegistry::from_config(providers)?);
        let index = Arc::new(ModelIndex::new(registry));

        Ok(Self {
            inner: Arc::new(LlmStateInner {
                index,
                refresh_on_list: models.refresh_on_list,
            }),
        })
    }

    /// Build from a pre-assembled index (tests)
    pub fn from_index(index: Arc<ModelIndex>, refresh_on_list: bool) -> Self {
        Self {
            inner: Arc::new(LlmStateInner {
                index,
                refresh_on_list,
            }),
        }
    }

    pub fn index(&self) -> &Arc<ModelIndex> {
        &self.inner.index
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        self.inner.index.registry()
    }

    /// Non-streaming completion.
    ///
    /// Resolves the provider, tracks the in-flight slot for the duration
    /// of the call, and synthesizes `usage` when the upstream omits it.
    pub async fn complete(&self, request: &ChatCompletionRequest) -> Result<ChatCompletionResponse, LlmError> {
        let provider = self.inner.index.select(&request.model).await?;
        let guard = ActiveGuard::acquire(Arc::clone(&provider));

        let mut estimator = TokenEstimator::new(&request.messages);

        tracing::info!(model = %request.model, provider = %provider.name, "routing chat completion");

        let mut response = match provider.client.chat(request).await {
            Ok(response) => response,
            Err(e) => return Err(self.classify(&provider, e).await),
        };

        if let Some(choice) = response.choices.first() {
            estimator.observe_message(&choice.message);
        }
        if response.usage.is_none() {
            response.usage = Some(estimator.usage());
        }

        drop(guard);
        Ok(response)
    }

    /// Open a streaming completion for pass-through.
    ///
    /// The returned guard keeps the in-flight counter up until the relayed
    /// body is dropped, covering client disconnects.
    pub async fn complete_raw(&self, request: &ChatCompletionRequest) -> Result<StreamingCompletion, LlmError> {
        let provider = self.inner.index.select(&request.model).await?;
        let guard = ActiveGuard::acquire(Arc::clone(&provider));

        let estimator = TokenEstimator::new(&request.messages);

        tracing::info!(
            model = %request.model,
            provider = %provider.name,
            "routing chat completion (stream)"
        );

        let upstream = match provider.client.chat_raw(request).await {
            Ok(upstream) => upstream,
            Err(e) => return Err(self.classify(&provider, e).await),
        };

        Ok(StreamingCompletion {
            upstream,
            estimator,
            guard,
        })
    }

    /// Embedding passthrough: select by model, forward unchanged
    pub async fn embed(&self, request: &Value) -> Result<Value, LlmError> {
        let model = request
            .get("model")
            .and_then(Value::as_str)
            .ok_or_else(|| LlmError::InvalidRequest("missing model field".to_owned()))?
            .to_owned();

        let provider = self.inner.index.select(&model).await?;
        let _guard = ActiveGuard::acquire(Arc::clone(&provider));

        tracing::info!(model = %model, provider = %provider.name, "routing embedding");

        match provider.client.embed(request).await {
            Ok(response) => Ok(response),
            Err(e) => Err(self.classify(&provider, e).await),
        }
    }

    /// Refresh the model index when listing is configured to be eager
    pub async fn refresh_for_listing(&self) {
        if self.inner.refresh_on_list {
            self.inner.index.refresh().await;
        }
    }

    /// Snapshot per-provider status for the health endpoint
    pub fn provider_status(&self) -> IndexMap<String, ProviderStatus> {
        self.registry()
            .iter()
            .map(|p| {
                (
                    p.name.clone(),
                    ProviderStatus {
                        enabled: p.enabled,
                        healthy: p.is_healthy(),
                        active: p.active(),
                    },
                )
            })
            .collect()
    }

    /// Map an upstream failure to the error taxonomy, quarantining the
    /// provider when the failure implies it is unusable.
    async fn classify(&self, provider: &Arc<Provider>, err: UpstreamError) -> LlmError {
        match err {
            UpstreamError::Transport(message) => {
                if error::is_transport_pattern(&message) {
                    self.inner
                        .index
                        .quarantine(&provider.name, &format!("connection error: {message}"))
                        .await;
                    LlmError::Transport {
                        provider: provider.name.clone(),
                        message,
                    }
                } else {
                    LlmError::Internal(anyhow::anyhow!("upstream request failed: {message}"))
                }
            }
            UpstreamError::Status { status, body } => {
                if error::is_fatal_upstream(&body) {
                    self.inner
                        .index
                        .quarantine(&provider.name, &format!("fatal upstream error: {body}"))
                        .await;
                    LlmError::FatalUpstream {
                        provider: provider.name.clone(),
                        message: body,
                    }
                } else {
                    LlmError::UpstreamStatus {
                        status,
                        message: body,
                    }
                }
            }
            UpstreamError::Decode(message) => LlmError::Internal(anyhow::anyhow!("decode failure: {message}")),
        }
    }
}
