//! HTTP client for one OpenAI-compatible upstream.
//!
//! Never retries; callers decide what a failure means. Connections are
//! pooled with a 90 second idle window and HTTP/2 is negotiated via ALPN,
//! falling back to HTTP/1.1 when the upstream declines.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::protocol::{ChatCompletionRequest, ChatCompletionResponse, ModelsResponse};

/// Default per-request deadline
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Deadline for model list fetches, which gate routing freshness
const LIST_MODELS_TIMEOUT: Duration = Duration::from_secs(5);
/// Keep-alive window for pooled connections
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Failure against a single upstream
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The request never produced an HTTP response
    #[error("transport failure: {0}")]
    Transport(String),

    /// The upstream answered with a non-2xx status
    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The upstream answered 2xx with an undecodable body
    #[error("failed to decode upstream response: {0}")]
    Decode(String),
}

/// Flatten an error and its sources into one searchable string.
///
/// reqwest's display output hides the interesting cause ("connection
/// refused" etc.) behind the source chain.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Operations against one OpenAI-compatible upstream
#[async_trait]
pub trait UpstreamApi: Send + Sync {
    /// Fetch the model catalog; capped at 5 seconds
    async fn list_models(&self) -> Result<Vec<String>, UpstreamError>;

    /// Non-streaming chat completion, fully decoded
    async fn chat(&self, request: &ChatCompletionRequest) -> Result<ChatCompletionResponse, UpstreamError>;

    /// Streaming chat completion; returns the open response for pass-through
    async fn chat_raw(&self, request: &ChatCompletionRequest) -> Result<reqwest::Response, UpstreamError>;

    /// Embedding passthrough; the body is forwarded untouched
    async fn embed(&self, request: &Value) -> Result<Value, UpstreamError>;
}

/// Concrete reqwest-backed upstream client
pub struct HttpUpstreamClient {
    base_url: Url,
    token: Option<SecretString>,
    client: Client,
}

impl HttpUpstreamClient {
    /// Build a client for the given base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn new(base_url: Url, token: Option<SecretString>) -> Result<Self, anyhow::Error> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build HTTP client: {e}"))?;

        Ok(Self {
            base_url,
            token,
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/{path}")
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }

    /// Check the status and drain the body on failure
    async fn into_status_error(response: reqwest::Response) -> UpstreamError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        UpstreamError::Status { status, body }
    }
}

#[async_trait]
impl UpstreamApi for HttpUpstreamClient {
    async fn list_models(&self) -> Result<Vec<String>, UpstreamError> {
        let response = self
            .authorize(self.client.get(self.endpoint("models")))
            .timeout(LIST_MODELS_TIMEOUT)
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(error_chain(&e)))?;

        if !response.status().is_success() {
            return Err(Self::into_status_error(response).await);
        }

        let models: ModelsResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::Decode(error_chain(&e)))?;

        Ok(models.data.into_iter().map(|m| m.id).collect())
    }

    async fn chat(&self, request: &ChatCompletionRequest) -> Result<ChatCompletionResponse, UpstreamError> {
        let response = self
            .authorize(self.client.post(self.endpoint("chat/completions")).json(request))
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(error_chain(&e)))?;

        if !response.status().is_success() {
            return Err(Self::into_status_error(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| UpstreamError::Decode(error_chain(&e)))
    }

    async fn chat_raw(&self, request: &ChatCompletionRequest) -> Result<reqwest::Response, UpstreamError> {
        let response = self
            .authorize(self.client.post(self.endpoint("chat/completions")).json(request))
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(error_chain(&e)))?;

        if !response.status().is_success() {
            return Err(Self::into_status_error(response).await);
        }

        Ok(response)
    }

    async fn embed(&self, request: &Value) -> Result<Value, UpstreamError> {
        let response = self
            .authorize(self.client.post(self.endpoint("embeddings")).json(request))
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(error_chain(&e)))?;

        if !response.status().is_success() {
            return Err(Self::into_status_error(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| UpstreamError::Decode(error_chain(&e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("outer")]
    struct Outer(#[source] Inner);

    #[derive(Debug, Error)]
    #[error("connection refused")]
    struct Inner;

    #[test]
    fn error_chain_includes_sources() {
        let flattened = error_chain(&Outer(Inner));
        assert_eq!(flattened, "outer: connection refused");
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let client = HttpUpstreamClient::new(Url::parse("http://host:1/v1/").unwrap(), None).unwrap();
        assert_eq!(client.endpoint("models"), "http://host:1/v1/models");
        assert_eq!(client.endpoint("chat/completions"), "http://host:1/v1/chat/completions");
    }
}
