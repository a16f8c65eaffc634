//! Background recovery of quarantined providers.
//!
//! A single long-lived task probes quarantined dynamic providers every
//! 30 seconds; a provider whose `list_models` succeeds is re-admitted and
//! a full index refresh is scheduled in the background.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::index::ModelIndex;

/// Interval between recovery sweeps
const PROBE_INTERVAL: Duration = Duration::from_secs(30);
/// Deadline for an individual recovery probe
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
/// Deadline for the follow-up index refresh
const REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

/// Spawn the reconciler task; it exits when `shutdown` fires
pub fn spawn_reconciler(index: Arc<ModelIndex>, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PROBE_INTERVAL);
        // The immediate first tick would race startup refresh
        ticker.tick().await;

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    tracing::info!("health reconciler stopping");
                    return;
                }
                _ = ticker.tick() => {
                    probe_quarantined(&index).await;
                }
            }
        }
    })
}

/// One recovery sweep over quarantined providers.
///
/// Static providers are skipped; their catalogs come back with the next
/// refresh once the router core stops failing against them.
pub async fn probe_quarantined(index: &Arc<ModelIndex>) {
    let quarantined: Vec<_> = index
        .registry()
        .iter()
        .filter(|p| p.enabled && !p.is_healthy() && !p.is_static())
        .map(Arc::clone)
        .collect();

    if quarantined.is_empty() {
        return;
    }

    tracing::debug!(count = quarantined.len(), "probing quarantined providers");

    let probes = quarantined.into_iter().map(|provider| {
        let index = Arc::clone(index);
        async move {
            match tokio::time::timeout(PROBE_TIMEOUT, provider.client.list_models()).await {
                Ok(Ok(_)) => {
                    index.readmit(&provider.name).await;
                    tracing::info!(provider = %provider.name, "provider recovered");

                    // Repopulate its models without blocking the sweep
                    let background = Arc::clone(&index);
                    tokio::spawn(async move {
                        if tokio::time::timeout(REFRESH_TIMEOUT, background.refresh()).await.is_err() {
                            tracing::warn!("model refresh after provider recovery timed out");
                        }
                    });
                }
                Ok(Err(e)) => {
                    tracing::debug!(provider = %provider.name, error = %e, "provider still unreachable");
                }
                Err(_) => {
                    tracing::debug!(provider = %provider.name, "provider probe timed out");
                }
            }
        }
    });

    futures::future::join_all(probes).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{UpstreamApi, UpstreamError};
    use crate::protocol::{ChatCompletionRequest, ChatCompletionResponse};
    use crate::provider::{Provider, ProviderRegistry};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Mutex;

    struct FlakyClient {
        reachable: Mutex<bool>,
    }

    #[async_trait]
    impl UpstreamApi for FlakyClient {
        async fn list_models(&self) -> Result<Vec<String>, UpstreamError> {
            if *self.reachable.lock().unwrap() {
                Ok(vec!["m1".to_owned()])
            } else {
                Err(UpstreamError::Transport("connection refused".to_owned()))
            }
        }
        async fn chat(&self, _: &ChatCompletionRequest) -> Result<ChatCompletionResponse, UpstreamError> {
            Err(UpstreamError::Transport("unused".to_owned()))
        }
        async fn chat_raw(&self, _: &ChatCompletionRequest) -> Result<reqwest::Response, UpstreamError> {
            Err(UpstreamError::Transport("unused".to_owned()))
        }
        async fn embed(&self, _: &Value) -> Result<Value, UpstreamError> {
            Err(UpstreamError::Transport("unused".to_owned()))
        }
    }

    #[tokio::test]
    async fn probe_readmits_recovered_provider() {
        let client = Arc::new(FlakyClient {
            reachable: Mutex::new(true),
        });
        let config: crossbar_config::ProviderConfig =
            toml::from_str("base_url = \"http://localhost:1/v1\"").unwrap();
        let provider = Arc::new(Provider::new("p1".to_owned(), &config, Arc::clone(&client) as _));
        let index = Arc::new(ModelIndex::new(Arc::new(ProviderRegistry::from_providers(vec![
            provider,
        ]))));
        index.refresh().await;

        // Take the provider down and quarantine it
        *client.reachable.lock().unwrap() = false;
        index.quarantine("p1", "connection refused").await;
        assert!(!index.registry().get("p1").unwrap().is_healthy());

        // Still down: probe leaves it quarantined
        probe_quarantined(&index).await;
        assert!(!index.registry().get("p1").unwrap().is_healthy());

        // Back up: probe re-admits
        *client.reachable.lock().unwrap() = true;
        probe_quarantined(&index).await;
        assert!(index.registry().get("p1").unwrap().is_healthy());
    }

    #[tokio::test]
    async fn reconciler_shuts_down_cleanly() {
        let config: crossbar_config::ProviderConfig =
            toml::from_str("base_url = \"http://localhost:1/v1\"").unwrap();
        let provider = Arc::new(Provider::new(
            "p1".to_owned(),
            &config,
            Arc::new(FlakyClient {
                reachable: Mutex::new(false),
            }) as _,
        ));
        let index = Arc::new(ModelIndex::new(Arc::new(ProviderRegistry::from_providers(vec![
            provider,
        ]))));

        let shutdown = CancellationToken::new();
        let handle = spawn_reconciler(Arc::clone(&index), shutdown.clone());
        shutdown.cancel();
        handle.await.unwrap();
    }
}
