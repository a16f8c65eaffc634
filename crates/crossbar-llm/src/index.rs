//! The model index: which providers can serve which model ids.
//!
//! Rebuilt atomically on refresh, mutated in place under the write lock
//! when a provider is quarantined or re-admitted. All structural writes
//! and `healthy` flag flips happen while holding the write lock; readers
//! therefore never observe a model id without at least one valid
//! provider name behind it.

use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::RwLock;

use crate::error::LlmError;
use crate::provider::{ModelSource, Provider, ProviderRegistry};

pub struct ModelIndex {
    registry: Arc<ProviderRegistry>,
    map: RwLock<IndexMap<String, Vec<String>>>,
}

impl ModelIndex {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self {
            registry,
            map: RwLock::new(IndexMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Rebuild the index from every enabled provider.
    ///
    /// Model lists are fetched concurrently: static providers contribute
    /// their configured list, dynamic healthy providers are asked via
    /// `list_models`. A dynamic provider whose fetch fails is quarantined;
    /// a successful fetch re-admits a previously quarantined provider.
    pub async fn refresh(&self) {
        tracing::info!("refreshing models from all providers");

        let fetches = self.registry.iter().map(|provider| {
            let provider = Arc::clone(provider);
            async move {
                let result = match &provider.source {
                    ModelSource::Static(models) => Ok(models.clone()),
                    ModelSource::Dynamic => {
                        if provider.is_healthy() {
                            provider.client.list_models().await.map_err(|e| e.to_string())
                        } else {
                            // Probing quarantined providers is the reconciler's job
                            Err("provider quarantined".to_owned())
                        }
                    }
                };
                (provider, result)
            }
        });

        let results = futures::future::join_all(fetches).await;

        let mut map = self.map.write().await;
        map.clear();

        for (provider, result) in results {
            match result {
                Ok(models) => {
                    if !provider.is_healthy() {
                        provider.set_healthy(true);
                        tracing::info!(provider = %provider.name, "provider re-admitted");
                    }

                    let mut accepted = 0usize;
                    for model in models {
                        if !provider.allows_model(&model) {
                            continue;
                        }
                        accepted += 1;
                        map.entry(model).or_default().push(provider.name.clone());
                    }
                    tracing::debug!(provider = %provider.name, models = accepted, "indexed models");
                }
                Err(reason) => {
                    if provider.is_healthy() && !provider.is_static() {
                        provider.set_healthy(false);
                        tracing::warn!(
                            provider = %provider.name,
                            %reason,
                            "provider quarantined: model fetch failed"
                        );
                    }
                }
            }
        }

        tracing::info!(models = map.len(), providers = self.registry.len(), "model refresh complete");
    }

    /// Quarantine a provider and purge it from every index entry.
    ///
    /// Idempotent; entries left without providers are removed so the
    /// model disappears from listings immediately.
    pub async fn quarantine(&self, name: &str, reason: &str) {
        let Some(provider) = self.registry.get(name) else {
            return;
        };

        let mut map = self.map.write().await;
        if !provider.is_healthy() {
            return;
        }
        provider.set_healthy(false);
        tracing::warn!(provider = %name, %reason, "provider quarantined");

        map.retain(|_, providers| {
            providers.retain(|p| p != name);
            !providers.is_empty()
        });
    }

    /// Mark a quarantined provider healthy again.
    ///
    /// The caller schedules a refresh to repopulate its models.
    pub async fn readmit(&self, name: &str) {
        let Some(provider) = self.registry.get(name) else {
            return;
        };

        let _map = self.map.write().await;
        if provider.is_healthy() {
            return;
        }
        provider.set_healthy(true);
        tracing::info!(provider = %name, "provider re-admitted");
    }

    /// Pick a provider for a model.
    ///
    /// A model served by exactly one provider routes there. Otherwise the
    /// enabled provider with the fewest in-flight completions wins, ties
    /// broken by configuration declaration order.
    pub async fn select(&self, model: &str) -> Result<Arc<Provider>, LlmError> {
        let names = {
            let map = self.map.read().await;
            map.get(model).cloned()
        };

        let names = names.ok_or_else(|| LlmError::UnknownModel {
            model: model.to_owned(),
        })?;

        if names.len() == 1 {
            if let Some(provider) = self.registry.get(&names[0]) {
                return Ok(Arc::clone(provider));
            }
        }

        let mut selected: Option<&Arc<Provider>> = None;
        for name in &names {
            let Some(provider) = self.registry.get(name) else {
                continue;
            };
            if !provider.enabled {
                continue;
            }
            let better = match selected {
                None => true,
                Some(current) => provider.active() < current.active(),
            };
            if better {
                selected = Some(provider);
            }
        }

        selected.map(Arc::clone).ok_or_else(|| LlmError::UnknownModel {
            model: model.to_owned(),
        })
    }

    /// All model ids, sorted ascending
    pub async fn model_ids(&self) -> Vec<String> {
        let map = self.map.read().await;
        let mut ids: Vec<String> = map.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of indexed models
    pub async fn model_count(&self) -> usize {
        self.map.read().await.len()
    }
}
