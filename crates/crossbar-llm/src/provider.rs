//! Provider records and the registry that owns them.
//!
//! The set of providers is fixed at startup; only `healthy` and the
//! in-flight counter mutate afterwards. `healthy` transitions happen
//! inside [`crate::index::ModelIndex`] under its write lock so that index
//! cleanup and the flag flip are one atomic step for readers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use indexmap::IndexMap;
use secrecy::SecretString;

use crossbar_config::ProviderConfig;

use crate::client::{HttpUpstreamClient, UpstreamApi};

/// Where a provider's model catalog comes from
#[derive(Debug, Clone)]
pub enum ModelSource {
    /// Fixed list from configuration; never probed, never quarantined by
    /// the reconciler
    Static(Vec<String>),
    /// Discovered via `list_models` on refresh
    Dynamic,
}

/// One configured upstream and its runtime state
pub struct Provider {
    pub name: String,
    pub enabled: bool,
    pub source: ModelSource,
    pub allowlist: Vec<String>,
    pub denylist: Vec<String>,
    pub native_responses: bool,
    pub client: Arc<dyn UpstreamApi>,
    healthy: AtomicBool,
    active: AtomicI64,
}

impl Provider {
    pub fn new(name: String, config: &ProviderConfig, client: Arc<dyn UpstreamApi>) -> Self {
        let source = if config.models.is_empty() {
            ModelSource::Dynamic
        } else {
            ModelSource::Static(config.models.clone())
        };

        Self {
            name,
            enabled: config.enabled,
            source,
            allowlist: config.allowlist.clone(),
            denylist: config.denylist.clone(),
            native_responses: config.native_responses,
            client,
            // Providers start healthy; the first refresh verifies
            healthy: AtomicBool::new(true),
            active: AtomicI64::new(0),
        }
    }

    pub fn is_static(&self) -> bool {
        matches!(self.source, ModelSource::Static(_))
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    /// Flip the liveness flag. Callers must hold the model index write
    /// lock; see the module docs.
    pub(crate) fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Release);
    }

    pub fn active(&self) -> i64 {
        self.active.load(Ordering::Relaxed)
    }

    /// Apply the allow/deny policy to a model id: deny first, then the
    /// allowlist must contain the id when present
    pub fn allows_model(&self, model: &str) -> bool {
        if self.denylist.iter().any(|m| m == model) {
            return false;
        }
        if !self.allowlist.is_empty() {
            return self.allowlist.iter().any(|m| m == model);
        }
        true
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .field("healthy", &self.is_healthy())
            .field("active", &self.active())
            .finish_non_exhaustive()
    }
}

/// RAII guard for one in-flight completion.
///
/// Dropped when the response is done or the client disconnects, so the
/// counter cannot leak; the decrement saturates at zero.
pub struct ActiveGuard {
    provider: Arc<Provider>,
}

impl ActiveGuard {
    pub fn acquire(provider: Arc<Provider>) -> Self {
        provider.active.fetch_add(1, Ordering::Relaxed);
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<Provider> {
        &self.provider
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let _ = self
            .provider
            .active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| Some((n - 1).max(0)));
    }
}

/// All configured providers, keyed by name in declaration order
pub struct ProviderRegistry {
    providers: IndexMap<String, Arc<Provider>>,
}

impl ProviderRegistry {
    /// Build the registry from configuration, skipping disabled entries.
    ///
    /// # Errors
    ///
    /// Returns an error if an upstream client cannot be constructed.
    pub fn from_config(
        providers: &IndexMap<String, ProviderConfig>,
    ) -> Result<Self, anyhow::Error> {
        let mut map = IndexMap::new();

        for (name, config) in providers {
            if !config.enabled {
                tracing::debug!(provider = %name, "skipping disabled provider");
                continue;
            }

            let token: Option<SecretString> = config.token.clone();
            let client = Arc::new(HttpUpstreamClient::new(config.base_url.clone(), token)?);
            let provider = Arc::new(Provider::new(name.clone(), config, client));

            tracing::info!(provider = %name, base_url = %config.base_url, "initialized provider");
            map.insert(name.clone(), provider);
        }

        Ok(Self { providers: map })
    }

    /// Build a registry from pre-constructed providers (tests)
    pub fn from_providers(providers: Vec<Arc<Provider>>) -> Self {
        Self {
            providers: providers.into_iter().map(|p| (p.name.clone(), p)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Provider>> {
        self.providers.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Provider>> {
        self.providers.values()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
