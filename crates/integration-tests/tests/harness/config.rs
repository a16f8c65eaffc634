//! Programmatic configuration builder for integration tests

use std::net::SocketAddr;
use std::path::Path;

use crossbar_config::{Config, ProviderConfig};
use url::Url;

/// Builder for constructing test configurations
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        let mut config = Config::default();
        config.server.listen_address = Some(SocketAddr::from(([127, 0, 0, 1], 0)));
        Self { config }
    }

    /// Add a dynamic provider pointing at a mock upstream
    pub fn with_provider(mut self, name: &str, base_url: &str) -> Self {
        self.config
            .providers
            .insert(name.to_owned(), provider_config(base_url, &[]));
        self
    }

    /// Add a provider with a static model list
    #[allow(dead_code)]
    pub fn with_static_provider(mut self, name: &str, base_url: &str, models: &[&str]) -> Self {
        self.config
            .providers
            .insert(name.to_owned(), provider_config(base_url, models));
        self
    }

    /// Require the shared bearer token on every endpoint except `/health`
    #[allow(dead_code)]
    pub fn with_token(mut self, token: &str) -> Self {
        self.config.server.token = Some(token.to_owned().into());
        self
    }

    /// Point the tool runtime at a tools directory
    #[allow(dead_code)]
    pub fn with_tools_root(mut self, root: &Path) -> Self {
        self.config.tools.root = Some(root.to_owned());
        self
    }

    /// Enable the responses/conversations store
    #[allow(dead_code)]
    pub fn with_store_path(mut self, path: &Path) -> Self {
        self.config.store.path = Some(path.to_owned());
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

fn provider_config(base_url: &str, models: &[&str]) -> ProviderConfig {
    ProviderConfig {
        base_url: Url::parse(base_url).expect("test base url is valid"),
        token: None,
        enabled: true,
        models: models.iter().map(|m| (*m).to_owned()).collect(),
        allowlist: Vec::new(),
        denylist: Vec::new(),
        native_responses: false,
    }
}
