//! Configuration for the crossbar gateway.
//!
//! Loaded from a TOML file with `{{ env.VAR }}` placeholders expanded
//! before deserialization.

mod env;
mod loader;
pub mod logging;
pub mod models;
pub mod provider;
pub mod server;
pub mod store;
pub mod tools;

use indexmap::IndexMap;
use serde::Deserialize;

pub use logging::{LogFormat, LoggingConfig};
pub use models::ModelsConfig;
pub use provider::ProviderConfig;
pub use server::ServerConfig;
pub use store::StoreConfig;
pub use tools::ToolsConfig;

/// Top-level crossbar configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Listen address and shared bearer token
    #[serde(default)]
    pub server: ServerConfig,
    /// Log level and output format
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Upstream providers keyed by name; iteration order follows the
    /// order of declaration in the config file
    #[serde(default)]
    pub providers: IndexMap<String, ProviderConfig>,
    /// Model index refresh behavior
    #[serde(default)]
    pub models: ModelsConfig,
    /// Script tool discovery roots
    #[serde(default)]
    pub tools: ToolsConfig,
    /// Responses/conversations persistence
    #[serde(default)]
    pub store: StoreConfig,
}
