use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Configuration for a single OpenAI-compatible upstream
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Base URL including the API prefix, e.g. `https://api.openai.com/v1`
    pub base_url: Url,
    /// Bearer credential sent to the upstream
    #[serde(default)]
    pub token: Option<SecretString>,
    /// Disabled providers are dropped at startup
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Static model list; when non-empty the provider is never probed
    /// with `list_models` and never quarantined by the reconciler
    #[serde(default)]
    pub models: Vec<String>,
    /// Model ids accepted from this provider; empty means all
    #[serde(default)]
    pub allowlist: Vec<String>,
    /// Model ids rejected from this provider; checked before the allowlist
    #[serde(default)]
    pub denylist: Vec<String>,
    /// Provider implements the responses API natively
    #[serde(default)]
    pub native_responses: bool,
}

fn default_enabled() -> bool {
    true
}
