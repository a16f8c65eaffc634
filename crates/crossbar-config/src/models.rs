use serde::Deserialize;

/// Model index refresh behavior
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelsConfig {
    /// Refresh the model index on every `GET /v1/models`
    #[serde(default = "default_refresh_on_list")]
    pub refresh_on_list: bool,
    /// Periodic background refresh interval in seconds; 0 disables it
    #[serde(default)]
    pub refresh_interval_secs: u64,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            refresh_on_list: default_refresh_on_list(),
            refresh_interval_secs: 0,
        }
    }
}

fn default_refresh_on_list() -> bool {
    true
}
