use std::path::PathBuf;

use serde::Deserialize;

/// Responses/conversations persistence settings
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Database directory; persistence is disabled when absent
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Records older than this many days are lazily expired; 0 keeps forever
    #[serde(default)]
    pub ttl_days: u64,
}
