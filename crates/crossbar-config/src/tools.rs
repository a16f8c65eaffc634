use std::path::PathBuf;

use serde::Deserialize;

/// Filesystem roots for the script tool runtime
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolsConfig {
    /// Directory scanned for tool manifests, one subdirectory per tool
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Directory searched for on-demand script libraries
    #[serde(default)]
    pub libraries_root: Option<PathBuf>,
}
