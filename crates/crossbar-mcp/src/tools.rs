//! Filesystem discovery of script tools.
//!
//! The tools root is re-scanned on every call, so adding, editing, or
//! removing a tool directory is visible immediately without a restart.
//! Defective manifests are skipped with a warning and never surfaced.

use std::path::PathBuf;

use crate::manifest::{MANIFEST_FILE, ToolManifest, ToolSpec, Visibility};

/// Scans the tools root one level deep for `tool.toml` manifests
#[derive(Debug, Clone, Default)]
pub struct ToolScanner {
    root: Option<PathBuf>,
}

impl ToolScanner {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }

    /// Collect all valid tools.
    ///
    /// When two manifests declare the same name the later one in scan
    /// order wins; the collision is logged.
    pub fn scan(&self) -> Vec<ToolSpec> {
        let Some(ref root) = self.root else {
            return Vec::new();
        };

        let entries = match std::fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!(root = %root.display(), error = %e, "tools root not readable");
                return Vec::new();
            }
        };

        let mut tools: Vec<ToolSpec> = Vec::new();

        for entry in entries.flatten() {
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }

            let manifest_path = dir.join(MANIFEST_FILE);
            if !manifest_path.is_file() {
                continue;
            }

            let raw = match std::fs::read_to_string(&manifest_path) {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(path = %manifest_path.display(), error = %e, "failed to read tool manifest");
                    continue;
                }
            };

            let manifest: ToolManifest = match toml::from_str(&raw) {
                Ok(manifest) => manifest,
                Err(e) => {
                    tracing::warn!(path = %manifest_path.display(), error = %e, "failed to parse tool manifest");
                    continue;
                }
            };

            let name = manifest.name.clone().unwrap_or_else(|| {
                dir.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });
            if name.is_empty() {
                tracing::warn!(path = %manifest_path.display(), "tool has no usable name");
                continue;
            }

            let script_path = dir.join(&manifest.script);
            if !script_path.is_file() {
                tracing::warn!(
                    tool = %name,
                    script = %script_path.display(),
                    "tool script not found, skipping"
                );
                continue;
            }

            if let Some(existing) = tools.iter().position(|t| t.name == name) {
                tracing::warn!(tool = %name, "duplicate tool name, later manifest wins");
                tools.remove(existing);
            }

            tools.push(ToolSpec {
                name,
                manifest,
                script_path,
            });
        }

        tools
    }

    /// Scan and pick one tool by name
    pub fn find(&self, name: &str) -> Option<ToolSpec> {
        self.scan().into_iter().find(|t| t.name == name)
    }
}

/// Split a scan result by manifest visibility
pub fn partition_by_visibility(tools: Vec<ToolSpec>) -> (Vec<ToolSpec>, Vec<ToolSpec>) {
    tools
        .into_iter()
        .partition(|t| t.visibility() == Visibility::Listed)
}
