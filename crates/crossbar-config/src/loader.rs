use std::path::Path;

use crate::Config;

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, expansion fails,
    /// TOML parsing fails, or validation fails.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from raw TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing, or validation fails.
    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self =
            toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed provider entries or tool roots that
    /// point at files.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, provider) in &self.providers {
            if name.is_empty() {
                anyhow::bail!("provider name must not be empty");
            }
            match provider.base_url.scheme() {
                "http" | "https" => {}
                other => {
                    anyhow::bail!("provider '{name}' has unsupported base_url scheme '{other}'");
                }
            }
        }

        if let Some(ref root) = self.tools.root {
            if root.is_file() {
                anyhow::bail!("tools.root must be a directory: {}", root.display());
            }
        }
        if let Some(ref root) = self.tools.libraries_root {
            if root.is_file() {
                anyhow::bail!("tools.libraries_root must be a directory: {}", root.display());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::Config;

    #[test]
    fn minimal_config_parses() {
        let config = Config::from_toml_str("").unwrap();
        assert!(config.providers.is_empty());
        assert!(config.models.refresh_on_list);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn provider_order_follows_declaration() {
        let config = Config::from_toml_str(
            r#"
            [providers.zeta]
            base_url = "http://zeta.local/v1"

            [providers.alpha]
            base_url = "http://alpha.local/v1"
            "#,
        )
        .unwrap();

        let names: Vec<&String> = config.providers.keys().collect();
        assert_eq!(names, ["zeta", "alpha"]);
    }

    #[test]
    fn provider_defaults() {
        let config = Config::from_toml_str(
            r#"
            [providers.local]
            base_url = "http://127.0.0.1:11434/v1"
            "#,
        )
        .unwrap();

        let provider = &config.providers["local"];
        assert!(provider.enabled);
        assert!(provider.models.is_empty());
        assert!(!provider.native_responses);
    }

    #[test]
    fn rejects_non_http_scheme() {
        let err = Config::from_toml_str(
            r#"
            [providers.bad]
            base_url = "ftp://example.com/v1"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("scheme"));
    }

    #[test]
    fn static_models_and_policies() {
        let config = Config::from_toml_str(
            r#"
            [providers.pinned]
            base_url = "http://127.0.0.1:9000/v1"
            models = ["m1", "m2"]
            allowlist = ["m1"]
            denylist = ["m2"]
            "#,
        )
        .unwrap();

        let provider = &config.providers["pinned"];
        assert_eq!(provider.models, ["m1", "m2"]);
        assert_eq!(provider.allowlist, ["m1"]);
        assert_eq!(provider.denylist, ["m2"]);
    }
}
