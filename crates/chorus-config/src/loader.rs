use std::collections::HashSet;
use std::path::Path;

use crate::{AnyOrList, Config};

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::from_toml(&raw)
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing or validation fails
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// Provider identifiers are checked against the adapter registry by the
    /// crates that own it; this pass covers structural rules only.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first violated rule
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_server()?;
        self.validate_targets()?;
        Ok(())
    }

    fn validate_server(&self) -> anyhow::Result<()> {
        let path = &self.server.relay_path;
        if !path.starts_with('/') {
            anyhow::bail!("server.relay_path must start with '/': `{path}`");
        }
        if path.len() > 1 && path.ends_with('/') {
            anyhow::bail!("server.relay_path must not end with '/': `{path}`");
        }
        if let Some(cors) = &self.server.cors
            && cors.credentials
            && cors.origins == AnyOrList::Any
        {
            anyhow::bail!("server.cors.credentials requires an explicit origin list");
        }
        Ok(())
    }

    fn validate_targets(&self) -> anyhow::Result<()> {
        let mut seen = HashSet::new();

        for target in &self.targets {
            if target.id.trim().is_empty() {
                anyhow::bail!("target ids must not be empty");
            }
            if !seen.insert(target.id.as_str()) {
                anyhow::bail!("duplicate target id '{}'", target.id);
            }
            if target.provider.trim().is_empty() {
                anyhow::bail!("target '{}' has no provider", target.id);
            }
            if target.model.trim().is_empty() {
                anyhow::bail!("target '{}' has no model", target.id);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use secrecy::ExposeSecret;

    use crate::{Config, PersistPolicy};

    const FULL: &str = r#"
        [server]
        listen_address = "127.0.0.1:4000"
        relay_path = "/relay"

        [server.health]
        path = "/healthz"

        [providers.openai]
        api_key = "{{ env.CHORUS_TEST_OPENAI_KEY }}"

        [providers.dify]
        api_key = "app-123"
        base_url = "https://dify.internal/v1"

        [dispatch]
        stream_idle_timeout = "30s"
        persist = "on_settle"

        [[targets]]
        id = "gpt"
        provider = "openai"
        model = "gpt-4o-mini"

        [[targets]]
        id = "workflow"
        provider = "dify"
        model = "dify-app"
        conversation_id = "conv-1"

        [targets.workflow_inputs]
        topic = "rust"
    "#;

    #[test]
    fn loads_full_config_from_file() {
        temp_env::with_var("CHORUS_TEST_OPENAI_KEY", Some("sk-from-env"), || {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            file.write_all(FULL.as_bytes()).unwrap();

            let config = Config::load(file.path()).unwrap();

            assert_eq!(config.server.relay_path, "/relay");
            assert_eq!(config.server.health.path, "/healthz");
            assert_eq!(config.providers["openai"].api_key.expose_secret(), "sk-from-env");
            assert_eq!(
                config.dispatch.stream_idle_timeout,
                Some(std::time::Duration::from_secs(30))
            );
            assert_eq!(config.dispatch.persist, PersistPolicy::OnSettle);
            assert_eq!(config.targets.len(), 2);
            assert_eq!(config.targets[1].conversation_id.as_deref(), Some("conv-1"));
            assert_eq!(config.targets[1].workflow_inputs["topic"], "rust");
        });
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = Config::load(std::path::Path::new("/nonexistent/chorus.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.server.relay_path, "/api");
        assert!(config.server.health.enabled);
        assert!(config.providers.is_empty());
        assert!(config.dispatch.stream_idle_timeout.is_none());
        assert!(config.dispatch.follow_up_suggestions);
    }

    #[test]
    fn duplicate_target_ids_are_rejected() {
        let raw = r#"
            [[targets]]
            id = "a"
            provider = "openai"
            model = "gpt-4o"

            [[targets]]
            id = "a"
            provider = "anthropic"
            model = "claude-sonnet-4-5"
        "#;
        let err = Config::from_toml(raw).unwrap_err();
        assert!(err.to_string().contains("duplicate target id 'a'"));
    }

    #[test]
    fn relay_path_must_be_absolute() {
        let err = Config::from_toml("[server]\nrelay_path = \"api\"").unwrap_err();
        assert!(err.to_string().contains("must start with '/'"));
    }

    #[test]
    fn credentials_need_explicit_origins() {
        let raw = "[server.cors]\ncredentials = true";
        let err = Config::from_toml(raw).unwrap_err();
        assert!(err.to_string().contains("explicit origin list"));

        let raw = "[server.cors]\ncredentials = true\norigins = [\"http://localhost:5173\"]";
        assert!(Config::from_toml(raw).is_ok());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = Config::from_toml("[dispatch]\nretries = 3").unwrap_err();
        assert!(err.to_string().contains("failed to parse config"));
    }
}
