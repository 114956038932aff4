use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::Config;

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

    /// Parse and validate configuration from TOML text
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
    /// # Errors
    ///
    /// Returns an error describing the first inconsistency found
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_server()?;
        self.validate_cli()?;
        self.validate_permissions()?;
        Ok(())
    }

    fn validate_server(&self) -> anyhow::Result<()> {
        let health = &self.server.health;
        if health.enabled && !health.path.starts_with('/') {
            anyhow::bail!("server.health.path must start with '/', got '{}'", health.path);
        }

        if let Some(ref cors) = self.server.cors
            && cors.credentials
            && [&cors.origins, &cors.methods, &cors.headers]
                .iter()
                .any(|list| matches!(list, crate::AnyOrArray::Any))
        {
            anyhow::bail!("server.cors.credentials cannot be combined with wildcard origins, methods or headers");
        }

        if let Some(ref telemetry) = self.telemetry
            && !(0.0..=1.0).contains(&telemetry.sampling_rate)
        {
            anyhow::bail!("telemetry.sampling_rate must be between 0.0 and 1.0");
        }

        Ok(())
    }

    fn validate_cli(&self) -> anyhow::Result<()> {
        let cli = &self.cli;

        if cli.path.as_os_str().is_empty() {
            anyhow::bail!("cli.path must not be empty");
        }

        for (name, value) in [
            ("timeout", cli.timeout),
            ("idle_timeout", cli.idle_timeout),
            ("kill_grace", cli.kill_grace),
        ] {
            if value == Duration::ZERO {
                anyhow::bail!("cli.{name} must be greater than zero");
            }
        }

        if cli.channel_capacity == 0 {
            anyhow::bail!("cli.channel_capacity must be greater than zero");
        }

        Ok(())
    }

    /// Tool sets must not overlap and uploads need a tool to read them
    fn validate_permissions(&self) -> anyhow::Result<()> {
        let permissions = &self.permissions;

        let allowed: HashSet<&str> = permissions.allowed_tools.iter().map(String::as_str).collect();
        let mut overlap: Vec<&str> = permissions
            .disallowed_tools
            .iter()
            .map(String::as_str)
            .filter(|tool| allowed.contains(tool))
            .collect();

        if !overlap.is_empty() {
            overlap.sort_unstable();
            anyhow::bail!(
                "tools cannot be both allowed and disallowed: {}",
                overlap.join(", ")
            );
        }

        if !permissions.allowed_directories.is_empty() && permissions.allowed_tools.is_empty() {
            anyhow::bail!("permissions.allowed_directories requires permissions.allowed_tools to be configured");
        }

        for dir in &permissions.allowed_directories {
            if !dir.is_absolute() {
                anyhow::bail!("allowed directory must be an absolute path: {}", dir.display());
            }
        }

        Ok(())
    }
}
