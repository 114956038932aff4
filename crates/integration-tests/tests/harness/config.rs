//! Programmatic configuration builder for integration tests

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bridge_config::{Config, CorsConfig, ServerConfig};

/// Builder for constructing test configurations
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Minimal configuration running the given executable
    pub fn new(cli: &Path) -> Self {
        let mut config = Config {
            server: ServerConfig {
                listen_address: Some(SocketAddr::from(([127, 0, 0, 1], 0))),
                ..ServerConfig::default()
            },
            ..Config::default()
        };
        config.cli.path = cli.to_path_buf();
        config.cli.timeout = Duration::from_secs(10);

        Self { config }
    }

    /// Lower the per-invocation wall-clock limit
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.cli.timeout = timeout;
        self
    }

    /// Allow tools without prompting
    pub fn with_allowed_tools(mut self, tools: &[&str]) -> Self {
        self.config.permissions.allowed_tools = tools.iter().map(|&t| t.to_owned()).collect();
        self
    }

    /// Allow the CLI to read (and the bridge to upload into) a directory
    pub fn with_allowed_directory(mut self, dir: &Path) -> Self {
        self.config.permissions.allowed_directories.push(PathBuf::from(dir));
        self
    }

    /// Set CORS configuration
    pub fn with_cors(mut self, config: CorsConfig) -> Self {
        self.config.server.cors = Some(config);
        self
    }

    /// Probe the CLI version from the health endpoint
    pub fn with_cli_health_check(mut self) -> Self {
        self.config.server.health.check_cli = true;
        self
    }

    /// Disable health endpoint
    pub fn without_health(mut self) -> Self {
        self.config.server.health.enabled = false;
        self
    }

    /// Build the final config
    pub fn build(self) -> Config {
        self.config.validate().unwrap();
        self.config
    }
}
