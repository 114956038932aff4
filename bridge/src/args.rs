use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use bridge_config::{Config, PermissionMode};
use clap::{ArgAction, Parser};

/// Messages API bridge for the `claude` CLI
#[derive(Debug, Parser)]
#[command(name = "claude-bridge", about = "Serve the Anthropic Messages API through the claude CLI")]
pub struct Args {
    /// Path to configuration file; built-in defaults are used without one
    #[arg(short, long, env = "BRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the listen address
    #[arg(long, env = "BRIDGE_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Increase log verbosity (`-v` debug, `-vv` trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Path to the claude executable
    #[arg(long, env = "BRIDGE_CLI_PATH")]
    pub cli_path: Option<PathBuf>,

    /// Working directory for CLI invocations
    #[arg(long, env = "BRIDGE_CWD")]
    pub cwd: Option<PathBuf>,

    /// Tools the CLI may use, comma separated
    #[arg(long, env = "BRIDGE_ALLOWED_TOOLS", value_delimiter = ',')]
    pub allowed_tools: Option<Vec<String>>,

    /// Tools the CLI must never use, comma separated
    #[arg(long, env = "BRIDGE_DISALLOWED_TOOLS", value_delimiter = ',')]
    pub disallowed_tools: Option<Vec<String>>,

    /// Directories the CLI may read, comma separated
    #[arg(long, env = "BRIDGE_ALLOWED_DIRECTORIES", value_delimiter = ',')]
    pub allowed_directories: Option<Vec<PathBuf>>,

    /// Permission mode passed to the CLI
    #[arg(long, env = "BRIDGE_PERMISSION_MODE")]
    pub permission_mode: Option<PermissionMode>,

    /// Wall-clock limit per CLI invocation, e.g. `300s` or `5m`
    #[arg(long, env = "BRIDGE_TIMEOUT", value_parser = parse_duration)]
    pub timeout: Option<Duration>,
}

impl Args {
    /// Load the configuration file (or defaults) and apply flag overrides
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded or the merged
    /// configuration fails validation
    pub fn load_config(&self) -> anyhow::Result<Config> {
        let mut config = match self.config {
            Some(ref path) => Config::load(path)?,
            None => Config::default(),
        };

        self.apply(&mut config);
        config.validate()?;

        Ok(config)
    }

    fn apply(&self, config: &mut Config) {
        if let Some(listen) = self.listen {
            config.server.listen_address = Some(listen);
        }
        if let Some(ref path) = self.cli_path {
            config.cli.path.clone_from(path);
        }
        if let Some(ref cwd) = self.cwd {
            config.cli.cwd = Some(cwd.clone());
        }
        if let Some(timeout) = self.timeout {
            config.cli.timeout = timeout;
        }

        let permissions = &mut config.permissions;
        if let Some(ref tools) = self.allowed_tools {
            permissions.allowed_tools = non_empty(tools);
        }
        if let Some(ref tools) = self.disallowed_tools {
            permissions.disallowed_tools = non_empty(tools);
        }
        if let Some(ref dirs) = self.allowed_directories {
            permissions.allowed_directories = dirs.iter().filter(|d| !d.as_os_str().is_empty()).cloned().collect();
        }
        if let Some(mode) = self.permission_mode {
            permissions.mode = mode;
        }
    }

    /// Default log filter for the verbosity level
    pub const fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

fn non_empty(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .collect()
}

fn parse_duration(raw: &str) -> Result<Duration, String> {
    duration_str::parse(raw).map_err(|e| format!("invalid duration '{raw}': {e}"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("claude-bridge").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_without_config_file() {
        temp_env::with_vars_unset(["BRIDGE_CONFIG", "BRIDGE_CLI_PATH", "BRIDGE_TIMEOUT"], || {
            let args = parse(&[]);
            let config = args.load_config().unwrap();

            assert_eq!(config.cli.path, PathBuf::from("claude"));
            assert_eq!(config.cli.timeout, Duration::from_secs(300));
            assert_eq!(args.log_filter(), "info");
        });
    }

    #[test]
    fn flags_override_file_values() {
        let mut file = tempfile_with(
            r#"
            [cli]
            path = "/usr/bin/claude"
            timeout = "10m"

            [permissions]
            allowed_tools = ["Read"]
        "#,
        );
        file.flush().unwrap();
        let path = file.path().to_str().unwrap().to_owned();

        temp_env::with_vars_unset(["BRIDGE_DISALLOWED_TOOLS", "BRIDGE_ALLOWED_DIRECTORIES"], || {
            let args = parse(&[
                "--config",
                &path,
                "--cli-path",
                "/opt/claude",
                "--timeout",
                "90s",
                "--allowed-tools",
                "Read,Glob",
                "--permission-mode",
                "plan",
                "--listen",
                "127.0.0.1:9999",
                "-vv",
            ]);
            let config = args.load_config().unwrap();

            assert_eq!(config.cli.path, PathBuf::from("/opt/claude"));
            assert_eq!(config.cli.timeout, Duration::from_secs(90));
            assert_eq!(config.permissions.allowed_tools, ["Read", "Glob"]);
            assert_eq!(config.permissions.mode, PermissionMode::Plan);
            assert_eq!(config.server.listen_address().port(), 9999);
            assert_eq!(args.log_filter(), "trace");
        });
    }

    #[test]
    fn environment_variables_are_read() {
        temp_env::with_vars(
            [
                ("BRIDGE_DISALLOWED_TOOLS", Some("Bash, Write")),
                ("BRIDGE_TIMEOUT", Some("2m")),
                ("BRIDGE_PERMISSION_MODE", Some("acceptEdits")),
            ],
            || {
                let config = parse(&[]).load_config().unwrap();
                assert_eq!(config.permissions.disallowed_tools, ["Bash", "Write"]);
                assert_eq!(config.cli.timeout, Duration::from_secs(120));
                assert_eq!(config.permissions.mode, PermissionMode::AcceptEdits);
            },
        );
    }

    #[test]
    fn overrides_are_validated() {
        let args = parse(&["--allowed-tools", "Bash", "--disallowed-tools", "Bash"]);
        let err = args.load_config().unwrap_err();
        assert!(err.to_string().contains("Bash"));
    }

    #[test]
    fn rejects_bad_duration() {
        let err = Args::try_parse_from(["claude-bridge", "--timeout", "soon"]).unwrap_err();
        assert!(err.to_string().contains("invalid duration"));
    }

    fn tempfile_with(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }
}
