use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// How the `claude` executable is located and supervised
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CliConfig {
    /// Executable name or path
    #[serde(default = "default_path")]
    pub path: PathBuf,
    /// Working directory for every invocation
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    /// Wall-clock ceiling for a single invocation
    #[serde(default = "default_timeout", deserialize_with = "crate::duration::deserialize")]
    pub timeout: Duration,
    /// Longest silence on stdout before the invocation is abandoned
    #[serde(default = "default_idle_timeout", deserialize_with = "crate::duration::deserialize")]
    pub idle_timeout: Duration,
    /// How long to wait for a killed process to be reaped
    #[serde(default = "default_kill_grace", deserialize_with = "crate::duration::deserialize")]
    pub kill_grace: Duration,
    /// Buffered output lines between the process reader and the response
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            cwd: None,
            timeout: default_timeout(),
            idle_timeout: default_idle_timeout(),
            kill_grace: default_kill_grace(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_path() -> PathBuf {
    PathBuf::from("claude")
}

const fn default_timeout() -> Duration {
    Duration::from_secs(300)
}

const fn default_idle_timeout() -> Duration {
    Duration::from_secs(180)
}

const fn default_kill_grace() -> Duration {
    Duration::from_secs(5)
}

const fn default_channel_capacity() -> usize {
    64
}
