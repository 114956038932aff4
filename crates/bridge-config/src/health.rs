use serde::Deserialize;

/// `GET` liveness endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthConfig {
    /// Mount the endpoint at all
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Route path, must start with `/`
    #[serde(default = "health_path")]
    pub path: String,
    /// Run `claude --version` on every check and answer 503 if it fails
    #[serde(default)]
    pub check_cli: bool,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: enabled_by_default(),
            path: health_path(),
            check_cli: false,
        }
    }
}

const fn enabled_by_default() -> bool {
    true
}

fn health_path() -> String {
    "/health".to_owned()
}
