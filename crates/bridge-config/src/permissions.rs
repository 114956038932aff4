use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;

/// Tool and filesystem permissions handed to the CLI
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PermissionsConfig {
    /// Tools the CLI may use without prompting
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    /// Tools the CLI must never use
    #[serde(default)]
    pub disallowed_tools: Vec<String>,
    /// Directories the CLI may read; uploaded attachments land in the first one
    #[serde(default)]
    pub allowed_directories: Vec<PathBuf>,
    /// Value passed to `--permission-mode`
    #[serde(default)]
    pub mode: PermissionMode,
}

/// CLI permission mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    Default,
    AcceptEdits,
    #[default]
    BypassPermissions,
    Plan,
}

impl PermissionMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::AcceptEdits => "acceptEdits",
            Self::BypassPermissions => "bypassPermissions",
            Self::Plan => "plan",
        }
    }
}

impl fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Self::Default),
            "acceptEdits" => Ok(Self::AcceptEdits),
            "bypassPermissions" => Ok(Self::BypassPermissions),
            "plan" => Ok(Self::Plan),
            other => Err(format!(
                "unknown permission mode '{other}' (expected default, acceptEdits, bypassPermissions or plan)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_bypass() {
        let config: PermissionsConfig = toml::from_str("").unwrap();
        assert_eq!(config.mode, PermissionMode::BypassPermissions);
        assert!(config.allowed_tools.is_empty());
        assert!(config.allowed_directories.is_empty());
    }

    #[test]
    fn mode_round_trips_through_its_cli_spelling() {
        for mode in [
            PermissionMode::Default,
            PermissionMode::AcceptEdits,
            PermissionMode::BypassPermissions,
            PermissionMode::Plan,
        ] {
            assert_eq!(mode.as_str().parse::<PermissionMode>().unwrap(), mode);
        }
        assert!("yolo".parse::<PermissionMode>().is_err());
    }

    #[test]
    fn deserializes_camel_case_mode() {
        let config: PermissionsConfig = toml::from_str(
            r#"
            allowed_tools = ["Read", "Grep"]
            allowed_directories = ["/tmp"]
            mode = "acceptEdits"
        "#,
        )
        .unwrap();

        assert_eq!(config.mode, PermissionMode::AcceptEdits);
        assert_eq!(config.allowed_tools, ["Read", "Grep"]);
    }
}
