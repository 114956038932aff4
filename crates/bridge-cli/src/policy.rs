//! Process-wide tool and directory permissions

use std::path::{Component, Path, PathBuf};

use bridge_config::{PermissionMode, PermissionsConfig};

/// Immutable permission set consulted by every request
///
/// Built once at startup. Directories are canonicalized so that containment
/// checks compare like with like.
#[derive(Debug, Clone)]
pub struct PermissionPolicy {
    allowed_tools: Vec<String>,
    disallowed_tools: Vec<String>,
    allowed_directories: Vec<PathBuf>,
    mode: PermissionMode,
}

impl PermissionPolicy {
    /// Validate the configured permissions and resolve their directories
    ///
    /// # Errors
    ///
    /// Fails when a directory is relative, missing, or not a directory, when
    /// directories are configured without any allowed tool, or when a tool is
    /// both allowed and disallowed
    pub fn from_config(config: &PermissionsConfig) -> anyhow::Result<Self> {
        if !config.allowed_directories.is_empty() && config.allowed_tools.is_empty() {
            anyhow::bail!("allowed directories are configured but no allowed tools are");
        }

        if let Some(tool) = config
            .disallowed_tools
            .iter()
            .find(|tool| config.allowed_tools.contains(tool))
        {
            anyhow::bail!("tool '{tool}' is both allowed and disallowed");
        }

        let mut allowed_directories = Vec::with_capacity(config.allowed_directories.len());
        for dir in &config.allowed_directories {
            if !dir.is_absolute() {
                anyhow::bail!("allowed directory must be an absolute path: {}", dir.display());
            }

            let canonical = dir
                .canonicalize()
                .map_err(|e| anyhow::anyhow!("allowed directory {} is not accessible: {e}", dir.display()))?;

            if !canonical.is_dir() {
                anyhow::bail!("allowed directory {} is not a directory", dir.display());
            }

            allowed_directories.push(canonical);
        }

        Ok(Self {
            allowed_tools: config.allowed_tools.clone(),
            disallowed_tools: config.disallowed_tools.clone(),
            allowed_directories,
            mode: config.mode,
        })
    }

    /// Whether `tool` may be used, optionally against `directory`
    ///
    /// The tool must be allowed and not disallowed. A directory, when given,
    /// must lie inside one of the allowed directories.
    pub fn authorize(&self, tool: &str, directory: Option<&Path>) -> bool {
        if !self.allowed_tools.iter().any(|t| t == tool) || self.disallowed_tools.iter().any(|t| t == tool) {
            return false;
        }

        directory.is_none_or(|dir| self.contains_directory(dir))
    }

    fn contains_directory(&self, dir: &Path) -> bool {
        if !dir.is_absolute() || dir.components().any(|c| matches!(c, Component::ParentDir)) {
            return false;
        }

        self.allowed_directories.iter().any(|allowed| dir.starts_with(allowed))
    }

    /// Directory that receives materialized attachments
    pub fn upload_directory(&self) -> Option<&Path> {
        self.allowed_directories.first().map(PathBuf::as_path)
    }

    pub fn allowed_tools(&self) -> &[String] {
        &self.allowed_tools
    }

    pub fn disallowed_tools(&self) -> &[String] {
        &self.disallowed_tools
    }

    pub fn allowed_directories(&self) -> &[PathBuf] {
        &self.allowed_directories
    }

    pub const fn mode(&self) -> PermissionMode {
        self.mode
    }
}
