//! Run configuration.
//!
//! Everything the pipeline needs is resolved once, here, at startup.
//! Stages receive a `&UpdateConfig` and never read environment variables
//! or the working directory themselves.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level updater configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Root of the application checkout.
    #[serde(default = "default_repository_root")]
    pub repository_root: PathBuf,

    /// Git remote to fetch from.
    #[serde(default = "default_remote")]
    pub remote: String,

    /// Branch updated when no branch argument is given.
    #[serde(default = "default_branch")]
    pub default_branch: String,

    /// Branch selected for this run. Set from the CLI positional argument,
    /// never from the config file.
    #[serde(skip)]
    pub branch: Option<String>,

    /// Leave the application running while the update proceeds, so its
    /// overlay can tail our progress lines.
    #[serde(default)]
    pub keep_app_running: bool,

    /// Process name/command-line pattern of the target application.
    #[serde(default = "default_app_process_name")]
    pub app_process_name: String,

    /// Cache directory reconciled after an update.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Isolated Python environment directory.
    #[serde(default)]
    pub venv_dir: Option<PathBuf>,

    /// Dependency manifest file name at the repository root.
    #[serde(default = "default_manifest")]
    pub manifest: String,

    /// Countdown before the reboot cascade starts.
    #[serde(default = "default_reboot_delay")]
    #[serde(with = "humantime_serde")]
    pub reboot_delay: Duration,

    /// Stop after the update without rebooting.
    #[serde(default)]
    pub skip_reboot: bool,
}

fn default_repository_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_branch() -> String {
    "master".to_string()
}

fn default_app_process_name() -> String {
    "dashboard".to_string()
}

fn default_manifest() -> String {
    "requirements.txt".to_string()
}

const fn default_reboot_delay() -> Duration {
    Duration::from_secs(5)
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            repository_root: default_repository_root(),
            remote: default_remote(),
            default_branch: default_branch(),
            branch: None,
            keep_app_running: false,
            app_process_name: default_app_process_name(),
            cache_dir: None,
            venv_dir: None,
            manifest: default_manifest(),
            reboot_delay: default_reboot_delay(),
            skip_reboot: false,
        }
    }
}

impl UpdateConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// The branch this run updates to.
    pub fn target_branch(&self) -> &str {
        self.branch.as_deref().unwrap_or(&self.default_branch)
    }

    /// The cache directory, defaulting to `<repository_root>/cache`.
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| self.repository_root.join("cache"))
    }

    /// The Python environment directory, defaulting to a `venv` sibling
    /// of the repository.
    pub fn venv_dir(&self) -> PathBuf {
        self.venv_dir.clone().unwrap_or_else(|| {
            self.repository_root
                .parent()
                .unwrap_or(&self.repository_root)
                .join("venv")
        })
    }
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file.
    #[error("failed to read config file: {0}")]
    Io(#[source] std::io::Error),

    /// Failed to parse the config file.
    #[error("failed to parse config file: {0}")]
    Parse(#[source] toml::de::Error),
}
