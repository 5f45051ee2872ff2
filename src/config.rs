use anyhow::{bail, Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::MirrorError;
use crate::model::{MirrorDirection, MirrorOptions};
use crate::origin::DEFAULT_HOST;

/// Main configuration structure for mirrormaker
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    /// GitLab connection settings
    #[serde(default)]
    pub origin: OriginConfig,

    /// GitHub authentication settings
    #[serde(default)]
    pub destination: DestinationConfig,

    /// Options applied to every created mirror
    #[serde(default)]
    pub mirror: MirrorOptions,

    /// Report what would be done without creating anything
    #[serde(default)]
    pub dry_run: bool,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How the origin host is reached
#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OriginBackend {
    /// GitLab REST API with a personal access token
    #[default]
    Token,
    /// Pre-authenticated `glab` CLI
    Glab,
}

/// GitLab configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OriginConfig {
    /// GitLab host, e.g. "gitlab.com" or "https://gitlab.example.com"
    #[serde(default = "default_host")]
    pub host: String,

    /// Personal access token (token backend only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(default)]
    pub backend: OriginBackend,

    /// Path to the glab executable
    #[serde(default = "default_glab_path")]
    pub glab_path: String,

    /// Timeout for HTTP requests and CLI invocations in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

/// GitHub configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DestinationConfig {
    /// Authentication method
    #[serde(default = "default_auth_method")]
    pub auth_method: String, // "auto", "gh_cli", "token"

    /// GitHub username (auto-detected if null)
    #[serde(default)]
    pub user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// API base for GitHub Enterprise
    #[serde(default)]
    pub api_url: Option<String>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String, // "info"
}

// Default value functions
fn default_host() -> String {
    DEFAULT_HOST.to_string()
}
fn default_glab_path() -> String {
    "glab".to_string()
}
fn default_timeout() -> u64 {
    30
}
fn default_auth_method() -> String {
    "auto".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            token: None,
            backend: OriginBackend::default(),
            glab_path: default_glab_path(),
            timeout: default_timeout(),
        }
    }
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            auth_method: default_auth_method(),
            user: None,
            token: None,
            api_url: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, or defaults if there is none
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_or_default_from(&config_path)
    }

    /// Load `path` if it exists, otherwise return defaults without writing anything
    pub fn load_or_default_from(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!("No configuration at {:?}, using defaults", path);
            let mut config = Self::default();
            config.expand_paths()?;
            Ok(config)
        }
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.expand_paths()?;

        Ok(config)
    }

    /// Save configuration to a file, creating its directory if needed
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("mirrormaker").join("config.yml"))
    }

    /// Expand environment variables and `~` in configured paths
    pub fn expand_paths(&mut self) -> Result<()> {
        self.origin.glab_path = shellexpand::full(&self.origin.glab_path)
            .context("Failed to expand glab_path")?
            .into_owned();

        Ok(())
    }

    /// Reject combinations that cannot work, before any network call
    pub fn validate(&self) -> Result<()> {
        if self.origin.backend == OriginBackend::Token {
            let has_token = self
                .origin
                .token
                .as_deref()
                .is_some_and(|token| !token.trim().is_empty());
            if !has_token {
                return Err(MirrorError::auth(
                    "no GitLab token configured; pass --gitlab-token, set MIRRORMAKER_GITLAB_TOKEN or use --use-glab",
                )
                .into());
            }

            if self.mirror.direction == MirrorDirection::Pull {
                bail!("pull mirrors require the glab backend (--use-glab)");
            }
        }

        if self.origin.host.trim().is_empty() {
            bail!("GitLab host must not be empty");
        }

        if self.origin.timeout == 0 {
            bail!("Timeout must be at least one second");
        }

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.origin.timeout)
    }
}
