//! Uploader configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/content-sources/uploader.toml`
//! - Windows: `%APPDATA%/content-sources/uploader.toml`

use std::path::{Path, PathBuf};

use content_sources_protocol::{BATCH_SIZE, MAX_CHUNK_SIZE, MAX_RETRY_COUNT, UploadLimits};
use serde::{Deserialize, Serialize};

/// Uploader configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Content sources API root, e.g. `https://console.example.com/api/content-sources/v1`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token sent with every request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: u64,

    /// Small files uploaded together, and chunks per wave for large files.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Retries per chunk before the file is marked failed.
    #[serde(default = "default_max_retry_count")]
    pub max_retry_count: u32,
}

fn default_base_url() -> String {
    "http://localhost:8000/api/content-sources/v1".into()
}

fn default_max_chunk_size() -> u64 {
    MAX_CHUNK_SIZE
}

fn default_batch_size() -> usize {
    BATCH_SIZE
}

fn default_max_retry_count() -> u32 {
    MAX_RETRY_COUNT
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            max_chunk_size: default_max_chunk_size(),
            batch_size: default_batch_size(),
            max_retry_count: default_max_retry_count(),
        }
    }
}

impl Config {
    /// Loads configuration from the default location, creating it if missing.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path()?)
    }

    /// Loads configuration from `path`, or writes and returns the defaults.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Saves the configuration to `path`.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        // The file may hold a token.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn limits(&self) -> UploadLimits {
        UploadLimits {
            max_chunk_size: self.max_chunk_size,
            batch_size: self.batch_size,
            max_retry_count: self.max_retry_count,
        }
        .sanitized()
    }
}

/// Returns the platform-specific configuration file path.
pub fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("content-sources")
            .join("uploader.toml"))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata)
            .join("content-sources")
            .join("uploader.toml"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        Ok(PathBuf::from("/tmp/content-sources/uploader.toml"))
    }
}
