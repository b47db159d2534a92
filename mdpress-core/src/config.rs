//! Configuration management for mdpress

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub preview: PreviewConfig,
    pub storage: StorageConfig,
}

/// Where the export service lives
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Reentrancy guard window for synchronized scrolling
    pub scroll_guard_ms: u64,
    /// Typeset math to MathML (otherwise math source is left in place)
    pub math: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Overrides the platform data directory for drafts
    pub dir: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            scroll_guard_ms: 50,
            math: true,
        }
    }
}

impl ServiceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl PreviewConfig {
    pub fn scroll_guard(&self) -> Duration {
        Duration::from_millis(self.scroll_guard_ms)
    }
}

impl Config {
    /// Get the platform-specific config file path
    pub fn config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "mdpress")
            .map(|proj_dirs| proj_dirs.config_dir().join("mdpress.toml"))
    }

    /// Load configuration from file, falling back to defaults if missing
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            Some(path) => {
                info!("config: {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            None => {
                info!("config: no config directory, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        // Check config file permissions (Unix only)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let metadata = std::fs::metadata(path)
                .with_context(|| format!("Failed to stat config file: {}", path.display()))?;
            if metadata.permissions().mode() & 0o002 != 0 {
                anyhow::bail!(
                    "Config file {} is world-writable (insecure permissions)",
                    path.display()
                );
            }
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        debug!(
            "config: loaded from {} (service={}, scroll_guard={}ms, math={})",
            path.display(),
            config.service.base_url,
            config.preview.scroll_guard_ms,
            config.preview.math
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service.base_url, "http://127.0.0.1:5000");
        assert_eq!(config.service.timeout(), Duration::from_secs(30));
        assert_eq!(config.preview.scroll_guard(), Duration::from_millis(50));
        assert!(config.preview.math);
        assert!(config.storage.dir.is_none());
    }

    #[test]
    fn test_load_valid_toml() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        file.write_all(
            b"[service]\n\
base_url = \"https://export.invalid\"\n\
timeout_secs = 5\n\
\n\
[preview]\n\
scroll_guard_ms = 80\n\
math = false\n\
\n\
[storage]\n\
dir = \"/tmp/mdpress\"\n",
        )?;

        let config = Config::load_from(file.path())?;
        assert_eq!(config.service.base_url, "https://export.invalid");
        assert_eq!(config.service.timeout_secs, 5);
        assert_eq!(config.preview.scroll_guard_ms, 80);
        assert!(!config.preview.math);
        assert_eq!(config.storage.dir, Some(PathBuf::from("/tmp/mdpress")));
        Ok(())
    }

    #[test]
    fn test_load_partial_toml() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        file.write_all(b"[preview]\nscroll_guard_ms = 20\n")?;

        let config = Config::load_from(file.path())?;
        assert_eq!(config.preview.scroll_guard_ms, 20);
        // Defaults for unspecified fields
        assert!(config.preview.math);
        assert_eq!(config.service.base_url, "http://127.0.0.1:5000");
        Ok(())
    }

    #[test]
    fn test_load_invalid_toml_returns_error() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"invalid toml [[[syntax").unwrap();

        let result = Config::load_from(file.path());
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_world_writable_config_rejected() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let file = NamedTempFile::new()?;
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o666))?;
        let err = Config::load_from(file.path()).unwrap_err();
        assert!(err.to_string().contains("world-writable"));
        Ok(())
    }

    #[test]
    fn test_config_path_returns_some() {
        let path = Config::config_path();
        assert!(path.is_some());
        if let Some(p) = path {
            assert!(p.to_string_lossy().contains("mdpress"));
            assert!(p.to_string_lossy().ends_with("mdpress.toml"));
        }
    }

    #[test]
    fn test_serialization_round_trip() -> Result<()> {
        let mut config = Config::default();
        config.service.base_url = "http://localhost:8080".to_string();

        let toml_str = toml::to_string(&config)?;
        let parsed: Config = toml::from_str(&toml_str)?;
        assert_eq!(parsed.service.base_url, "http://localhost:8080");
        Ok(())
    }
}
