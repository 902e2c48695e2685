//! Configuration management for quadmap

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::geometry::CornerSet;
use crate::settings::TransformSettings;

/// Nominal size of the source media, in pixels
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

impl MediaConfig {
    /// Source corners: the full media rectangle
    pub fn source_corners(&self) -> CornerSet {
        CornerSet::rect(self.width as f64, self.height as f64)
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origins allowed to call the API from a browser
    #[serde(default = "default_origins")]
    pub allowed_origins: Vec<String>,
}

fn default_origins() -> Vec<String> {
    vec![
        "http://localhost".to_string(),
        "https://localhost".to_string(),
        "http://localhost:3000".to_string(),
    ]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            allowed_origins: default_origins(),
        }
    }
}

/// Default grid used when a mesh is requested without explicit size
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MeshConfig {
    pub cols: u32,
    pub rows: u32,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self { cols: 16, rows: 9 }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub media: MediaConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub mesh: MeshConfig,

    /// Settings the editor starts from (and resets to)
    #[serde(default)]
    pub defaults: TransformSettings,
}

impl Config {
    /// Load configuration from a file, or create default if it doesn't exist
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {:?}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config from {:?}", path))?;
            config.validate()?;
            tracing::info!("Loaded configuration from {:?}", path);
            Ok(config)
        } else {
            let config = Config::default();
            config.save(path)?;
            tracing::info!("Created default configuration at {:?}", path);
            Ok(config)
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory {:?}", parent))?;
            }
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {:?}", path))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Reject values that would make every solve fail
    pub fn validate(&self) -> Result<()> {
        if self.media.width == 0 || self.media.height == 0 {
            anyhow::bail!(
                "media size must be non-zero, got {}x{}",
                self.media.width,
                self.media.height
            );
        }
        if self.mesh.cols == 0 || self.mesh.rows == 0 {
            anyhow::bail!("mesh grid must have at least one column and one row");
        }
        self.defaults
            .validate()
            .context("Invalid [defaults] settings")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point2D;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir()
            .join(format!("quadmap-test-{}", std::process::id()))
            .join(name)
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.media.source_corners().bottom_right, Point2D::new(1920.0, 1080.0));
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [media]
            width = 640
            height = 480

            [server]
            host = "0.0.0.0"
            port = 9000
            "#,
        )
        .unwrap();

        assert_eq!(config.media.width, 640);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.allowed_origins.len(), 3);
        assert_eq!(config.mesh, MeshConfig::default());
        assert_eq!(config.defaults, TransformSettings::default());
    }

    #[test]
    fn test_zero_media_rejected() {
        let mut config = Config::default();
        config.media.height = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_then_load() {
        let path = temp_path("roundtrip.toml");
        let mut config = Config::default();
        config.media.width = 800;
        config.defaults.rotation = 12.5;

        config.save(&path).unwrap();
        let loaded = Config::load_or_create(&path).unwrap();

        assert_eq!(loaded.media.width, 800);
        assert_eq!(loaded.defaults.rotation, 12.5);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_load_creates_missing_file() {
        let path = temp_path("created.toml");
        let _ = std::fs::remove_file(&path);

        let config = Config::load_or_create(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.media, MediaConfig::default());
        let _ = std::fs::remove_file(&path);
    }
}
