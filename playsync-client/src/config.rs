//! Persistent client settings

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_CONFIG_FILE: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Config file is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Connection details remembered between runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub server_key: String,
    #[serde(default)]
    pub admin_key: String,
}

/// Values given on the command line; set fields replace the stored ones
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub username: Option<String>,
    pub password: Option<String>,
    pub address: Option<String>,
    pub server_key: Option<String>,
    pub admin_key: Option<String>,
}

impl ClientConfig {
    /// Load from `path`. A missing file yields the empty config.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) if contents.trim().is_empty() => Ok(Self::default()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, starting empty");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `overrides`, returning whether anything changed
    pub fn apply(&mut self, overrides: Overrides) -> bool {
        let before = self.clone();
        let fields = [
            (&mut self.username, overrides.username),
            (&mut self.password, overrides.password),
            (&mut self.address, overrides.address),
            (&mut self.server_key, overrides.server_key),
            (&mut self.admin_key, overrides.admin_key),
        ];
        for (field, value) in fields {
            if let Some(value) = value {
                *field = value;
            }
        }
        *self != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("playsync-client-{}-{}.json", name, std::process::id()))
    }

    #[test]
    fn test_missing_file_is_empty() {
        let path = scratch_path("missing");
        let _ = std::fs::remove_file(&path);
        assert_eq!(ClientConfig::load(&path).unwrap(), ClientConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let path = scratch_path("save");
        let config = ClientConfig {
            username: "alice".into(),
            password: "pw".into(),
            address: "localhost:8096".into(),
            ..Default::default()
        };

        config.save(&path).unwrap();
        let loaded = ClientConfig::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: ClientConfig = serde_json::from_str(r#"{"username":"bob"}"#).unwrap();
        assert_eq!(config.username, "bob");
        assert!(config.address.is_empty());
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = ClientConfig {
            username: "alice".into(),
            address: "old:1".into(),
            ..Default::default()
        };

        assert!(!config.apply(Overrides::default()));
        assert!(!config.apply(Overrides {
            username: Some("alice".into()),
            ..Default::default()
        }));

        let changed = config.apply(Overrides {
            address: Some("new:2".into()),
            admin_key: Some("admin".into()),
            ..Default::default()
        });
        assert!(changed);
        assert_eq!(config.username, "alice");
        assert_eq!(config.address, "new:2");
        assert_eq!(config.admin_key, "admin");
    }
}
