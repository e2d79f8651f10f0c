use crate::getset::ReshapeOptions;
use crate::pivot::FanOutPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {} as reshape config: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Settings loaded from `reshape.json`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReshapeConfig {
    pub fan_out: FanOutPolicy,
    pub pretty: bool,
    pub watch: WatchConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchConfig {
    pub debounce_ms: u64,
    pub poll_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 120,
            poll_ms: 1500,
        }
    }
}

impl ReshapeConfig {
    pub const FILE_NAME: &'static str = "reshape.json";

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// An explicit path must exist; otherwise `reshape.json` in `dir` is used
    /// when present, and defaults when not.
    pub fn discover(explicit: Option<&Path>, dir: &Path) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let candidate = dir.join(Self::FILE_NAME);
        if candidate.is_file() {
            return Self::load(&candidate);
        }
        Ok(Self::default())
    }

    pub fn options(&self) -> ReshapeOptions {
        ReshapeOptions {
            fan_out: self.fan_out,
            pretty: self.pretty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ReshapeConfig::discover(None, dir.path()).unwrap();
        assert_eq!(config, ReshapeConfig::default());
        assert_eq!(config.watch.debounce_ms, 120);
    }

    #[test]
    fn discovered_file_overrides_some_fields() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(ReshapeConfig::FILE_NAME),
            r#"{"fan_out":"strict","watch":{"poll_ms":500}}"#,
        )
        .unwrap();
        let config = ReshapeConfig::discover(None, dir.path()).unwrap();
        assert_eq!(config.fan_out, FanOutPolicy::Strict);
        assert!(!config.pretty);
        assert_eq!(config.watch, WatchConfig { debounce_ms: 120, poll_ms: 500 });
        assert_eq!(config.options().fan_out, FanOutPolicy::Strict);
    }

    #[test]
    fn unknown_fields_and_missing_explicit_file_fail() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.json");
        fs::write(&path, r#"{"fanout":"pad"}"#).unwrap();
        assert!(matches!(
            ReshapeConfig::discover(Some(&path), dir.path()),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            ReshapeConfig::load(&dir.path().join("absent.json")),
            Err(ConfigError::Read { .. })
        ));
    }
}
