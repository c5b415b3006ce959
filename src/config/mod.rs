//! Configuration management.
//!
//! Configuration can come from:
//! - Environment variables (R8R_MINTLIFY_*)
//! - Config file (~/.config/r8r/mintlify.toml)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Default Mintlify API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.mintlify.com/v1";

/// r8r-mintlify configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Mintlify API settings
    #[serde(default)]
    pub mintlify: MintlifyConfig,
}

/// Mintlify API configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintlifyConfig {
    /// API base URL, without trailing slash
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Default request timeout (seconds)
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Default connect timeout (seconds)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
}

impl Default for MintlifyConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_timeout(),
            connect_timeout_seconds: default_connect_timeout(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

// Agent jobs can take a while to be accepted.
fn default_timeout() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    10
}

impl MintlifyConfig {
    /// Check that the settings are usable.
    pub fn validate(&self) -> Result<()> {
        let url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| Error::Config(format!("Invalid base_url '{}': {}", self.base_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "Unsupported base_url scheme '{}'. Only http and https are allowed.",
                url.scheme()
            )));
        }
        if self.timeout_seconds == 0 {
            return Err(Error::Config("timeout_seconds must be positive".to_string()));
        }
        if self.connect_timeout_seconds == 0 {
            return Err(Error::Config(
                "connect_timeout_seconds must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Base URL with any trailing slash removed.
    pub fn trimmed_base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

impl Config {
    /// Load configuration from default locations.
    pub fn load() -> Self {
        let mut config = Self::default();

        let path = Self::config_dir().join("mintlify.toml");
        if let Ok(partial) = Self::load_partial_from_path(&path) {
            config.apply_partial(partial);
        }

        config.apply_env_overrides();
        config
    }

    /// Get the data directory.
    pub fn data_dir() -> PathBuf {
        dirs::data_dir()
            .map(|d| d.join("r8r-mintlify"))
            .unwrap_or_else(|| PathBuf::from(".r8r-mintlify"))
    }

    /// Get the config directory.
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("r8r"))
            .unwrap_or_else(|| PathBuf::from(".r8r"))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("R8R_MINTLIFY_BASE_URL") {
            self.mintlify.base_url = url;
        }
        if let Ok(timeout) = std::env::var("R8R_MINTLIFY_TIMEOUT_SECONDS") {
            if let Ok(parsed) = timeout.parse::<u64>() {
                self.mintlify.timeout_seconds = parsed;
            }
        }
        if let Ok(timeout) = std::env::var("R8R_MINTLIFY_CONNECT_TIMEOUT_SECONDS") {
            if let Ok(parsed) = timeout.parse::<u64>() {
                self.mintlify.connect_timeout_seconds = parsed;
            }
        }
    }

    fn load_partial_from_path(path: &Path) -> std::result::Result<PartialConfig, ()> {
        let content = std::fs::read_to_string(path).map_err(|_| ())?;
        toml::from_str(&content).map_err(|_| ())
    }

    fn apply_partial(&mut self, partial: PartialConfig) {
        if let Some(mintlify) = partial.mintlify {
            self.mintlify = mintlify;
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    mintlify: Option<MintlifyConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MintlifyConfig::default();
        assert_eq!(config.base_url, "https://api.mintlify.com/v1");
        assert_eq!(config.timeout_seconds, 60);
        assert_eq!(config.connect_timeout_seconds, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_overrides_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mintlify.toml");
        std::fs::write(
            &path,
            "[mintlify]\nbase_url = \"https://staging.example.com/v1/\"\ntimeout_seconds = 5\n",
        )
        .unwrap();

        let mut config = Config::default();
        config.apply_partial(Config::load_partial_from_path(&path).unwrap());

        assert_eq!(config.mintlify.base_url, "https://staging.example.com/v1/");
        assert_eq!(config.mintlify.trimmed_base_url(), "https://staging.example.com/v1");
        assert_eq!(config.mintlify.timeout_seconds, 5);
        // Unset keys in the section fall back to defaults
        assert_eq!(config.mintlify.connect_timeout_seconds, 10);
    }

    #[test]
    fn test_missing_file_is_ignored() {
        let result = Config::load_partial_from_path(Path::new("/nonexistent/mintlify.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("R8R_MINTLIFY_CONNECT_TIMEOUT_SECONDS", "3");
        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.mintlify.connect_timeout_seconds, 3);
        std::env::remove_var("R8R_MINTLIFY_CONNECT_TIMEOUT_SECONDS");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = MintlifyConfig {
            base_url: "ftp://api.mintlify.com".to_string(),
            ..MintlifyConfig::default()
        };
        assert!(config.validate().is_err());

        let config = MintlifyConfig {
            timeout_seconds: 0,
            ..MintlifyConfig::default()
        };
        assert!(config.validate().is_err());

        let config = MintlifyConfig {
            base_url: "not a url".to_string(),
            ..MintlifyConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
