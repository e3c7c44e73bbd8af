//! Client configuration.
//!
//! Layered lowest to highest: built-in defaults, a TOML file, then explicit
//! overrides from the command line or environment.
//!
//! ```toml
//! host = "localhost"
//! port = 52698
//! ```

use crate::error::{Result, RmateError};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 52698;

/// Where the editor is listening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// On-disk form; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    host: Option<String>,
    port: Option<u16>,
}

impl Config {
    /// `<config_dir>/rmate/config.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("rmate").join("config.toml"))
    }

    /// Load configuration.
    ///
    /// An explicit `path` must exist and parse. Without one the default
    /// location is used when present and skipped otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();
        match path {
            Some(path) => config.merge_file(path)?,
            None => {
                if let Some(path) = Self::default_path().filter(|p| p.exists()) {
                    config.merge_file(&path)?;
                }
            }
        }
        Ok(config)
    }

    /// Apply overrides from the command line or environment.
    pub fn with_overrides(mut self, host: Option<String>, port: Option<u16>) -> Self {
        if let Some(host) = host {
            self.host = host;
        }
        if let Some(port) = port {
            self.port = port;
        }
        self
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn merge_file(&mut self, path: &Path) -> Result<()> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| RmateError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        self.merge_str(&text)
            .map_err(|e| RmateError::Config(format!("{}: {}", path.display(), e)))
    }

    fn merge_str(&mut self, text: &str) -> std::result::Result<(), toml::de::Error> {
        let file: ConfigFile = toml::from_str(text)?;
        if let Some(host) = file.host {
            self.host = host;
        }
        if let Some(port) = file.port {
            self.port = port;
        }
        Ok(())
    }
}
