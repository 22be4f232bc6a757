//! Configuration for the proxy and the optional target process.
//!
//! Configuration lives in `chopin.config.json` next to the project. All
//! fields are optional except that spawn mode (starting the target as a child
//! process) needs `command`. Positional CLI arguments override the ports.
//!
//! Validation failures are fatal at startup; the proxy never serves with a
//! config it could not validate.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default file name looked up in the working directory.
pub const CONFIG_FILE: &str = "chopin.config.json";

/// Default proxy listen port.
pub const DEFAULT_PROXY_PORT: u16 = 4000;

/// Default target origin port.
pub const DEFAULT_TARGET_PORT: u16 = 3000;

const DEFAULT_COMMAND: &str = "npm run dev";

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON for the expected shape.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// Path that failed.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A field value failed validation.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// Scaffolding (`init`) could not write its files.
    #[error("failed to write {path}: {source}")]
    Write {
        /// Path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Validated configuration consumed by the proxy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChopinConfig {
    /// Command line that starts the target development server. Required for
    /// spawn mode; the proxy runs in attach-only mode without it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Port the proxy listens on.
    #[serde(rename = "proxyPort", default = "default_proxy_port")]
    pub proxy_port: u16,

    /// Port of the target origin at `http://localhost`.
    #[serde(rename = "targetPort", default = "default_target_port")]
    pub target_port: u16,

    /// Environment variables passed to the spawned target process.
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Config schema version, `MAJOR.MINOR.PATCH`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

const fn default_proxy_port() -> u16 {
    DEFAULT_PROXY_PORT
}

const fn default_target_port() -> u16 {
    DEFAULT_TARGET_PORT
}

impl Default for ChopinConfig {
    fn default() -> Self {
        Self {
            command: None,
            proxy_port: DEFAULT_PROXY_PORT,
            target_port: DEFAULT_TARGET_PORT,
            env: HashMap::new(),
            version: None,
        }
    }
}

impl ChopinConfig {
    /// Loads and validates configuration from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or parsed, or a
    /// field fails validation.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `chopin.config.json` from `dir` if present, defaults otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a present file fails to load or validate.
    pub fn load_or_default(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join(CONFIG_FILE);
        if path.exists() {
            Self::from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Applies positional port overrides from the command line.
    pub fn apply_overrides(&mut self, proxy_port: Option<u16>, target_port: Option<u16>) {
        if let Some(port) = proxy_port {
            self.proxy_port = port;
        }
        if let Some(port) = target_port {
            self.target_port = port;
        }
    }

    /// Checks field-level constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.proxy_port == 0 {
            return Err(ConfigError::Invalid("proxyPort must be 1..65535".into()));
        }
        if self.target_port == 0 {
            return Err(ConfigError::Invalid("targetPort must be 1..65535".into()));
        }
        if self.proxy_port == self.target_port {
            return Err(ConfigError::Invalid(
                "proxyPort and targetPort must differ".into(),
            ));
        }
        if let Some(command) = &self.command {
            if command.trim().is_empty() {
                return Err(ConfigError::Invalid("command must not be empty".into()));
            }
        }
        if let Some(version) = &self.version {
            if !is_semver(version) {
                return Err(ConfigError::Invalid(format!(
                    "version must be MAJOR.MINOR.PATCH, got {version:?}"
                )));
            }
        }
        Ok(())
    }
}

/// Accepts exactly `MAJOR.MINOR.PATCH` with numeric components.
fn is_semver(s: &str) -> bool {
    let mut parts = 0;
    for part in s.split('.') {
        parts += 1;
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
    }
    parts == 3
}

/// Scaffolds a project: writes a default `chopin.config.json` (unless one
/// exists) and makes sure `.gitignore` covers the `.chopin` scratch dir.
///
/// Returns the path of the config file.
///
/// # Errors
///
/// Returns [`ConfigError`] when any of the files cannot be written.
pub fn init_project(dir: &Path) -> Result<PathBuf, ConfigError> {
    let config_path = dir.join(CONFIG_FILE);
    if !config_path.exists() {
        let config = ChopinConfig {
            command: Some(DEFAULT_COMMAND.to_string()),
            ..ChopinConfig::default()
        };
        // to_string_pretty on this struct cannot fail
        let body = serde_json::to_string_pretty(&config).unwrap_or_default();
        fs::write(&config_path, body + "\n").map_err(|source| ConfigError::Write {
            path: config_path.clone(),
            source,
        })?;
    }

    let gitignore_path = dir.join(".gitignore");
    let mut gitignore = if gitignore_path.exists() {
        fs::read_to_string(&gitignore_path).map_err(|source| ConfigError::Read {
            path: gitignore_path.clone(),
            source,
        })?
    } else {
        String::new()
    };
    if !gitignore.lines().any(|line| line.trim() == ".chopin") {
        if !gitignore.is_empty() && !gitignore.ends_with('\n') {
            gitignore.push('\n');
        }
        gitignore.push_str(".chopin\n");
        fs::write(&gitignore_path, gitignore).map_err(|source| ConfigError::Write {
            path: gitignore_path.clone(),
            source,
        })?;
    }

    Ok(config_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = ChopinConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config.proxy_port, 4000);
        assert_eq!(config.target_port, 3000);
        assert!(config.command.is_none());
    }

    #[test]
    fn loads_and_validates_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"command":"npm run dev","proxyPort":4100,"targetPort":3100,"env":{"A":"1"},"version":"0.2.0"}"#,
        )
        .unwrap();

        let config = ChopinConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config.command.as_deref(), Some("npm run dev"));
        assert_eq!(config.proxy_port, 4100);
        assert_eq!(config.target_port, 3100);
        assert_eq!(config.env.get("A").map(String::as_str), Some("1"));
    }

    #[test]
    fn rejects_zero_port() {
        let config = ChopinConfig {
            proxy_port: 0,
            ..ChopinConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_equal_ports() {
        let config = ChopinConfig {
            proxy_port: 3000,
            target_port: 3000,
            ..ChopinConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_version() {
        for bad in ["1.2", "1.2.3.4", "a.b.c", "1..3", ""] {
            let config = ChopinConfig {
                version: Some(bad.to_string()),
                ..ChopinConfig::default()
            };
            assert!(config.validate().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn accepts_semver_version() {
        let config = ChopinConfig {
            version: Some("1.12.0".to_string()),
            ..ChopinConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn cli_overrides_win() {
        let mut config = ChopinConfig::default();
        config.apply_overrides(Some(5000), None);
        assert_eq!(config.proxy_port, 5000);
        assert_eq!(config.target_port, 3000);
    }

    #[test]
    fn init_scaffolds_config_and_gitignore() {
        let dir = tempfile::tempdir().unwrap();
        let path = init_project(dir.path()).unwrap();
        assert!(path.exists());

        let config = ChopinConfig::from_file(&path).unwrap();
        assert_eq!(config.command.as_deref(), Some("npm run dev"));

        let gitignore = fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert!(gitignore.contains(".chopin"));

        // Running init again must not duplicate the ignore line.
        init_project(dir.path()).unwrap();
        let gitignore = fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert_eq!(gitignore.matches(".chopin").count(), 1);
    }
}
