//! Binary configuration
//!
//! Layers, lowest priority first: built-in defaults, a TOML file,
//! `CAPGRAPH_*` environment variables (a `.env` file is loaded into the
//! environment by the binary), command-line flags.
//!
//! ```toml
//! [server]
//! name = "my-graph"
//! dependencies = ["numpy"]
//!
//! [transport]
//! kind = "http"
//! bind = "127.0.0.1:4445"
//!
//! [log]
//! filter = "capgraph=debug"
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::server::ServerInstance;

pub const DEFAULT_BIND: &str = "127.0.0.1:4445";
pub const DEFAULT_LOG_FILTER: &str = "capgraph=info,rmcp=warn";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: '{value}' ({reason})")]
    InvalidEnv { key: String, value: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Stdio,
    Http,
}

impl std::str::FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stdio" => Ok(TransportKind::Stdio),
            "http" => Ok(TransportKind::Http),
            other => Err(format!("unknown transport '{}', expected stdio or http", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub name: String,
    pub dependencies: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: ServerInstance::DEFAULT_NAME.to_string(),
            dependencies: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub kind: TransportKind,
    pub bind: SocketAddr,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::default(),
            bind: default_bind(),
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 4445))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub transport: TransportConfig,
    pub log: LogConfig,
}

impl Config {
    /// `$XDG_CONFIG_HOME/capgraph/config.toml` (or the platform equivalent)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("capgraph").join("config.toml"))
    }

    /// Load the file layer
    ///
    /// An explicitly given path must exist. Without one the default path is
    /// tried and defaults are used when it is absent.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path),
                None => {
                    tracing::debug!("No config file found; using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Overlay `CAPGRAPH_*` variables from the process environment
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay `CAPGRAPH_*` variables from `lookup`
    ///
    /// `CAPGRAPH_SERVER_NAME`, `CAPGRAPH_DEPENDENCIES` (comma separated),
    /// `CAPGRAPH_TRANSPORT`, `CAPGRAPH_BIND`, `CAPGRAPH_LOG`.
    pub fn apply_env_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(name) = get("CAPGRAPH_SERVER_NAME") {
            self.server.name = name;
        }
        if let Some(deps) = get("CAPGRAPH_DEPENDENCIES") {
            self.server.dependencies = deps
                .split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(kind) = get("CAPGRAPH_TRANSPORT") {
            self.transport.kind = kind.parse().map_err(|reason| ConfigError::InvalidEnv {
                key: "CAPGRAPH_TRANSPORT".to_string(),
                value: kind.clone(),
                reason,
            })?;
        }
        if let Some(bind) = get("CAPGRAPH_BIND") {
            self.transport.bind = bind.parse().map_err(|e: std::net::AddrParseError| ConfigError::InvalidEnv {
                key: "CAPGRAPH_BIND".to_string(),
                value: bind.clone(),
                reason: e.to_string(),
            })?;
        }
        if let Some(filter) = get("CAPGRAPH_LOG") {
            self.log.filter = filter;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.name, "capgraph-mcp-server");
        assert_eq!(config.transport.kind, TransportKind::Stdio);
        assert_eq!(config.transport.bind.to_string(), DEFAULT_BIND);
        assert_eq!(config.log.filter, DEFAULT_LOG_FILTER);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
name = "weather-graph"
dependencies = ["requests"]

[transport]
kind = "http"
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.server.name, "weather-graph");
        assert_eq!(config.server.dependencies, ["requests"]);
        assert_eq!(config.transport.kind, TransportKind::Http);
        assert_eq!(config.transport.bind.to_string(), DEFAULT_BIND);
        assert_eq!(config.log.filter, DEFAULT_LOG_FILTER);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[transport]\nkind = \"carrier-pigeon\"").unwrap();
        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_env_overrides_file_values() {
        let config = Config::default()
            .apply_env_from(env(&[
                ("CAPGRAPH_SERVER_NAME", "from-env"),
                ("CAPGRAPH_DEPENDENCIES", "numpy, pandas,,"),
                ("CAPGRAPH_TRANSPORT", "HTTP"),
                ("CAPGRAPH_BIND", "0.0.0.0:9000"),
                ("CAPGRAPH_LOG", "capgraph=debug"),
            ]))
            .unwrap();

        assert_eq!(config.server.name, "from-env");
        assert_eq!(config.server.dependencies, ["numpy", "pandas"]);
        assert_eq!(config.transport.kind, TransportKind::Http);
        assert_eq!(config.transport.bind.port(), 9000);
        assert_eq!(config.log.filter, "capgraph=debug");
    }

    #[test]
    fn test_empty_env_values_are_ignored() {
        let config = Config::default()
            .apply_env_from(env(&[("CAPGRAPH_SERVER_NAME", "  ")]))
            .unwrap();
        assert_eq!(config.server.name, ServerInstance::DEFAULT_NAME);
    }

    #[test]
    fn test_invalid_env_value_names_the_variable() {
        let err = Config::default()
            .apply_env_from(env(&[("CAPGRAPH_BIND", "not-an-address")]))
            .unwrap_err();
        assert!(err.to_string().starts_with("invalid value for CAPGRAPH_BIND"));
    }
}
