//! Configuration management for rsh

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Default agent dial targets: one plain and one mutual-TLS endpoint on
/// loopback.
pub const DEFAULT_SERVER_ADDRESSES: &str = "127.0.0.1:22222,https://127.0.0.1:42222";

/// Shell used when neither the CLI, the environment, nor the invocation
/// provides one.
pub const LAST_RESORT_SHELL: &str = "/bin/sh";

/// Configuration for the agent daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Comma-separated server addresses to dial. Each entry is one of
    /// `host:port`, `tcp://`, `http://` (plain), `tls://`, `https://`
    /// (mutual TLS), or `unix://path`.
    pub servers: String,

    /// Default shell spawned when a session starts with an empty command
    pub shell: String,

    /// Default arguments for the default shell
    pub shell_args: Vec<String>,

    /// Optional address to serve sessions on directly (forward topology)
    pub listen: Option<String>,

    /// TLS material
    pub tls: TlsPaths,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            servers: DEFAULT_SERVER_ADDRESSES.to_string(),
            shell: std::env::var("SHELL").unwrap_or_else(|_| LAST_RESORT_SHELL.to_string()),
            shell_args: vec![],
            listen: None,
            tls: TlsPaths::default(),
        }
    }
}

/// Configuration for the server daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address for tunnels
    pub address: String,

    /// Listen port for tunnels
    pub port: u16,

    /// Listen address for the HTTP surface
    pub http: String,

    /// TLS material
    pub tls: TlsPaths,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 22222,
            http: "127.0.0.1:8080".to_string(),
            tls: TlsPaths::default(),
        }
    }
}

impl ServerConfig {
    /// The tunnel listen address as `host:port`.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// Paths to PEM-encoded TLS material. All three must be set for TLS to be
/// enabled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsPaths {
    /// CA bundle used to verify the peer
    pub ca: Option<PathBuf>,
    /// Our certificate chain
    pub cert: Option<PathBuf>,
    /// Our private key
    pub key: Option<PathBuf>,
}

impl TlsPaths {
    /// Whether a complete set of TLS material is configured.
    pub fn is_configured(&self) -> bool {
        self.ca.is_some() && self.cert.is_some() && self.key.is_some()
    }
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to a file
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Invalid(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, content)
        .map_err(|e| ConfigError::Invalid(format!("Failed to write config: {}", e)))?;

    Ok(())
}
