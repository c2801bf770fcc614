//! Configuration loading from parktrack.toml.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub client: ClientConfig,
}

/// HTTP server settings.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Base path; the API is mounted at `<base_path>/api`.
    #[serde(default = "default_base_path")]
    pub base_path: String,

    /// Synthetic latency added to every authorized API request.
    #[serde(default = "default_delay_ms")]
    pub artificial_delay_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            base_path: default_base_path(),
            artificial_delay_ms: default_delay_ms(),
        }
    }
}

/// Which document store backs the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Json,
    Sqlite,
}

/// Document store settings.
#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Database file. Relative paths resolve against the config file's directory.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_db_path(),
        }
    }
}

/// Admin credential settings.
#[derive(Debug, Default, Deserialize)]
pub struct AuthConfig {
    /// Secret the root token is derived from.
    pub admin_secret: Option<String>,

    /// Accept the built-in default secret. Only for local experiments.
    #[serde(default)]
    pub allow_insecure_default: bool,
}

/// Client settings.
#[derive(Debug, Deserialize)]
pub struct ClientConfig {
    /// Where the server is reachable, including any base path.
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Client state file. Defaults to the user data directory.
    pub state_file: Option<PathBuf>,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            state_file: None,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_base_path() -> String {
    "/".to_string()
}

fn default_delay_ms() -> u64 {
    500
}

fn default_db_path() -> PathBuf {
    PathBuf::from("db.json")
}

fn default_server_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_poll_interval_ms() -> u64 {
    2000
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&content)?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            if config.store.path.is_relative() {
                config.store.path = dir.join(&config.store.path);
            }
        }
        Ok(config)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply overrides from environment variables, read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(port) = lookup("PORT") {
            let port: u16 = port.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "PORT",
                value: port.clone(),
            })?;
            let host = self
                .server
                .bind
                .rsplit_once(':')
                .map_or("0.0.0.0", |(host, _)| host);
            self.server.bind = format!("{host}:{port}");
        }
        if let Some(base) = lookup("BASE_URL") {
            self.server.base_path = base;
        }
        if let Some(path) = lookup("DB_FILE") {
            self.store.path = PathBuf::from(path);
        }
        if let Some(secret) = lookup("ADMIN_PASSWORD") {
            self.auth.admin_secret = Some(secret);
        }
        if let Some(delay) = lookup("ARTIFICIAL_DELAY_MS") {
            self.server.artificial_delay_ms = delay.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "ARTIFICIAL_DELAY_MS",
                value: delay.clone(),
            })?;
        }
        if let Some(url) = lookup("PARKTRACK_SERVER_URL") {
            self.client.server_url = url;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid value for {name}: {value:?}")]
    InvalidEnv { name: &'static str, value: String },
}
