//! Configuration for the relaybox gateway
//!
//! Configuration can be loaded from a TOML file and is then overlaid with
//! environment variables, so a deployment can run from the environment alone.
//! Variables may also come from `.env.production` (or `.env.development`
//! when `APP_ENV=development`), found in the working directory or next to
//! the executable. The process environment wins over the file.

use relaybox_credential_store::{Credential, PgStoreConfig};
use relaybox_webrtc::EngineConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_FILE_PRODUCTION: &str = ".env.production";
pub const ENV_FILE_DEVELOPMENT: &str = ".env.development";

/// Main configuration for the gateway
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP listener
    #[serde(default)]
    pub server: ServerConfig,

    /// TLS certificate and key for the main listener
    #[serde(default)]
    pub tls: TlsConfig,

    /// Plain HTTP listener redirecting to HTTPS
    #[serde(default)]
    pub redirect: RedirectConfig,

    /// Postgres credential store
    #[serde(default)]
    pub database: DatabaseConfig,

    /// WebRTC media engine
    #[serde(default)]
    pub webrtc: EngineConfig,

    /// Startup self-test
    #[serde(default)]
    pub self_test: SelfTestConfig,

    /// API surface toggles
    #[serde(default)]
    pub api: ApiConfig,

    /// Credentials served from memory when no database URL is configured
    #[serde(default)]
    pub streamers: Vec<Credential>,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address, either `host:port` or `:port`
    #[serde(default = "default_http_address")]
    pub http_address: String,
}

fn default_http_address() -> String {
    ":8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_address: default_http_address(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse_listen_address(&self.http_address)
    }
}

/// TLS configuration. Both paths must be set to serve HTTPS.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsConfig {
    /// PEM certificate chain
    #[serde(default)]
    pub cert: Option<String>,

    /// PEM private key
    #[serde(default)]
    pub key: Option<String>,
}

impl TlsConfig {
    /// Certificate and key paths when both are configured
    pub fn paths(&self) -> Option<(&str, &str)> {
        match (self.cert.as_deref(), self.key.as_deref()) {
            (Some(cert), Some(key)) if !cert.is_empty() && !key.is_empty() => Some((cert, key)),
            _ => None,
        }
    }
}

/// HTTP to HTTPS redirect listener
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedirectConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_redirect_port")]
    pub port: u16,
}

fn default_redirect_port() -> u16 {
    80
}

impl RedirectConfig {
    /// The redirect listens on every interface, whatever `HTTP_ADDRESS` binds
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_redirect_port(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// `postgres://` URL. When unset, `[[streamers]]` are used instead.
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Seconds a request waits for a pooled connection
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_seconds: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout() -> u64 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            acquire_timeout_seconds: default_acquire_timeout(),
        }
    }
}

impl DatabaseConfig {
    pub fn store_config(&self) -> Option<PgStoreConfig> {
        let url = self.url.as_deref().filter(|url| !url.is_empty())?;
        Some(PgStoreConfig {
            max_connections: self.max_connections,
            acquire_timeout: Duration::from_secs(self.acquire_timeout_seconds),
            ..PgStoreConfig::new(url)
        })
    }
}

/// Startup self-test configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfTestConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Seconds to wait for the probe's ICE connection
    #[serde(default = "default_self_test_timeout")]
    pub timeout_seconds: u64,

    /// Stream key the probe subscribes to
    #[serde(default = "default_self_test_stream_key")]
    pub stream_key: String,
}

fn default_self_test_timeout() -> u64 {
    10
}

fn default_self_test_stream_key() -> String {
    "relaybox-self-test".to_string()
}

impl Default for SelfTestConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_seconds: default_self_test_timeout(),
            stream_key: default_self_test_stream_key(),
        }
    }
}

impl SelfTestConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// API surface toggles
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Hide `/api/status` and `/api/status/{streamKey}`
    #[serde(default)]
    pub disable_status: bool,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.as_ref().display(), e)))?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(config)
    }

    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Load the TOML file when given, then overlay the environment and the
    /// env file
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Config::default(),
        };

        let app_env = std::env::var("APP_ENV").ok();
        let file_vars = match find_env_file(app_env.as_deref(), &env_file_dirs()) {
            Some(env_file) => {
                tracing::info!("Loading {}", env_file.display());
                read_env_file(&env_file)?
            }
            None => HashMap::new(),
        };

        config.apply_env(|name| {
            std::env::var(name)
                .ok()
                .or_else(|| file_vars.get(name).cloned())
        })?;
        Ok(config)
    }

    /// Overlay environment variables looked up through `lookup`
    ///
    /// Unset and empty variables leave the current value alone.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(addr) = var("HTTP_ADDRESS") {
            self.server.http_address = addr;
        }

        // TLS
        if let Some(cert) = var("SSL_CERT") {
            self.tls.cert = Some(cert);
        }
        if let Some(key) = var("SSL_KEY") {
            self.tls.key = Some(key);
        }

        // Redirect. Setting the port alone also turns the listener on.
        if let Some(port) = var("HTTPS_REDIRECT_PORT") {
            self.redirect.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                name: "HTTPS_REDIRECT_PORT",
                value: port.clone(),
            })?;
            self.redirect.enabled = true;
        }
        if let Some(flag) = var("ENABLE_HTTP_REDIRECT") {
            self.redirect.enabled = parse_flag(&flag);
        }

        // Database
        if let Some(url) = var("POSTGRES_URL") {
            self.database.url = Some(url);
        }

        // Self-test
        if let Some(flag) = var("NETWORK_TEST_ON_START") {
            self.self_test.enabled = parse_flag(&flag);
        }

        if let Some(flag) = var("DISABLE_STATUS") {
            self.api.disable_status = parse_flag(&flag);
        }

        // WebRTC
        if let Some(servers) = var("STUN_SERVERS") {
            self.webrtc.stun_servers = split_list(&servers);
        }
        if let Some(ips) = var("NAT_1_TO_1_IP") {
            self.webrtc.nat_1to1_ips = split_list(&ips);
        }

        Ok(())
    }

    /// Check cross-field constraints before the server starts
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.socket_addr()?;

        if self.tls.cert.is_some() != self.tls.key.is_some() {
            return Err(ConfigError::Tls(
                "SSL_CERT and SSL_KEY must be set together".to_string(),
            ));
        }

        if self.redirect.enabled && self.tls.paths().is_none() {
            return Err(ConfigError::Tls(
                "the HTTPS redirect listener requires TLS to be configured".to_string(),
            ));
        }

        self.webrtc
            .validate()
            .map_err(|e| ConfigError::WebRtc(e.to_string()))
    }
}

/// Env file name selected by `APP_ENV`
pub fn env_file_name(app_env: Option<&str>) -> &'static str {
    match app_env {
        Some("development") => ENV_FILE_DEVELOPMENT,
        _ => ENV_FILE_PRODUCTION,
    }
}

/// First directory in `dirs` holding the env file for `app_env`
pub fn find_env_file(app_env: Option<&str>, dirs: &[PathBuf]) -> Option<PathBuf> {
    let name = env_file_name(app_env);
    dirs.iter().map(|dir| dir.join(name)).find(|path| path.is_file())
}

/// Working directory, then the executable's directory
fn env_file_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![PathBuf::from(".")];
    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        dirs.push(exe_dir);
    }
    dirs
}

/// Parse a dotenv file without touching the process environment
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let entries = dotenvy::from_path_iter(path)
        .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;

    entries
        .map(|entry| entry.map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e))))
        .collect()
}

fn parse_listen_address(addr: &str) -> Result<SocketAddr, ConfigError> {
    let full = if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    };
    full.parse().map_err(|_| ConfigError::InvalidValue {
        name: "HTTP_ADDRESS",
        value: addr.to_string(),
    })
}

fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "" | "0" | "false" | "no" | "off"
    )
}

/// Split a `|` or `,` separated list, dropping blanks
fn split_list(value: &str) -> Vec<String> {
    value
        .split(|c| c == '|' || c == ',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },

    #[error("TLS configuration error: {0}")]
    Tls(String),

    #[error("WebRTC configuration error: {0}")]
    WebRtc(String),
}
