use crate::error::ProxyError;
use http::uri::{Authority, Scheme};
use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_FRONTEND_PREFIX: &str = "/api/";
pub const DEFAULT_BACKEND_URL: &str = "https://chat-stage.sensetime.com/api/test-cancel/v0.0.1/";
pub const DEFAULT_LISTEN_ADDR: &str = ":8080";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutputType {
    Stdout,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogTarget {
    #[serde(rename = "type")]
    pub output_type: LogOutputType,
    pub path: Option<PathBuf>,
    pub level: Option<LogLevel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: Option<LogLevel>,
    pub format: Option<LogFormat>,
    pub targets: Option<Vec<LogTarget>>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Some(LogLevel::Info),
            format: Some(LogFormat::Text),
            targets: Some(vec![LogTarget {
                output_type: LogOutputType::Stdout,
                path: None,
                level: None,
            }]),
        }
    }
}

/// Connection-level rules for calls to the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Accept any backend certificate. Only meant for non-production backends.
    #[serde(default = "default_true")]
    pub tls_skip_verify: bool,
    #[serde(default = "default_response_header_timeout")]
    pub response_header_timeout_secs: u64,
    #[serde(default = "default_pool_idle_timeout")]
    pub pool_idle_timeout_secs: u64,
    #[serde(default = "default_pool_max_idle")]
    pub pool_max_idle: usize,
    #[serde(default = "default_pool_max_idle_per_host")]
    pub pool_max_idle_per_host: usize,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_tcp_keepalive")]
    pub tcp_keepalive_secs: u64,
    /// Offer h2 during TLS negotiation, falling back to HTTP/1.1.
    #[serde(default = "default_true")]
    pub http2: bool,
    /// Deadline for the whole exchange, body streaming included.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

fn default_true() -> bool {
    true
}

fn default_response_header_timeout() -> u64 {
    60
}

fn default_pool_idle_timeout() -> u64 {
    120
}

fn default_pool_max_idle() -> usize {
    100
}

fn default_pool_max_idle_per_host() -> usize {
    10
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_tcp_keepalive() -> u64 {
    30
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls_skip_verify: true,
            response_header_timeout_secs: default_response_header_timeout(),
            pool_idle_timeout_secs: default_pool_idle_timeout(),
            pool_max_idle: default_pool_max_idle(),
            pool_max_idle_per_host: default_pool_max_idle_per_host(),
            connect_timeout_secs: default_connect_timeout(),
            tcp_keepalive_secs: default_tcp_keepalive(),
            http2: true,
            request_timeout_secs: None,
        }
    }
}

impl TransportConfig {
    pub fn response_header_timeout(&self) -> Duration {
        Duration::from_secs(self.response_header_timeout_secs)
    }

    pub fn pool_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_idle_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn tcp_keepalive(&self) -> Duration {
        Duration::from_secs(self.tcp_keepalive_secs)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub frontend_prefix: String,
    pub backend_url: String,
    pub listen_addr: String,
    /// Answer 404 instead of forwarding paths outside the frontend prefix
    #[serde(default)]
    pub reject_unmatched: bool,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default)]
    pub certificate: Option<String>,
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            frontend_prefix: DEFAULT_FRONTEND_PREFIX.to_string(),
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            reject_unmatched: false,
            transport: TransportConfig::default(),
            private_key: None,
            certificate: None,
            logging: None,
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self, ProxyError> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| ProxyError::Config(format!("Invalid configuration file {}: {}", path, e)))
    }

    pub fn to_file(&self, path: &str) -> Result<(), ProxyError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ProxyError::Config(format!("Failed to serialize configuration: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate and normalize into the immutable value shared by every request.
    pub fn resolve(&self) -> Result<ResolvedConfig, ProxyError> {
        if self.frontend_prefix.is_empty() {
            return Err(ProxyError::Config("Frontend prefix must not be empty".to_string()));
        }
        if self.backend_url.is_empty() {
            return Err(ProxyError::Config("Backend URL must not be empty".to_string()));
        }
        if self.listen_addr.is_empty() {
            return Err(ProxyError::Config("Listen address must not be empty".to_string()));
        }

        let frontend_prefix = normalize_prefix(&self.frontend_prefix);
        let backend_url = normalize_backend_url(&self.backend_url);

        let backend = Url::parse(&backend_url)?;
        if backend.scheme() != "http" && backend.scheme() != "https" {
            return Err(ProxyError::Config(format!(
                "Unsupported backend scheme '{}', expected http or https",
                backend.scheme()
            )));
        }
        if backend.host_str().is_none() {
            return Err(ProxyError::Config(format!("Backend URL {} has no host", backend)));
        }

        let backend_uri: hyper::Uri = backend
            .as_str()
            .parse()
            .map_err(|e: http::uri::InvalidUri| ProxyError::Uri(e.to_string()))?;
        let backend_scheme = backend_uri
            .scheme()
            .cloned()
            .ok_or_else(|| ProxyError::Config("Backend URL has no scheme".to_string()))?;
        let backend_authority = backend_uri
            .authority()
            .cloned()
            .ok_or_else(|| ProxyError::Config("Backend URL has no authority".to_string()))?;

        let listen_addr = resolve_listen_addr(&self.listen_addr)?;

        let transport = self.transport.clone();
        if transport.response_header_timeout_secs == 0 {
            return Err(ProxyError::Config("Response header timeout must be greater than zero".to_string()));
        }
        if transport.pool_max_idle_per_host > transport.pool_max_idle {
            return Err(ProxyError::Config(format!(
                "pool_max_idle_per_host ({}) exceeds pool_max_idle ({})",
                transport.pool_max_idle_per_host, transport.pool_max_idle
            )));
        }

        if self.private_key.is_some() != self.certificate.is_some() {
            return Err(ProxyError::Config(
                "HTTPS listener requires both private_key and certificate".to_string(),
            ));
        }

        Ok(ResolvedConfig {
            backend_path: backend.path().to_string(),
            frontend_prefix,
            backend_url: backend,
            backend_scheme,
            backend_authority,
            listen_addr,
            reject_unmatched: self.reject_unmatched,
            transport,
            private_key: self.private_key.clone(),
            certificate: self.certificate.clone(),
        })
    }
}

/// Validated configuration. Built once at startup and only ever read afterwards.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub frontend_prefix: String,
    pub backend_url: Url,
    pub backend_scheme: Scheme,
    pub backend_authority: Authority,
    /// Path component of the backend URL, always ending with "/".
    pub backend_path: String,
    pub listen_addr: SocketAddr,
    pub reject_unmatched: bool,
    pub transport: TransportConfig,
    pub private_key: Option<String>,
    pub certificate: Option<String>,
}

impl ResolvedConfig {
    pub fn tls_paths(&self) -> Option<(&str, &str)> {
        match (&self.private_key, &self.certificate) {
            (Some(key), Some(cert)) => Some((key.as_str(), cert.as_str())),
            _ => None,
        }
    }
}

/// Ensure the prefix starts and ends with "/".
pub fn normalize_prefix(prefix: &str) -> String {
    let mut normalized = String::with_capacity(prefix.len() + 2);
    if !prefix.starts_with('/') {
        normalized.push('/');
    }
    normalized.push_str(prefix);
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    normalized
}

pub fn normalize_backend_url(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{}/", url)
    }
}

/// Resolve a listen address. A bare ":port" binds every interface.
pub fn resolve_listen_addr(addr: &str) -> Result<SocketAddr, ProxyError> {
    let candidate = if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    };

    candidate
        .to_socket_addrs()
        .map_err(|e| ProxyError::Config(format!("Invalid listen address '{}': {}", addr, e)))?
        .next()
        .ok_or_else(|| ProxyError::Config(format!("Listen address '{}' resolved to nothing", addr)))
}
