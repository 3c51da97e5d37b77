//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from a TOML file. Every
//! section has defaults, so an empty file yields a runnable (if closed)
//! configuration.

use serde::{Deserialize, Serialize};

/// Root configuration for the filtering proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// The single origin every allowed request is forwarded to.
    pub origin: OriginConfig,

    /// Source address and URL allow-lists.
    pub access: AccessConfig,

    /// Log output settings.
    pub logging: LoggingConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Origin server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OriginConfig {
    /// Origin base URL (e.g., "http://apex.local").
    pub url: String,

    /// Upper bound for connecting to and receiving a response from the origin.
    pub timeout_secs: u64,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            url: "http://apex.local".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Allow-list configuration.
///
/// With no ranges and no presets selected, only loopback callers are admitted.
/// With no URLs and no endpoint presets, every request is refused.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Explicit CIDR ranges allowed to call the proxy.
    pub allow_ips: Vec<String>,

    /// Add IPv4 and IPv6 loopback ranges.
    pub allow_loopback: bool,

    /// Add RFC 1918 and IPv6 unique/site-local ranges.
    pub allow_private: bool,

    /// Full URLs whose path component may be requested.
    pub allow_urls: Vec<String>,

    /// Add the controller's XML status endpoints.
    pub allow_xml_endpoints: bool,

    /// Add the controller's JSON status endpoints.
    pub allow_json_endpoints: bool,

    /// Address lookup cache size; zero or negative disables caching.
    pub cache_capacity: i64,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            allow_ips: Vec::new(),
            allow_loopback: false,
            allow_private: false,
            allow_urls: Vec::new(),
            allow_xml_endpoints: false,
            allow_json_endpoints: false,
            cache_capacity: 1000,
        }
    }
}

/// Log output configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (error, warning, info, debug, trace).
    pub level: String,

    /// Output format: "json" or "pretty".
    pub format: String,

    /// Also write log lines to this file, rotated daily.
    pub file: Option<String>,

    /// Request headers recorded on the incoming request log line.
    pub headers: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
            file: None,
            headers: vec!["user-agent".to_string()],
        }
    }
}
