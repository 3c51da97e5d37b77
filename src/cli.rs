//! Command-line interface.
//!
//! Flags override values from the optional TOML file, which in turn override
//! the built-in defaults.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{load_config, validate_config, ConfigError, ProxyConfig};

#[derive(Debug, Parser)]
#[command(name = "apex-proxy", version, about = "Filtering reverse proxy for an Apex controller")]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// The Apex (origin) URL
    #[arg(long)]
    pub apex: Option<String>,

    /// The socket to bind the server to (host:port)
    #[arg(long)]
    pub bind: Option<String>,

    /// Origin connect and response timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// IP ranges (CIDR) allowed to access the proxy
    #[arg(long = "allow-ip", value_delimiter = ',')]
    pub allow_ips: Vec<String>,

    /// Allow loopback callers
    #[arg(long)]
    pub allow_loopback: bool,

    /// Allow callers from private address ranges
    #[arg(long)]
    pub allow_private: bool,

    /// Apex URLs to enable
    #[arg(long = "allow-url", value_delimiter = ',')]
    pub allow_urls: Vec<String>,

    /// Enable the cgi-bin XML endpoints
    #[arg(long)]
    pub allow_xml_endpoints: bool,

    /// Enable the cgi-bin JSON endpoints
    #[arg(long)]
    pub allow_json_endpoints: bool,

    /// Address lookup cache size (0 disables)
    #[arg(long, allow_negative_numbers = true)]
    pub cache_size: Option<i64>,

    /// Log level (error|warning|info|debug)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json|pretty)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Write logs to file
    #[arg(long)]
    pub log_file: Option<String>,
}

impl Cli {
    /// Resolve the effective configuration.
    pub fn into_config(self) -> Result<ProxyConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => ProxyConfig::default(),
        };
        self.apply(&mut config);
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }

    fn apply(self, config: &mut ProxyConfig) {
        if let Some(apex) = self.apex {
            config.origin.url = apex;
        }
        if let Some(bind) = self.bind {
            config.listener.bind_address = normalize_bind(bind);
        }
        if let Some(timeout) = self.timeout {
            config.origin.timeout_secs = timeout;
        }

        let access = &mut config.access;
        access.allow_ips.extend(self.allow_ips);
        access.allow_urls.extend(self.allow_urls);
        access.allow_loopback |= self.allow_loopback;
        access.allow_private |= self.allow_private;
        access.allow_xml_endpoints |= self.allow_xml_endpoints;
        access.allow_json_endpoints |= self.allow_json_endpoints;
        if let Some(size) = self.cache_size {
            access.cache_capacity = size;
        }

        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
        if let Some(file) = self.log_file {
            config.logging.file = Some(file);
        }
    }
}

/// Accept the short `:port` form for "all interfaces".
fn normalize_bind(bind: String) -> String {
    if bind.starts_with(':') {
        format!("0.0.0.0{bind}")
    } else {
        bind
    }
}
