//! Configuration validation.
//!
//! Serde handles syntax; this module checks the values that the proxy builder
//! does not already reject on its own (listener, timeouts, logging). All
//! problems are reported together rather than stopping at the first.

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::ProxyConfig;
use crate::observability::logging::{parse_level, LogFormat};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate `config`, returning every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("{:?} is not a host:port socket address", config.listener.bind_address),
        ));
    }

    if config.origin.timeout_secs == 0 {
        errors.push(ValidationError::new("origin.timeout_secs", "must be greater than zero"));
    }

    if parse_level(&config.logging.level).is_err() {
        errors.push(ValidationError::new(
            "logging.level",
            format!("unknown level {:?}", config.logging.level),
        ));
    }

    if config.logging.format.parse::<LogFormat>().is_err() {
        errors.push(ValidationError::new(
            "logging.format",
            format!("unknown format {:?}", config.logging.format),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
