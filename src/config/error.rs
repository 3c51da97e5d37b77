//! Configuration errors.
//!
//! Every variant is fatal: it is raised while assembling the proxy and keeps
//! the listener from ever starting.

use thiserror::Error;

use crate::config::validation::ValidationError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("invalid address range {range:?}: {source}")]
    InvalidRange {
        range: String,
        #[source]
        source: ipnet::AddrParseError,
    },

    #[error("invalid origin URL {url:?}: {source}")]
    InvalidOrigin {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported origin URL {url:?}: {reason}")]
    UnsupportedOrigin { url: String, reason: &'static str },

    #[error("invalid allowed URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: axum::http::uri::InvalidUri,
    },

    #[error("invalid log level {0:?}")]
    InvalidLogLevel(String),

    #[error("logging setup failed: {0}")]
    Logging(String),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
