//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → command-line overrides (cli.rs)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → FilterProxyBuilder (ranges, URLs, origin parsed; ConfigError on failure)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::ConfigError;
pub use loader::load_config;
pub use schema::{AccessConfig, ListenerConfig, LoggingConfig, OriginConfig, ProxyConfig};
pub use validation::{validate_config, ValidationError};
