//! Filtering reverse proxy for an Apex controller.
//!
//! Forwards only `GET` requests for allow-listed paths from allow-listed
//! source addresses to a single fixed origin, refusing everything else
//! before the origin is contacted.

pub mod cli;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::schema::ProxyConfig;
pub use http::{FilterProxy, HttpServer};
pub use lifecycle::Shutdown;
