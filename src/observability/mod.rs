//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! main.rs
//!     → logging.rs (install subscriber: level, format, sink)
//!
//! Per request:
//!     → http/request.rs opens a span carrying the correlation id
//!     → every gate decision and upstream failure logs inside that span
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Correlation id flows through span context, never a global
//! - Rejections log at warn, upstream failures at error

pub mod logging;
