//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (peer address captured by axum connect info)
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (correlation id, request span, request log line)
//!     → proxy.rs (source → ip → method → path gates)
//!     → forward.rs (rewrite onto origin, single attempt, timeout)
//!     → response.rs (403 / opaque 503 / server header)
//!     → Send to client
//! ```

pub mod forward;
pub mod proxy;
pub mod request;
pub mod response;
pub mod server;

pub use forward::{Forward, HyperForwarder, Origin, UpstreamError};
pub use proxy::{Decision, FilterProxy, FilterProxyBuilder, Rejection};
pub use request::{ContextState, MakeCorrelationId, RequestContext, UuidCorrelationId};
pub use server::HttpServer;
