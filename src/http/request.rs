//! Request context: correlation ids and the per-request log span.
//!
//! # Responsibilities
//! - Generate a correlation id for every inbound request
//! - Attach it to the request as a [`RequestContext`] extension
//! - Open a span carrying the id so every event logged while handling the
//!   request is tagged with it
//! - Log the incoming request line with selected headers
//!
//! # Design Decisions
//! - Ids are always minted here; client supplied ids are never trusted
//! - The id generator is injected, so tests can observe the ids handed out
//! - Code reading a request without context gets a detached `unknown` id

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderName, Request},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;

/// Id reported when a request carries no context.
pub const UNKNOWN_ID: &str = "unknown";

/// Source of per-request correlation ids.
pub trait MakeCorrelationId: Send + Sync + 'static {
    fn make_id(&self) -> String;
}

/// Random UUID v4 correlation ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidCorrelationId;

impl MakeCorrelationId for UuidCorrelationId {
    fn make_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Per-request values shared between middleware and the filter pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    id: String,
}

impl RequestContext {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Context for requests that never passed through [`request_context`].
    pub fn detached() -> Self {
        Self::new(UNKNOWN_ID)
    }

    /// The context attached to `request`, or a detached one.
    pub fn of<B>(request: &Request<B>) -> Self {
        request
            .extensions()
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_else(Self::detached)
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// State for the [`request_context`] middleware.
#[derive(Clone)]
pub struct ContextState {
    ids: Arc<dyn MakeCorrelationId>,
    headers: Arc<[HeaderName]>,
}

impl ContextState {
    /// `headers` names request headers to include on the incoming request
    /// log line. Names that are not valid header names are ignored.
    pub fn new<I, S>(ids: Arc<dyn MakeCorrelationId>, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let headers = headers
            .into_iter()
            .filter_map(|name| HeaderName::from_bytes(name.as_ref().trim().as_bytes()).ok())
            .collect();
        Self { ids, headers }
    }
}

impl std::fmt::Debug for ContextState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextState")
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Middleware attaching a [`RequestContext`] and request span.
pub async fn request_context(
    State(state): State<ContextState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let id = state.ids.make_id();
    let span = tracing::info_span!("request", id = %id);

    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "-".to_string());

    let logged: Vec<String> = state
        .headers
        .iter()
        .map(|name| {
            let value = request
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            format!("{name}={value}")
        })
        .collect();

    span.in_scope(|| {
        tracing::info!(
            method = %request.method(),
            path = %request.uri(),
            remote = %remote,
            headers = ?logged,
            "incoming request"
        );
    });

    request.extensions_mut().insert(RequestContext::new(id));
    next.run(request).instrument(span).await
}
