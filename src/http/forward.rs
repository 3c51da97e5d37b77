//! Single-hop forwarding to the origin.
//!
//! # Responsibilities
//! - Parse and hold the fixed origin location
//! - Rewrite request URIs onto the origin (scheme, authority, base path)
//! - Send the request and stream the response back
//! - Bound every origin exchange, body included, by the configured timeout
//!
//! # Design Decisions
//! - The forwarder is a trait so the filter pipeline can be exercised
//!   against an in-memory origin
//! - One attempt per request; failures surface as [`UpstreamError`]
//! - A single deadline starts when the request is dispatched and covers the
//!   connect, the response headers and every body frame. A body that stalls
//!   past it ends in an error and the origin connection is dropped
//! - The origin call runs inside the request future, so dropping the request
//!   (client disconnect) drops the origin call with it

use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::{
    body::Body,
    http::{
        uri::{Authority, Scheme},
        Request, Response, Uri,
    },
};
use hyper::body::{Body as HttpBody, Bytes, Frame, Incoming, SizeHint};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;
use tokio::time::{Instant, Sleep};
use tracing::Span;
use url::Url;

use crate::config::ConfigError;

/// Failure talking to the origin. Never fatal; maps to a `503`.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("origin request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    #[error("origin did not respond within {0:?}")]
    Timeout(Duration),

    #[error("origin response body failed: {0}")]
    Body(#[from] hyper::Error),

    #[error("cannot build origin request: {0}")]
    InvalidTarget(#[from] axum::http::Error),
}

impl UpstreamError {
    /// Stable reason tag used in logs.
    pub fn reason(&self) -> &'static str {
        "origin-error"
    }
}

/// The fixed origin every allowed request is sent to.
#[derive(Debug, Clone)]
pub struct Origin {
    url: Url,
    authority: Authority,
    base_path: String,
    base_query: Option<String>,
}

impl Origin {
    /// Parse an absolute `http://host[:port][/base][?query]` URL.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(raw.trim()).map_err(|source| ConfigError::InvalidOrigin {
            url: raw.to_string(),
            source,
        })?;

        if url.scheme() != "http" {
            return Err(ConfigError::UnsupportedOrigin {
                url: raw.to_string(),
                reason: "only http origins are supported",
            });
        }
        if url.host_str().is_none() {
            return Err(ConfigError::UnsupportedOrigin {
                url: raw.to_string(),
                reason: "missing host",
            });
        }

        let authority = Authority::from_str(&url[url::Position::BeforeHost..url::Position::AfterPort])
            .map_err(|source| ConfigError::InvalidUrl {
                url: raw.to_string(),
                source,
            })?;

        Ok(Self {
            authority,
            base_path: url.path().to_string(),
            base_query: url.query().filter(|q| !q.is_empty()).map(str::to_string),
            url,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Map a request URI onto the origin.
    ///
    /// The origin's base path and the request path are joined with exactly
    /// one slash; query strings are joined with `&`.
    pub fn target_uri(&self, uri: &Uri) -> Result<Uri, axum::http::Error> {
        let path = join_paths(&self.base_path, uri.path());
        let query = match (self.base_query.as_deref(), uri.query().filter(|q| !q.is_empty())) {
            (Some(base), Some(req)) => Some(format!("{base}&{req}")),
            (Some(base), None) => Some(base.to_string()),
            (None, Some(req)) => Some(req.to_string()),
            (None, None) => None,
        };
        let path_and_query = match query {
            Some(query) => format!("{path}?{query}"),
            None => path,
        };

        Uri::builder()
            .scheme(Scheme::HTTP)
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
    }
}

fn join_paths(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{base}{}", &path[1..]),
        (false, false) => format!("{base}/{path}"),
        _ => format!("{base}{path}"),
    }
}

/// Sends one request to the origin and returns its response.
pub trait Forward: Send + Sync + 'static {
    fn forward(
        &self,
        request: Request<Body>,
    ) -> impl Future<Output = Result<Response<Body>, UpstreamError>> + Send;
}

/// Forwarder backed by a pooled hyper client.
#[derive(Clone)]
pub struct HyperForwarder {
    client: Client<HttpConnector, Body>,
    timeout: Duration,
}

impl HyperForwarder {
    /// `timeout` bounds the whole exchange: connect, response headers and body.
    pub fn new(timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(timeout));
        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self { client, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl std::fmt::Debug for HyperForwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperForwarder")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Forward for HyperForwarder {
    async fn forward(&self, request: Request<Body>) -> Result<Response<Body>, UpstreamError> {
        let deadline = Instant::now() + self.timeout;
        let response = tokio::time::timeout_at(deadline, self.client.request(request))
            .await
            .map_err(|_| UpstreamError::Timeout(self.timeout))??;

        let (parts, body) = response.into_parts();
        let body = DeadlineBody::new(body, deadline, self.timeout);
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

/// Origin response body that fails once the exchange deadline passes.
///
/// No frame is handed out after the deadline. Dropping the body closes the
/// origin connection.
pub struct DeadlineBody {
    inner: Incoming,
    deadline: Pin<Box<Sleep>>,
    timeout: Duration,
    span: Span,
    expired: bool,
}

impl DeadlineBody {
    fn new(inner: Incoming, deadline: Instant, timeout: Duration) -> Self {
        Self {
            inner,
            deadline: Box::pin(tokio::time::sleep_until(deadline)),
            timeout,
            span: Span::current(),
            expired: false,
        }
    }
}

impl HttpBody for DeadlineBody {
    type Data = Bytes;
    type Error = UpstreamError;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = &mut *self;
        if this.expired {
            return Poll::Ready(None);
        }

        if this.deadline.as_mut().poll(cx).is_ready() {
            this.expired = true;
            let _entered = this.span.enter();
            tracing::error!(
                reason = "origin-error",
                timeout = ?this.timeout,
                "origin response body timed out"
            );
            return Poll::Ready(Some(Err(UpstreamError::Timeout(this.timeout))));
        }

        Pin::new(&mut this.inner)
            .poll_frame(cx)
            .map(|frame| frame.map(|frame| frame.map_err(UpstreamError::Body)))
    }

    fn is_end_stream(&self) -> bool {
        self.expired || self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
