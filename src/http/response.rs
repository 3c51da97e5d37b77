//! Responses produced by the proxy itself.
//!
//! # Responsibilities
//! - Fixed `403 forbidden` for every rejected request
//! - Opaque `503` carrying only the correlation id on upstream failure
//! - Identifying `server` header on everything the proxy returns
//! - Hop-by-hop header removal for forwarded messages
//!
//! # Design Decisions
//! - Rejection bodies never say which gate failed
//! - Upstream error text stays in the logs, never in a response body

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, HeaderValue, Response, StatusCode},
    response::IntoResponse,
};

/// Value of the `server` header added to every response.
pub const SERVER_NAME: &str = concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"));

/// Body sent with every rejection.
pub const FORBIDDEN_BODY: &str = "forbidden";

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// `403` with the fixed rejection body.
pub fn forbidden() -> Response<Body> {
    (StatusCode::FORBIDDEN, FORBIDDEN_BODY).into_response()
}

/// `503` whose body names only the correlation id.
pub fn upstream_failure(request_id: &str) -> Response<Body> {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        format!("request-id={request_id}"),
    )
        .into_response()
}

/// Append the identifying `server` header.
///
/// Appended rather than overwritten, so an origin's own `server` header
/// still reaches the client untouched.
pub fn identify(mut response: Response<Body>) -> Response<Body> {
    response
        .headers_mut()
        .append(header::SERVER, HeaderValue::from_static(SERVER_NAME));
    response
}

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in &listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}
