//! The filter pipeline.
//!
//! Every inbound request passes five gates in a fixed order. The first
//! failing gate ends evaluation with a `403`, and the origin is never
//! contacted:
//!
//! ```text
//! source address (transport peer only)
//!     → address allow-list (AccessList)
//!     → method (GET only)
//!     → path (exact match against allowed paths)
//!     → forward to origin
//! ```
//!
//! A forwarded request gets the origin's response back untouched. When the
//! origin cannot be reached the client only learns the correlation id; the
//! error itself goes to the log.

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Method, Request, Response, StatusCode, Uri, Version},
};
use thiserror::Error;

use crate::config::{ConfigError, ProxyConfig};
use crate::http::forward::{Forward, HyperForwarder, Origin, UpstreamError};
use crate::http::request::RequestContext;
use crate::http::response::{forbidden, identify, strip_hop_by_hop, upstream_failure};
use crate::security::access_control::AccessList;
use crate::security::presets::{JSON_ENDPOINTS, LOOPBACK_RANGES, PRIVATE_RANGES, XML_ENDPOINTS};

/// Default size of the address lookup cache.
pub const DEFAULT_CACHE_CAPACITY: i64 = 1000;

/// Default bound on a single origin round trip.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Why a request was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("no remote ip found")]
    NoSourceAddress,

    #[error("ip blocked: {address}")]
    IpDenied { address: String },

    #[error("method blocked: {method}")]
    MethodDenied { method: String },

    #[error("url blocked: {path}")]
    PathDenied { path: String },
}

impl Rejection {
    /// Stable reason tag used in logs.
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::NoSourceAddress => "no-source-address",
            Rejection::IpDenied { .. } => "ip-denied",
            Rejection::MethodDenied { .. } => "method-denied",
            Rejection::PathDenied { .. } => "path-denied",
        }
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::FORBIDDEN
    }
}

/// Outcome of the gate checks for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Forward,
    Deny(Rejection),
}

/// The caller's address, taken from the transport peer only.
///
/// Forwarding headers such as `X-Forwarded-For` are deliberately ignored.
pub fn source_address<B>(request: &Request<B>) -> Option<IpAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

/// Filtering reverse proxy in front of a single origin.
///
/// Immutable after construction apart from the access list's lookup cache,
/// so one instance is shared by all request tasks.
#[derive(Debug)]
pub struct FilterProxy<F = HyperForwarder> {
    origin: Origin,
    access_list: AccessList,
    allowed_paths: HashSet<String>,
    forwarder: F,
}

impl FilterProxy<HyperForwarder> {
    pub fn builder(origin: impl Into<String>) -> FilterProxyBuilder {
        FilterProxyBuilder::new(origin)
    }
}

impl<F: Forward> FilterProxy<F> {
    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn access_list(&self) -> &AccessList {
        &self.access_list
    }

    pub fn allowed_paths(&self) -> &HashSet<String> {
        &self.allowed_paths
    }

    /// Run the gates against `request` without forwarding it.
    pub fn evaluate<B>(&self, request: &Request<B>) -> Decision {
        let Some(source) = source_address(request) else {
            tracing::warn!(reason = "no-source-address", "no remote ip found");
            return Decision::Deny(Rejection::NoSourceAddress);
        };

        let source = source.to_string();
        if !self.access_list.contains(&source) {
            tracing::warn!(reason = "ip-denied", source = %source, "ip blocked");
            return Decision::Deny(Rejection::IpDenied { address: source });
        }
        tracing::debug!(source = %source, "ip allowed");

        if request.method() != Method::GET {
            tracing::warn!(reason = "method-denied", method = %request.method(), "method blocked");
            return Decision::Deny(Rejection::MethodDenied {
                method: request.method().to_string(),
            });
        }

        let path = request.uri().path();
        if !self.allowed_paths.contains(path) {
            tracing::warn!(reason = "path-denied", url = %path, "url blocked");
            return Decision::Deny(Rejection::PathDenied {
                path: path.to_string(),
            });
        }
        tracing::debug!(url = %path, "url allowed");

        Decision::Forward
    }

    /// Evaluate `request` and either refuse it or forward it to the origin.
    pub async fn handle(&self, request: Request<Body>) -> Response<Body> {
        let decision = self.evaluate(&request);
        let response = match decision {
            Decision::Deny(_) => forbidden(),
            Decision::Forward => self.forward(request).await,
        };
        identify(response)
    }

    async fn forward(&self, request: Request<Body>) -> Response<Body> {
        let context = RequestContext::of(&request);

        match self.send(request).await {
            Ok(response) => {
                let (mut parts, body) = response.into_parts();
                strip_hop_by_hop(&mut parts.headers);
                Response::from_parts(parts, body)
            }
            Err(err) => {
                tracing::error!(
                    reason = err.reason(),
                    error = %err,
                    detail = %error_chain(&err),
                    "proxy error"
                );
                upstream_failure(context.id())
            }
        }
    }

    async fn send(&self, request: Request<Body>) -> Result<Response<Body>, UpstreamError> {
        let (mut parts, body) = request.into_parts();
        parts.uri = self.origin.target_uri(&parts.uri)?;
        parts.version = Version::HTTP_11;
        strip_hop_by_hop(&mut parts.headers);

        self.forwarder.forward(Request::from_parts(parts, body)).await
    }
}

/// Render an error with all of its sources.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}

/// The path component of a configured URL.
///
/// Scheme, authority and query are dropped, so URLs that differ only in
/// their query string allow the same path.
fn allowed_path(url: &str) -> Result<String, ConfigError> {
    let uri: Uri = url.parse().map_err(|source| ConfigError::InvalidUrl {
        url: url.to_string(),
        source,
    })?;
    Ok(uri.path().to_string())
}

/// Assembles a [`FilterProxy`] from explicit lists and named presets.
///
/// Presets only ever add entries. If no address range is supplied at all,
/// loopback access is the default.
#[derive(Debug, Clone)]
pub struct FilterProxyBuilder {
    origin: String,
    ranges: Vec<String>,
    urls: Vec<String>,
    cache_capacity: i64,
    timeout: Duration,
}

impl FilterProxyBuilder {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            ranges: Vec::new(),
            urls: Vec::new(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Builder populated from a loaded configuration.
    pub fn from_config(config: &ProxyConfig) -> Self {
        let access = &config.access;
        let mut builder = Self::new(config.origin.url.clone())
            .allow_ips(&access.allow_ips)
            .allow_urls(&access.allow_urls)
            .cache_capacity(access.cache_capacity)
            .timeout(Duration::from_secs(config.origin.timeout_secs));

        if access.allow_loopback {
            builder = builder.allow_loopback();
        }
        if access.allow_private {
            builder = builder.allow_private();
        }
        if access.allow_xml_endpoints {
            builder = builder.allow_xml_endpoints();
        }
        if access.allow_json_endpoints {
            builder = builder.allow_json_endpoints();
        }
        builder
    }

    pub fn allow_ips<I, S>(mut self, ranges: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ranges
            .extend(ranges.into_iter().map(|r| r.as_ref().to_string()));
        self
    }

    pub fn allow_loopback(self) -> Self {
        self.allow_ips(LOOPBACK_RANGES)
    }

    pub fn allow_private(self) -> Self {
        self.allow_ips(PRIVATE_RANGES)
    }

    pub fn allow_urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.urls
            .extend(urls.into_iter().map(|u| u.as_ref().to_string()));
        self
    }

    pub fn allow_xml_endpoints(self) -> Self {
        self.allow_urls(XML_ENDPOINTS)
    }

    pub fn allow_json_endpoints(self) -> Self {
        self.allow_urls(JSON_ENDPOINTS)
    }

    /// Zero or negative disables the address lookup cache.
    pub fn cache_capacity(mut self, capacity: i64) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build with the default hyper forwarder.
    pub fn build(self) -> Result<FilterProxy<HyperForwarder>, ConfigError> {
        let forwarder = HyperForwarder::new(self.timeout);
        self.build_with(forwarder)
    }

    /// Build with a caller-supplied forwarder.
    pub fn build_with<F: Forward>(self, forwarder: F) -> Result<FilterProxy<F>, ConfigError> {
        let origin = Origin::parse(&self.origin)?;

        let ranges: Vec<String> = if self.ranges.is_empty() {
            LOOPBACK_RANGES.iter().map(|r| r.to_string()).collect()
        } else {
            self.ranges
        };
        let capacity = usize::try_from(self.cache_capacity).unwrap_or(0);
        let access_list = AccessList::new(&ranges, capacity)?;

        let allowed_paths = self
            .urls
            .iter()
            .map(|url| allowed_path(url))
            .collect::<Result<HashSet<_>, _>>()?;

        Ok(FilterProxy {
            origin,
            access_list,
            allowed_paths,
            forwarder,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;
    use std::sync::{Arc, Mutex};

    /// In-memory origin recording every request it receives.
    #[derive(Clone, Default)]
    struct RecordingOrigin {
        calls: Arc<Mutex<Vec<Request<()>>>>,
        fail: bool,
    }

    impl RecordingOrigin {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl Forward for RecordingOrigin {
        async fn forward(&self, request: Request<Body>) -> Result<Response<Body>, UpstreamError> {
            let (parts, _) = request.into_parts();
            self.calls.lock().unwrap().push(Request::from_parts(parts, ()));
            if self.fail {
                return Err(UpstreamError::Timeout(Duration::from_millis(1)));
            }
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header(header::SERVER, "Apex")
                .header("x-origin", "apex")
                .body(Body::from(r#"{"istat":{}}"#))
                .unwrap())
        }
    }

    fn proxy(origin: RecordingOrigin) -> FilterProxy<RecordingOrigin> {
        FilterProxy::builder("http://apex.local")
            .allow_ips(["10.0.0.0/8"])
            .allow_urls(["http://apex.local/cgi-bin/status.json"])
            .build_with(origin)
            .unwrap()
    }

    fn request(method: &str, uri: &str, source: Option<&str>) -> Request<Body> {
        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        if let Some(source) = source {
            let addr: SocketAddr = source.parse().unwrap();
            request.extensions_mut().insert(ConnectInfo(addr));
        }
        request.extensions_mut().insert(RequestContext::new("req-1"));
        request
    }

    async fn body_text(response: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_allowed_request_is_forwarded_unmodified() {
        let origin = RecordingOrigin::default();
        let proxy = proxy(origin.clone());

        let response = proxy
            .handle(request("GET", "/cgi-bin/status.json?sdate=1", Some("10.1.2.3:5555")))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-origin"], "apex");
        let servers: Vec<_> = response.headers().get_all(header::SERVER).iter().collect();
        assert_eq!(servers.len(), 2);
        assert_eq!(body_text(response).await, r#"{"istat":{}}"#);

        let calls = origin.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method(), Method::GET);
        assert_eq!(
            calls[0].uri().to_string(),
            "http://apex.local/cgi-bin/status.json?sdate=1"
        );
    }

    #[tokio::test]
    async fn test_post_is_denied() {
        let origin = RecordingOrigin::default();
        let proxy = proxy(origin.clone());

        let response = proxy
            .handle(request("POST", "/cgi-bin/status.json", Some("10.1.2.3:5555")))
            .await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers()[header::SERVER], crate::http::response::SERVER_NAME);
        assert_eq!(body_text(response).await, "forbidden");
        assert_eq!(origin.call_count(), 0);
    }

    #[tokio::test]
    async fn test_ip_gate_short_circuits() {
        let origin = RecordingOrigin::default();
        let proxy = proxy(origin.clone());

        // Method and path would both fail too; only the address gate is reported.
        let req = request("DELETE", "/admin", Some("192.168.1.1:4000"));
        assert_eq!(
            proxy.evaluate(&req),
            Decision::Deny(Rejection::IpDenied {
                address: "192.168.1.1".into()
            })
        );

        let response = proxy.handle(req).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_text(response).await, "forbidden");
        assert_eq!(origin.call_count(), 0);
        assert_eq!(proxy.access_list().cached("192.168.1.1"), Some(false));
    }

    #[test]
    fn test_missing_source_is_denied() {
        let proxy = proxy(RecordingOrigin::default());
        let req = request("GET", "/cgi-bin/status.json", None);

        let decision = proxy.evaluate(&req);
        assert_eq!(decision, Decision::Deny(Rejection::NoSourceAddress));
        assert_eq!(proxy.access_list().cache_len(), 0);
    }

    #[test]
    fn test_forwarded_for_header_is_ignored() {
        let proxy = proxy(RecordingOrigin::default());
        let mut req = request("GET", "/cgi-bin/status.json", Some("172.16.0.1:80"));
        req.headers_mut()
            .insert("x-forwarded-for", "10.0.0.1".parse().unwrap());

        assert!(matches!(proxy.evaluate(&req), Decision::Deny(Rejection::IpDenied { .. })));
    }

    #[test]
    fn test_path_match_is_exact() {
        let proxy = proxy(RecordingOrigin::default());
        let src = Some("10.0.0.1:1");

        assert_eq!(
            proxy.evaluate(&request("GET", "/cgi-bin/status.json", src)),
            Decision::Forward
        );
        assert_eq!(
            proxy.evaluate(&request("GET", "/cgi-bin/status.json?x=1", src)),
            Decision::Forward
        );
        assert_eq!(
            proxy.evaluate(&request("GET", "/cgi-bin/status.json/", src)),
            Decision::Deny(Rejection::PathDenied {
                path: "/cgi-bin/status.json/".into()
            })
        );
        assert!(matches!(
            proxy.evaluate(&request("GET", "/cgi-bin/status.xml", src)),
            Decision::Deny(Rejection::PathDenied { .. })
        ));
    }

    #[test]
    fn test_method_check_is_exact() {
        let proxy = proxy(RecordingOrigin::default());
        let src = Some("10.0.0.1:1");

        for method in ["HEAD", "PUT", "OPTIONS", "get"] {
            assert!(
                matches!(
                    proxy.evaluate(&request(method, "/cgi-bin/status.json", src)),
                    Decision::Deny(Rejection::MethodDenied { .. })
                ),
                "{method}"
            );
        }
    }

    #[tokio::test]
    async fn test_upstream_failure_is_opaque() {
        let origin = RecordingOrigin::failing();
        let proxy = proxy(origin.clone());

        let response = proxy
            .handle(request("GET", "/cgi-bin/status.json", Some("10.0.0.1:1")))
            .await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::SERVER], crate::http::response::SERVER_NAME);
        assert_eq!(body_text(response).await, "request-id=req-1");
        assert_eq!(origin.call_count(), 1);
    }

    #[tokio::test]
    async fn test_hop_by_hop_headers_not_forwarded() {
        let origin = RecordingOrigin::default();
        let proxy = proxy(origin.clone());

        let mut req = request("GET", "/cgi-bin/status.json", Some("10.0.0.1:1"));
        req.headers_mut().insert(header::CONNECTION, "close".parse().unwrap());
        req.headers_mut().insert(header::USER_AGENT, "curl/8".parse().unwrap());
        proxy.handle(req).await;

        let calls = origin.calls.lock().unwrap();
        assert!(calls[0].headers().get(header::CONNECTION).is_none());
        assert_eq!(calls[0].headers()[header::USER_AGENT], "curl/8");
    }

    #[test]
    fn test_default_access_is_loopback_only() {
        let proxy = FilterProxy::builder("http://apex.local")
            .build_with(RecordingOrigin::default())
            .unwrap();

        assert!(proxy.access_list().contains("127.0.0.1"));
        assert!(proxy.access_list().contains("::1"));
        assert!(!proxy.access_list().contains("10.0.0.1"));
        assert!(proxy.allowed_paths().is_empty());

        // No allowed paths: even loopback is refused.
        assert!(matches!(
            proxy.evaluate(&request("GET", "/cgi-bin/status.json", Some("127.0.0.1:1"))),
            Decision::Deny(Rejection::PathDenied { .. })
        ));
    }

    #[test]
    fn test_presets_are_additive() {
        let proxy = FilterProxy::builder("http://apex.local")
            .allow_ips(["8.8.8.8/32"])
            .allow_private()
            .allow_loopback()
            .allow_xml_endpoints()
            .allow_json_endpoints()
            .allow_urls(["/custom"])
            .build_with(RecordingOrigin::default())
            .unwrap();

        let list = proxy.access_list();
        assert_eq!(list.ranges().len(), 1 + PRIVATE_RANGES.len() + LOOPBACK_RANGES.len());
        for ip in ["8.8.8.8", "10.1.1.1", "172.31.255.255", "192.168.0.1", "fd00::1", "fec0::1", "127.0.0.1"] {
            assert!(list.contains(ip), "{ip}");
        }
        assert!(!list.contains("172.32.0.1"));

        assert_eq!(proxy.allowed_paths().len(), 7);
        assert!(proxy.allowed_paths().contains("/cgi-bin/datalog.xml"));
        assert!(proxy.allowed_paths().contains("/cgi-bin/outlog.json"));
    }

    #[test]
    fn test_urls_differing_in_query_collapse() {
        let proxy = FilterProxy::builder("http://apex.local")
            .allow_urls([
                "http://apex.local/cgi-bin/status.json?a=1",
                "http://other.host/cgi-bin/status.json?b=2",
            ])
            .build_with(RecordingOrigin::default())
            .unwrap();

        assert_eq!(proxy.allowed_paths().len(), 1);
        assert!(proxy.allowed_paths().contains("/cgi-bin/status.json"));
    }

    #[test]
    fn test_configuration_errors() {
        let bad_range = FilterProxy::builder("http://apex.local")
            .allow_ips(["10.0.0.0/8", "bogus"])
            .build_with(RecordingOrigin::default());
        assert!(matches!(bad_range, Err(ConfigError::InvalidRange { .. })));

        let bad_origin = FilterProxy::builder("::not a url::").build_with(RecordingOrigin::default());
        assert!(matches!(bad_origin, Err(ConfigError::InvalidOrigin { .. })));

        let bad_url = FilterProxy::builder("http://apex.local")
            .allow_urls(["http://bad host/x"])
            .build_with(RecordingOrigin::default());
        assert!(matches!(bad_url, Err(ConfigError::InvalidUrl { .. })));

        let padded_range = FilterProxy::builder("http://apex.local")
            .allow_ips([" 10.0.0.0/8"])
            .build_with(RecordingOrigin::default());
        assert!(matches!(padded_range, Err(ConfigError::InvalidRange { .. })));

        let padded_url = FilterProxy::builder("http://apex.local")
            .allow_urls([" /cgi-bin/status.json"])
            .build_with(RecordingOrigin::default());
        assert!(matches!(padded_url, Err(ConfigError::InvalidUrl { .. })));
    }

    #[test]
    fn test_max_cache_capacity_builds() {
        let proxy = FilterProxy::builder("http://apex.local")
            .allow_ips(["10.0.0.0/8"])
            .cache_capacity(i64::MAX)
            .build_with(RecordingOrigin::default())
            .unwrap();

        assert!(proxy.access_list().contains("10.0.0.1"));
        assert_eq!(proxy.access_list().cache_len(), 1);
    }

    #[test]
    fn test_from_config() {
        let mut config = ProxyConfig::default();
        config.access.allow_ips = vec!["1.0.0.0/8".into()];
        config.access.allow_json_endpoints = true;
        config.access.cache_capacity = -1;

        let proxy = FilterProxyBuilder::from_config(&config)
            .build_with(RecordingOrigin::default())
            .unwrap();

        assert!(proxy.access_list().contains("1.2.3.4"));
        assert!(!proxy.access_list().contains("127.0.0.1"));
        assert_eq!(proxy.access_list().cache_len(), 0);
        assert_eq!(proxy.allowed_paths().len(), 3);
        assert_eq!(proxy.origin().url().as_str(), "http://apex.local/");
    }

    #[test]
    fn test_error_chain() {
        let err = ConfigError::InvalidRange {
            range: "x".into(),
            source: "x".parse::<ipnet::IpNet>().unwrap_err(),
        };
        assert!(error_chain(&err).starts_with("invalid address range \"x\": "));
    }
}
