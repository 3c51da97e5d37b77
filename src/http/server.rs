//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the Axum router: every path and method goes to the filter pipeline
//! - Wire up middleware (request context, HTTP trace)
//! - Serve with connect info so the pipeline sees the transport peer
//! - Stop accepting and drain in-flight requests on shutdown

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware,
    response::Response,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::config::{ConfigError, ProxyConfig};
use crate::http::forward::{Forward, HyperForwarder};
use crate::http::proxy::{FilterProxy, FilterProxyBuilder};
use crate::http::request::{request_context, ContextState, MakeCorrelationId, UuidCorrelationId};

/// HTTP server for the filtering proxy.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Assemble the pipeline described by `config` with UUID correlation ids.
    pub fn new(config: &ProxyConfig) -> Result<Self, ConfigError> {
        Self::with_correlation_ids(config, Arc::new(UuidCorrelationId))
    }

    /// Like [`HttpServer::new`], drawing correlation ids from `ids`.
    pub fn with_correlation_ids(
        config: &ProxyConfig,
        ids: Arc<dyn MakeCorrelationId>,
    ) -> Result<Self, ConfigError> {
        let proxy: FilterProxy<HyperForwarder> = FilterProxyBuilder::from_config(config).build()?;
        let context = ContextState::new(ids, &config.logging.headers);
        Ok(Self::from_proxy(proxy, context))
    }

    /// Serve an already assembled pipeline.
    pub fn from_proxy<F: Forward>(proxy: FilterProxy<F>, context: ContextState) -> Self {
        Self {
            router: build_router(Arc::new(proxy), context),
        }
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the router. The request context layer is outermost so the trace
/// layer's events land inside the request span.
fn build_router<F: Forward>(proxy: Arc<FilterProxy<F>>, context: ContextState) -> Router {
    Router::new()
        .fallback(proxy_handler::<F>)
        .with_state(proxy)
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn_with_state(context, request_context))
                .layer(TraceLayer::new_for_http()),
        )
}

async fn proxy_handler<F: Forward>(
    State(proxy): State<Arc<FilterProxy<F>>>,
    request: Request<Body>,
) -> Response {
    proxy.handle(request).await
}
