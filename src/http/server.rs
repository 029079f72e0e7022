//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the browse and health handlers
//! - Wire up middleware (request ID, tracing, body limit, panic capture)
//! - Serve on a caller-provided listener until shutdown is signalled

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    catch_panic::CatchPanicLayer,
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::http::browse::{browse_get, browse_options, browse_post};
use crate::upstream::{Fetcher, ReqwestFetcher};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub fetcher: Arc<dyn Fetcher>,
    pub config: Arc<ProxyConfig>,
    /// Wall-clock budget for one outbound fetch.
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(config: ProxyConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        let request_timeout = Duration::from_secs(config.upstream.request_timeout_secs);
        Self {
            fetcher,
            config: Arc::new(config),
            request_timeout,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// HTTP server for the browse proxy.
pub struct HttpServer {
    router: Router,
    config: Arc<ProxyConfig>,
}

impl HttpServer {
    /// Create a server that fetches with the real HTTP client.
    pub fn new(config: ProxyConfig) -> Result<Self, reqwest::Error> {
        let fetcher = ReqwestFetcher::new(&config.upstream)?;
        Ok(Self::with_fetcher(config, Arc::new(fetcher)))
    }

    pub fn with_fetcher(config: ProxyConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        let state = AppState::new(config, fetcher);
        let config = state.config.clone();
        Self {
            router: build_router(state),
            config,
        }
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            route = %self.config.rewrite.route_path,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

/// Build the Axum router with all middleware layers.
pub fn build_router(state: AppState) -> Router {
    let route_path = state.config.rewrite.route_path.clone();
    let max_body_size = state.config.security.max_body_size;

    Router::new()
        .route(
            &route_path,
            get(browse_get).post(browse_post).options(browse_options),
        )
        .route("/health", get(health))
        .with_state(state)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body_size))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let details = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(details = %details, "Handler panicked");
    ProxyError::internal(details).into_response()
}
