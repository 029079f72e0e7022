//! Browse endpoint: validate, fetch, classify, rewrite.
//!
//! # Data Flow
//! ```text
//! GET/POST ?url=<target>
//!     → request.rs (target extraction + validation, app origin)
//!     → Fetcher under a wall-clock deadline
//!     → non-2xx policy (render HTML anyway, else surface upstream status)
//!     → rewrite (HTML only) → response.rs (headers by content class)
//! OPTIONS
//!     → bare 200 with CORS headers, no fetch
//! ```

use std::time::{Duration, Instant};

use axum::{
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use bytes::Bytes;

use crate::error::ProxyError;
use crate::http::request::{app_origin, extract_target, ProxyRequest};
use crate::http::response::{preflight, FetchOutcome, OutcomeBody};
use crate::http::server::AppState;
use crate::http::X_REQUEST_ID;
use crate::observability::metrics;
use crate::rewrite::{rewrite, RewriteContext};
use crate::upstream::{ContentClass, Fetcher, OutboundRequest, UpstreamBody, UpstreamResponse};

fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// Run one outbound fetch, cancelling it when `deadline` passes.
pub async fn fetch_with_deadline(
    fetcher: &dyn Fetcher,
    request: OutboundRequest,
    deadline: Duration,
) -> Result<UpstreamResponse, ProxyError> {
    match tokio::time::timeout(deadline, fetcher.fetch(request)).await {
        Ok(result) => result.map_err(ProxyError::from),
        // dropping the future aborts the in-flight call
        Err(_) => Err(ProxyError::UpstreamTimeout),
    }
}

async fn forward(
    state: &AppState,
    request: ProxyRequest,
    app_origin: String,
    request_id: &str,
) -> Result<Response, ProxyError> {
    tracing::debug!(
        request_id = %request_id,
        method = %request.method,
        target = %request.target,
        "Fetching target"
    );

    let UpstreamResponse {
        status,
        reason,
        content_type,
        body,
    } = fetch_with_deadline(
        state.fetcher.as_ref(),
        request.outbound(),
        state.request_timeout,
    )
    .await?;
    let class = ContentClass::of(&content_type);

    if !status.is_success() {
        let renderable = class == ContentClass::Html && !body.is_empty();
        // POST answers are always served; GET only when there is a page to show
        if request.method != Method::POST && !renderable {
            return Err(ProxyError::UpstreamHttp { status, reason });
        }
        tracing::warn!(
            request_id = %request_id,
            target = %request.target,
            upstream_status = %status,
            "Serving non-success upstream response as 200"
        );
    }

    let body = match (class, body) {
        (ContentClass::Html, UpstreamBody::Text(html)) => {
            let ctx = RewriteContext::for_target(&request.target, app_origin)
                .with_route_path(state.config.rewrite.route_path.clone());
            match rewrite(&html, &ctx) {
                Ok(rewritten) => {
                    metrics::record_rewrite();
                    OutcomeBody::Text(rewritten)
                }
                Err(e) => {
                    tracing::warn!(
                        request_id = %request_id,
                        target = %request.target,
                        error = %e,
                        "Rewrite failed, serving document unmodified"
                    );
                    OutcomeBody::Text(html)
                }
            }
        }
        (_, UpstreamBody::Text(text)) => OutcomeBody::Text(text),
        (_, UpstreamBody::Bytes(bytes)) => OutcomeBody::Bytes(bytes),
    };

    Ok(FetchOutcome {
        status: StatusCode::OK,
        content_type,
        body,
    }
    .into_response())
}

fn finish(
    method: &Method,
    result: Result<Response, ProxyError>,
    start: Instant,
    request_id: &str,
) -> Response {
    let response = match result {
        Ok(response) => response,
        Err(err) => {
            match &err {
                ProxyError::MissingParameter | ProxyError::InvalidUrlSyntax => {
                    tracing::debug!(request_id = %request_id, error = %err, "Rejected request");
                }
                ProxyError::Internal { details } => {
                    tracing::error!(request_id = %request_id, details = %details, "Proxy browse error");
                }
                _ => {
                    metrics::record_upstream_failure(err.kind());
                    tracing::warn!(request_id = %request_id, error = %err, "Upstream fetch failed");
                }
            }
            err.into_response()
        }
    };

    tracing::info!(
        request_id = %request_id,
        method = %method,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Browse request completed"
    );
    metrics::record_request(method.as_str(), response.status().as_u16(), start);
    response
}

/// `GET ?url=`: fetch and re-serve the target.
pub async fn browse_get(State(state): State<AppState>, headers: HeaderMap, uri: Uri) -> Response {
    let start = Instant::now();
    let request_id = request_id(&headers);

    let result: Result<Response, ProxyError> = async {
        let target = extract_target(&uri)?;
        let origin = app_origin(&headers, &uri, state.config.rewrite.public_origin.as_deref());
        forward(&state, ProxyRequest::get(target), origin, &request_id).await
    }
    .await;

    finish(&Method::GET, result, start, &request_id)
}

/// `POST ?url=`: forward the caller's body to the target.
pub async fn browse_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
    body: Bytes,
) -> Response {
    let start = Instant::now();
    let request_id = request_id(&headers);

    let result: Result<Response, ProxyError> = async {
        let target = extract_target(&uri)?;
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let origin = app_origin(&headers, &uri, state.config.rewrite.public_origin.as_deref());
        forward(
            &state,
            ProxyRequest::post(target, body, content_type),
            origin,
            &request_id,
        )
        .await
    }
    .await;

    finish(&Method::POST, result, start, &request_id)
}

/// CORS preflight. Never touches the network.
pub async fn browse_options() -> Response {
    preflight()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxyConfig;
    use crate::http::server::build_router;
    use crate::upstream::FetchError;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tower::ServiceExt;

    struct StubFetcher {
        result: Result<UpstreamResponse, FetchError>,
        delay: Duration,
        calls: AtomicUsize,
        last_request: Mutex<Option<OutboundRequest>>,
    }

    impl StubFetcher {
        fn ok(status: u16, content_type: &str, body: UpstreamBody) -> Arc<Self> {
            let status = StatusCode::from_u16(status).unwrap();
            Self::with_result(Ok(UpstreamResponse {
                status,
                reason: status.canonical_reason().unwrap_or_default().to_string(),
                content_type: content_type.to_string(),
                body,
            }))
        }

        fn html(status: u16, html: &str) -> Arc<Self> {
            Self::ok(status, "text/html; charset=utf-8", UpstreamBody::Text(html.to_string()))
        }

        fn with_result(result: Result<UpstreamResponse, FetchError>) -> Arc<Self> {
            Arc::new(Self {
                result,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                result: Err(FetchError::Transport("never reached".into())),
                delay,
                calls: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn fetch(&self, request: OutboundRequest) -> Result<UpstreamResponse, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.result.clone()
        }
    }

    struct PanickingFetcher;

    #[async_trait]
    impl Fetcher for PanickingFetcher {
        async fn fetch(&self, _request: OutboundRequest) -> Result<UpstreamResponse, FetchError> {
            panic!("fetcher blew up");
        }
    }

    fn app(fetcher: Arc<dyn Fetcher>) -> axum::Router {
        build_router(AppState::new(ProxyConfig::default(), fetcher))
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("host", "proxy.local")
            .body(Body::empty())
            .unwrap()
    }

    fn browse(target: &str) -> String {
        format!("/api/proxy/browse?url={}", urlencoding::encode(target))
    }

    async fn body_bytes(response: Response) -> Bytes {
        axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    #[tokio::test]
    async fn missing_url_is_rejected_without_fetching() {
        let fetcher = StubFetcher::html(200, "<p>x</p>");
        let response = app(fetcher.clone()).oneshot(get("/api/proxy/browse")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "URL parameter is required");
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn malformed_url_is_rejected() {
        let fetcher = StubFetcher::html(200, "<p>x</p>");
        let response = app(fetcher.clone())
            .oneshot(get("/api/proxy/browse?url=not%20a%20url"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Invalid URL format");
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn slow_upstream_times_out_with_504() {
        let fetcher = StubFetcher::slow(Duration::from_secs(5));
        let state = AppState::new(ProxyConfig::default(), fetcher.clone())
            .with_request_timeout(Duration::from_millis(50));
        let response = build_router(state)
            .oneshot(get(&browse("https://slow.example.com/")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        let error = body_json(response).await["error"].as_str().unwrap().to_string();
        assert!(error.starts_with("Request timeout"), "{error}");
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn transport_timeout_also_maps_to_504() {
        let fetcher = StubFetcher::with_result(Err(FetchError::Timeout));
        let response = app(fetcher).oneshot(get(&browse("https://example.com/"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn transport_failure_is_500() {
        let fetcher = StubFetcher::with_result(Err(FetchError::Transport("connection refused".into())));
        let response = app(fetcher).oneshot(get(&browse("https://example.com/"))).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await["error"],
            "Failed to fetch content: connection refused"
        );
    }

    #[tokio::test]
    async fn html_is_rewritten_and_not_cached() {
        let fetcher = StubFetcher::html(
            200,
            "<html><head></head><body><a href=\"/about\">About</a></body></html>",
        );
        let response = app(fetcher.clone())
            .oneshot(get(&browse("https://example.com/index.html")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers().clone();
        assert_eq!(headers[header::CONTENT_TYPE], "text/html; charset=utf-8");
        assert_eq!(headers[header::CACHE_CONTROL], "no-cache, no-store, must-revalidate");
        assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");

        let html = String::from_utf8(body_bytes(response).await.to_vec()).unwrap();
        assert!(html.contains("<head><base href=\"https://example.com/\">"), "{html}");
        assert!(
            html.contains("href=\"http://proxy.local/api/proxy/browse?url=https%3A%2F%2Fexample.com%2Fabout\""),
            "{html}"
        );
        assert!(html.contains("MutationObserver"));

        let outbound = fetcher.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(outbound.method, Method::GET);
        assert_eq!(outbound.url.as_str(), "https://example.com/index.html");
    }

    #[tokio::test]
    async fn binary_passes_through_untouched() {
        let png = Bytes::from_static(&[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0xff]);
        let fetcher = StubFetcher::ok(200, "image/png", UpstreamBody::Bytes(png.clone()));
        let response = app(fetcher)
            .oneshot(get(&browse("https://example.com/logo.png")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        assert_eq!(response.headers()[header::CACHE_CONTROL], "public, max-age=86400");
        assert_eq!(body_bytes(response).await, png);
    }

    #[tokio::test]
    async fn ambiguous_markup_is_still_served() {
        let fetcher = StubFetcher::html(
            200,
            "<html><head></head><body><select><xmp><script>x</script></xmp></select><a href=\"/a\">a</a></body></html>",
        );
        let response = app(fetcher).oneshot(get(&browse("https://example.com/"))).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let html = String::from_utf8(body_bytes(response).await.to_vec()).unwrap();
        assert!(html.contains("url=https%3A%2F%2Fexample.com%2Fa"), "{html}");
    }

    #[tokio::test]
    async fn plain_text_is_served_unmodified() {
        let text = "see <a href=\"/x\">x</a>";
        let fetcher = StubFetcher::ok(200, "text/plain", UpstreamBody::Text(text.into()));
        let response = app(fetcher).oneshot(get(&browse("https://example.com/robots.txt"))).await.unwrap();

        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache, no-store, must-revalidate");
        assert_eq!(body_bytes(response).await, text.as_bytes());
    }

    #[tokio::test]
    async fn blocked_html_page_is_still_rendered() {
        let fetcher = StubFetcher::html(403, "<html><body><a href=\"https://example.com/help\">help</a></body></html>");
        let response = app(fetcher).oneshot(get(&browse("https://example.com/"))).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let html = String::from_utf8(body_bytes(response).await.to_vec()).unwrap();
        assert!(html.contains("url=https%3A%2F%2Fexample.com%2Fhelp"), "{html}");
    }

    #[tokio::test]
    async fn non_renderable_failure_surfaces_upstream_status() {
        let fetcher = StubFetcher::ok(404, "application/json", UpstreamBody::Bytes(Bytes::from_static(b"{}")));
        let response = app(fetcher).oneshot(get(&browse("https://example.com/missing"))).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "Failed to fetch: 404 Not Found");
    }

    #[tokio::test]
    async fn empty_html_failure_surfaces_upstream_status() {
        let fetcher = StubFetcher::html(429, "");
        let response = app(fetcher).oneshot(get(&browse("https://example.com/"))).await.unwrap();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body_json(response).await["error"], "Failed to fetch: 429 Too Many Requests");
    }

    #[tokio::test]
    async fn options_short_circuits() {
        let fetcher = StubFetcher::html(200, "<p>x</p>");
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri(browse("https://example.com/"))
            .body(Body::empty())
            .unwrap();
        let response = app(fetcher.clone()).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_METHODS],
            "GET, POST, PUT, DELETE, OPTIONS"
        );
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_HEADERS],
            "Content-Type, Authorization"
        );
        assert!(body_bytes(response).await.is_empty());
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn post_forwards_body_and_always_answers_200() {
        let fetcher = StubFetcher::ok(
            500,
            "application/json",
            UpstreamBody::Bytes(Bytes::from_static(b"{\"ok\":false}")),
        );
        let request = Request::builder()
            .method(Method::POST)
            .uri(browse("https://example.com/submit"))
            .header("host", "proxy.local")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("name=value&x=1"))
            .unwrap();
        let response = app(fetcher.clone()).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, &b"{\"ok\":false}"[..]);

        let outbound = fetcher.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(outbound.method, Method::POST);
        assert_eq!(outbound.body.as_deref(), Some(&b"name=value&x=1"[..]));
        assert_eq!(
            outbound.content_type.as_deref(),
            Some("application/x-www-form-urlencoded")
        );
    }

    #[tokio::test]
    async fn post_still_validates_target() {
        let fetcher = StubFetcher::html(200, "<p>x</p>");
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/proxy/browse")
            .body(Body::from("a=1"))
            .unwrap();
        let response = app(fetcher.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn configured_public_origin_is_used_in_links() {
        let mut config = ProxyConfig::default();
        config.rewrite.public_origin = Some("https://proxy.example.net".into());
        let fetcher = StubFetcher::html(200, "<a href=\"/a\">a</a>");
        let response = build_router(AppState::new(config, fetcher))
            .oneshot(get(&browse("https://example.com/")))
            .await
            .unwrap();

        let html = String::from_utf8(body_bytes(response).await.to_vec()).unwrap();
        assert!(
            html.contains("https://proxy.example.net/api/proxy/browse?url=https%3A%2F%2Fexample.com%2Fa"),
            "{html}"
        );
    }

    #[tokio::test]
    async fn panic_becomes_internal_error_json() {
        let response = app(Arc::new(PanickingFetcher))
            .oneshot(get(&browse("https://example.com/")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Internal server error");
        assert_eq!(body["details"], "fetcher blew up");
    }

    #[tokio::test]
    async fn request_id_is_returned() {
        let fetcher = StubFetcher::html(200, "<p>x</p>");
        let response = app(fetcher).oneshot(get(&browse("https://example.com/"))).await.unwrap();
        assert!(response.headers().contains_key(X_REQUEST_ID));
    }
}
