//! Response shaping.
//!
//! # Responsibilities
//! - Attach the permissive CORS header set to every answer
//! - Pick cache directives by content class (rewritten text vs passthrough bytes)
//! - Mirror the upstream content type
//!
//! # Design Decisions
//! - Rewritten documents are never cached; they embed per-request origins
//! - Binary passthrough is cacheable for a day

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;

pub const ALLOW_ORIGIN: &str = "*";
pub const ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
pub const ALLOW_HEADERS: &str = "Content-Type, Authorization";

pub const NO_STORE: &str = "no-cache, no-store, must-revalidate";
pub const PUBLIC_ONE_DAY: &str = "public, max-age=86400";

/// Body the proxy sends back, already rewritten if it was HTML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeBody {
    Text(String),
    Bytes(Bytes),
}

/// Result of one successful fetch, consumed immediately by [`FetchOutcome::into_response`].
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub status: StatusCode,
    pub content_type: String,
    pub body: OutcomeBody,
}

pub fn apply_cors(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static(ALLOW_ORIGIN),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
}

/// Bare 200 for CORS preflight.
pub fn preflight() -> Response {
    let mut response = StatusCode::OK.into_response();
    apply_cors(response.headers_mut());
    response
}

fn content_type_value(content_type: &str) -> HeaderValue {
    HeaderValue::from_str(content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"))
}

/// Declare UTF-8 in place of whatever charset upstream used; decoded text is re-encoded as UTF-8.
pub fn utf8_content_type(content_type: &str) -> String {
    let mut parts = content_type.split(';').map(str::trim).filter(|p| !p.is_empty());
    let mime = parts.next().unwrap_or("text/html");
    let mut out = String::from(mime);
    for param in parts.filter(|p| !p.to_ascii_lowercase().starts_with("charset=")) {
        out.push_str("; ");
        out.push_str(param);
    }
    out.push_str("; charset=utf-8");
    out
}

impl IntoResponse for FetchOutcome {
    fn into_response(self) -> Response {
        let (body, cache_control, content_type) = match self.body {
            OutcomeBody::Text(text) => (
                Body::from(text),
                NO_STORE,
                utf8_content_type(&self.content_type),
            ),
            OutcomeBody::Bytes(bytes) => (Body::from(bytes), PUBLIC_ONE_DAY, self.content_type),
        };

        let mut response = Response::new(body);
        *response.status_mut() = self.status;

        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, content_type_value(&content_type));
        apply_cors(headers);
        headers.insert(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(cache_control));
        if cache_control == NO_STORE {
            headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
            headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
        }

        response
    }
}
