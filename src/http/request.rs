//! Inbound request extraction.
//!
//! # Responsibilities
//! - Pull the target URL out of the query string, with a raw-scan fallback
//! - Validate it as an absolute http(s) URL before any network I/O
//! - Work out the proxy's own origin for rewritten links

use axum::http::{header, HeaderMap, Method, Uri};
use bytes::Bytes;
use url::{form_urlencoded, Url};

use crate::error::ProxyError;
use crate::upstream::OutboundRequest;

/// Query parameter carrying the target.
pub const TARGET_PARAM: &str = "url";

const FORWARDED_PROTO: &str = "x-forwarded-proto";
const FORWARDED_HOST: &str = "x-forwarded-host";

/// One validated proxy request.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub target: Url,
    pub method: Method,
    pub body: Option<Bytes>,
    pub content_type: Option<String>,
}

impl ProxyRequest {
    pub fn get(target: Url) -> Self {
        Self {
            target,
            method: Method::GET,
            body: None,
            content_type: None,
        }
    }

    pub fn post(target: Url, body: Bytes, content_type: Option<String>) -> Self {
        Self {
            target,
            method: Method::POST,
            body: Some(body),
            content_type,
        }
    }

    pub fn outbound(&self) -> OutboundRequest {
        match &self.body {
            Some(body) if self.method == Method::POST => OutboundRequest::post(
                self.target.clone(),
                body.clone(),
                self.content_type.clone(),
            ),
            _ => OutboundRequest::get(self.target.clone()),
        }
    }
}

/// Find the raw (decoded) target value in a query string.
///
/// The `url` parameter is preferred. When it is absent, the query is scanned
/// for a `url=` token and everything after it is percent-decoded, which keeps
/// a target's own unencoded query parameters attached to it.
pub fn target_param(raw_query: Option<&str>) -> Option<String> {
    let raw = raw_query?;

    form_urlencoded::parse(raw.as_bytes())
        .find(|(key, _)| key == TARGET_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.trim().is_empty())
        .or_else(|| scan_target(raw))
}

fn scan_target(raw: &str) -> Option<String> {
    let token = format!("{}=", TARGET_PARAM);
    // ASCII lowercasing keeps byte offsets intact
    let start = raw.to_ascii_lowercase().find(&token)? + token.len();
    let value = &raw[start..];
    let decoded = urlencoding::decode(value)
        .map(|v| v.into_owned())
        .unwrap_or_else(|_| value.to_string());
    Some(decoded).filter(|v| !v.trim().is_empty())
}

/// Parse and validate a target URL.
pub fn parse_target(raw: &str) -> Result<Url, ProxyError> {
    let url = Url::parse(raw.trim()).map_err(|_| ProxyError::InvalidUrlSyntax)?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        _ => Err(ProxyError::InvalidUrlSyntax),
    }
}

/// Extract and validate the target from the request URI.
pub fn extract_target(uri: &Uri) -> Result<Url, ProxyError> {
    let raw = target_param(uri.query()).ok_or(ProxyError::MissingParameter)?;
    parse_target(&raw)
}

fn first_header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Origin of the proxy as seen by the caller, e.g. `https://proxy.example.net`.
pub fn app_origin(headers: &HeaderMap, uri: &Uri, public_origin: Option<&str>) -> String {
    if let Some(origin) = public_origin {
        return origin.trim_end_matches('/').to_string();
    }

    let scheme = first_header_value(headers, FORWARDED_PROTO)
        .or_else(|| uri.scheme_str())
        .unwrap_or("http");
    let host = first_header_value(headers, FORWARDED_HOST)
        .or_else(|| first_header_value(headers, header::HOST.as_str()))
        .or_else(|| uri.authority().map(|a| a.as_str()))
        .unwrap_or("localhost");

    format!("{}://{}", scheme, host)
}
