//! Outbound fetch subsystem.
//!
//! # Data Flow
//! ```text
//! ProxyRequest
//!     → OutboundRequest (method, target, optional body)
//!     → Fetcher (client.rs: reqwest, browser identity from identity.rs)
//!     → UpstreamResponse (status, content type, text or bytes)
//! ```
//!
//! # Design Decisions
//! - The fetch sits behind a trait so handlers can be exercised without a network
//! - Timeouts are a distinct error so they map to 504, not 500
//! - No retries; failures go straight back to the caller

pub mod client;
pub mod identity;

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use bytes::Bytes;
use thiserror::Error;
use url::Url;

pub use client::ReqwestFetcher;
pub use identity::IdentityPool;

/// Content type assumed when upstream does not send one.
pub const DEFAULT_CONTENT_TYPE: &str = "text/html";

/// How a response body is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentClass {
    /// Decoded as text and rewritten.
    Html,
    /// Decoded as text, served as-is.
    Text,
    /// Passed through byte-for-byte.
    Binary,
}

impl ContentClass {
    pub fn of(content_type: &str) -> Self {
        let content_type = content_type.to_ascii_lowercase();
        if content_type.contains("text/html") {
            ContentClass::Html
        } else if content_type.contains("text/plain") {
            ContentClass::Text
        } else {
            ContentClass::Binary
        }
    }

    pub fn is_text(self) -> bool {
        !matches!(self, ContentClass::Binary)
    }
}

/// Request sent to the target site.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub body: Option<Bytes>,
    pub content_type: Option<String>,
}

impl OutboundRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            body: None,
            content_type: None,
        }
    }

    pub fn post(url: Url, body: Bytes, content_type: Option<String>) -> Self {
        Self {
            method: Method::POST,
            url,
            body: Some(body),
            content_type,
        }
    }
}

/// Buffered upstream body, decoded according to its [`ContentClass`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamBody {
    Text(String),
    Bytes(Bytes),
}

impl UpstreamBody {
    pub fn len(&self) -> usize {
        match self {
            UpstreamBody::Text(text) => text.len(),
            UpstreamBody::Bytes(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fully buffered response from the target site.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub reason: String,
    pub content_type: String,
    pub body: UpstreamBody,
}

impl UpstreamResponse {
    pub fn class(&self) -> ContentClass {
        ContentClass::of(&self.content_type)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("upstream request timed out")]
    Timeout,

    #[error("{0}")]
    Transport(String),
}

/// Performs the outbound HTTP call.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: OutboundRequest) -> Result<UpstreamResponse, FetchError>;
}
