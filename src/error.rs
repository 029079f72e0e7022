//! Error taxonomy for the browse endpoint.
//!
//! Every failure is converted to a JSON body at the handler boundary; nothing
//! escapes to the transport layer.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::http::response::apply_cors;
use crate::upstream::FetchError;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("URL parameter is required")]
    MissingParameter,

    #[error("Invalid URL format")]
    InvalidUrlSyntax,

    #[error("Request timeout - the website took too long to respond")]
    UpstreamTimeout,

    #[error("Failed to fetch content: {0}")]
    UpstreamTransport(String),

    /// Non-2xx upstream answer that could not be rendered.
    #[error("Failed to fetch: {} {reason}", status.as_u16())]
    UpstreamHttp { status: StatusCode, reason: String },

    #[error("Internal server error")]
    Internal { details: String },
}

pub type Result<T> = std::result::Result<T, ProxyError>;

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::MissingParameter | ProxyError::InvalidUrlSyntax => StatusCode::BAD_REQUEST,
            ProxyError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::UpstreamHttp { status, .. } => *status,
            ProxyError::UpstreamTransport(_) | ProxyError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Label used for the upstream failure counter.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::MissingParameter => "missing_parameter",
            ProxyError::InvalidUrlSyntax => "invalid_url",
            ProxyError::UpstreamTimeout => "timeout",
            ProxyError::UpstreamTransport(_) => "transport",
            ProxyError::UpstreamHttp { .. } => "http",
            ProxyError::Internal { .. } => "internal",
        }
    }

    pub fn internal(details: impl std::fmt::Display) -> Self {
        ProxyError::Internal {
            details: details.to_string(),
        }
    }
}

impl From<FetchError> for ProxyError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Timeout => ProxyError::UpstreamTimeout,
            FetchError::Transport(message) => ProxyError::UpstreamTransport(message),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            ProxyError::Internal { details } => json!({
                "error": self.to_string(),
                "details": details,
            }),
            _ => json!({ "error": self.to_string() }),
        };

        let mut response = (status, Json(body)).into_response();
        apply_cors(response.headers_mut());
        response
    }
}
