//! reqwest-backed [`Fetcher`].

use std::time::Duration;

use async_trait::async_trait;
use axum::http::{Extensions, StatusCode};
use hyper::ext::ReasonPhrase;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::redirect::Policy;

use crate::config::UpstreamConfig;
use crate::upstream::{
    ContentClass, FetchError, Fetcher, IdentityPool, OutboundRequest, UpstreamBody,
    UpstreamResponse, DEFAULT_CONTENT_TYPE,
};

/// Production fetcher. Follows redirects and decodes compressed bodies.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
    identities: IdentityPool,
}

impl ReqwestFetcher {
    pub fn new(config: &UpstreamConfig) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder();
        if !config.use_system_proxy {
            builder = builder.no_proxy();
        }
        let client = builder
            .redirect(Policy::limited(config.max_redirects))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            identities: IdentityPool::new(config.user_agents.as_slice()),
        })
    }
}

/// Status text as sent by upstream. hyper only records it when it differs from the canonical one.
fn reason_phrase(status: StatusCode, extensions: &Extensions) -> String {
    extensions
        .get::<ReasonPhrase>()
        .map(|reason| String::from_utf8_lossy(reason.as_bytes()).into_owned())
        .or_else(|| status.canonical_reason().map(str::to_string))
        .unwrap_or_default()
}

fn map_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Transport(err.to_string())
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, request: OutboundRequest) -> Result<UpstreamResponse, FetchError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(self.identities.navigation_headers());

        if let Some(content_type) = request
            .content_type
            .as_deref()
            .and_then(|ct| HeaderValue::from_str(ct).ok())
        {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(map_error)?;

        let status = response.status();
        let reason = reason_phrase(status, response.extensions());
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        tracing::debug!(
            method = %request.method,
            url = %request.url,
            final_url = %response.url(),
            status = %status,
            content_type = %content_type,
            "Upstream responded"
        );

        let body = if ContentClass::of(&content_type).is_text() {
            UpstreamBody::Text(response.text().await.map_err(map_error)?)
        } else {
            UpstreamBody::Bytes(response.bytes().await.map_err(map_error)?)
        };

        Ok(UpstreamResponse {
            status,
            reason,
            content_type,
            body,
        })
    }
}
