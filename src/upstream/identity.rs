//! Browser identity presented to upstream sites.
//!
//! The pool is fixed at startup; selection is a stateless random pick per
//! request, so no synchronization is needed.

use rand::seq::SliceRandom;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL,
    UPGRADE_INSECURE_REQUESTS, USER_AGENT,
};

/// Built-in desktop browser identities.
pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:120.0) Gecko/20100101 Firefox/120.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

const ACCEPT_DOCUMENT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

/// Immutable list of user agents to rotate through.
#[derive(Debug, Clone)]
pub struct IdentityPool {
    user_agents: Vec<HeaderValue>,
}

impl IdentityPool {
    /// Build a pool from configured strings. Values that are not valid header
    /// values are dropped; an empty result falls back to the built-in pool.
    pub fn new<S: AsRef<str>>(user_agents: &[S]) -> Self {
        let mut valid: Vec<HeaderValue> = user_agents
            .iter()
            .map(|ua| ua.as_ref().trim())
            .filter(|ua| !ua.is_empty())
            .filter_map(|ua| match HeaderValue::from_str(ua) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(user_agent = %ua, "Ignoring user agent that is not a valid header value");
                    None
                }
            })
            .collect();

        if valid.is_empty() {
            valid = DEFAULT_USER_AGENTS
                .iter()
                .copied()
                .map(HeaderValue::from_static)
                .collect();
        }

        Self { user_agents: valid }
    }

    pub fn len(&self) -> usize {
        self.user_agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.user_agents.is_empty()
    }

    /// Pick a user agent uniformly at random.
    pub fn pick(&self) -> HeaderValue {
        self.user_agents
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_USER_AGENTS[0]))
    }

    /// Header set of an ordinary top-level browser navigation.
    pub fn navigation_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, self.pick());
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_DOCUMENT));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
        headers.insert(HeaderName::from_static("sec-fetch-dest"), HeaderValue::from_static("document"));
        headers.insert(HeaderName::from_static("sec-fetch-mode"), HeaderValue::from_static("navigate"));
        headers.insert(HeaderName::from_static("sec-fetch-site"), HeaderValue::from_static("none"));
        headers.insert(HeaderName::from_static("sec-fetch-user"), HeaderValue::from_static("?1"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
        headers
    }
}

impl Default for IdentityPool {
    fn default() -> Self {
        Self::new(DEFAULT_USER_AGENTS)
    }
}
