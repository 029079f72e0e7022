//! Building browse links from user input.
//!
//! Used by `proxy-cli` to turn what an operator types into the link a browser
//! would open.

use url::Url;

use crate::error::ProxyError;
use crate::http::request::parse_target;
use crate::rewrite::urls::proxied_url;

/// Add `https://` when `raw` has no http(s) scheme, then validate it.
pub fn normalize_target(raw: &str) -> Result<Url, ProxyError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ProxyError::MissingParameter);
    }

    let lower = raw.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        parse_target(raw)
    } else {
        parse_target(&format!("https://{}", raw))
    }
}

/// `<proxy_origin><route_path>?url=<encoded target>`.
pub fn proxied_link(proxy_origin: &str, route_path: &str, target: &Url) -> String {
    proxied_url(proxy_origin, route_path, target.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::DEFAULT_ROUTE_PATH;

    #[test]
    fn adds_missing_scheme() {
        assert_eq!(
            normalize_target("example.com/docs").unwrap().as_str(),
            "https://example.com/docs"
        );
        assert_eq!(
            normalize_target("  HTTP://example.com ").unwrap().as_str(),
            "http://example.com/"
        );
    }

    #[test]
    fn rejects_empty_and_garbage() {
        assert!(matches!(normalize_target("   "), Err(ProxyError::MissingParameter)));
        assert!(matches!(
            normalize_target("not a url"),
            Err(ProxyError::InvalidUrlSyntax)
        ));
    }

    #[test]
    fn builds_encoded_link() {
        let target = normalize_target("example.com/search?q=a b").unwrap();
        assert_eq!(
            proxied_link("http://localhost:8080/", DEFAULT_ROUTE_PATH, &target),
            "http://localhost:8080/api/proxy/browse?url=https%3A%2F%2Fexample.com%2Fsearch%3Fq%3Da%2520b"
        );
    }
}
