//! URL helpers shared by every rewrite pass.

use url::Url;

/// Schemes the browser cannot fetch through the proxy.
pub const NON_FETCHABLE_SCHEMES: &[&str] =
    &["javascript:", "mailto:", "tel:", "sms:", "about:", "data:"];

/// Returns true when `value` should be routed through the proxy.
///
/// Empty values, in-page fragments and non-fetchable schemes are left alone.
pub fn is_proxyable(value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() || value.starts_with('#') {
        return false;
    }
    let lower = value.to_ascii_lowercase();
    !NON_FETCHABLE_SCHEMES
        .iter()
        .any(|scheme| lower.starts_with(scheme))
}

/// Resolve `value` against `base`. Unresolvable values come back unchanged.
pub fn resolve(value: &str, base: &Url) -> String {
    match base.join(value) {
        Ok(url) => url.into(),
        Err(e) => {
            tracing::trace!(value = %value, error = %e, "Leaving unresolvable URL as-is");
            value.to_string()
        }
    }
}

/// Build the proxy link for an absolute target.
pub fn proxied_url(app_origin: &str, route_path: &str, target: &str) -> String {
    format!(
        "{}{}?url={}",
        app_origin.trim_end_matches('/'),
        route_path,
        urlencoding::encode(target)
    )
}
