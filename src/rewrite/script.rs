//! Client-side link fixup injected before `</body>`.
//!
//! Mirrors the anchor pass of the server rewriter for links added after load.
//! Only `a[href]` is handled; `src` and `action` set by page scripts are not.
//! GET form submissions are intercepted and re-routed with their fields
//! folded into the target's query.

use super::RewriteContext;

const TEMPLATE: &str = r#"<script>
(function() {
  var FALLBACK_TARGET = '__TARGET_URL__';
  var FALLBACK_BASE = '__BASE_URL__';
  var FALLBACK_ORIGIN = '__APP_ORIGIN__';
  var PROXY_PATH = '__ROUTE_PATH__';
  var SKIP = ['javascript:', 'mailto:', 'tel:', 'sms:', 'about:', 'data:'];

  var params = new URLSearchParams(window.location.search);
  var targetUrl = params.get('url') || FALLBACK_TARGET;
  var baseUrl = FALLBACK_BASE;
  try { baseUrl = new URL(targetUrl).origin; } catch (e) {}
  var appOrigin = window.location.origin || FALLBACK_ORIGIN;
  var proxyPrefix = appOrigin + PROXY_PATH + '?url=';

  function isProxyable(url) {
    if (!url) return false;
    var value = url.trim();
    if (!value || value.charAt(0) === '#') return false;
    var lower = value.toLowerCase();
    for (var i = 0; i < SKIP.length; i++) {
      if (lower.indexOf(SKIP[i]) === 0) return false;
    }
    return true;
  }

  function resolve(url) {
    try { return new URL(url, baseUrl + '/').href; } catch (e) { return url; }
  }

  function fixLinks() {
    var anchors = document.querySelectorAll('a[href]');
    for (var i = 0; i < anchors.length; i++) {
      var href = anchors[i].getAttribute('href');
      if (!isProxyable(href) || href.indexOf(proxyPrefix) === 0) continue;
      anchors[i].setAttribute('href', proxyPrefix + encodeURIComponent(resolve(href)));
    }
  }

  function formTarget(form) {
    var action = form.getAttribute('action') || '';
    var marker = PROXY_PATH + '?url=';
    var at = action.indexOf(marker);
    if (at !== -1) {
      try { return decodeURIComponent(action.slice(at + marker.length)); } catch (e) { return targetUrl; }
    }
    if (!action.trim()) return targetUrl;
    return isProxyable(action) ? resolve(action) : null;
  }

  // GET submissions replace the action's query, which would drop the url parameter
  document.addEventListener('submit', function(e) {
    var form = e.target;
    if (!form || form.tagName !== 'FORM') return;
    if ((form.getAttribute('method') || 'get').toLowerCase() !== 'get') return;
    var target = formTarget(form);
    if (!target) return;
    var actionUrl;
    try { actionUrl = new URL(target); } catch (err) { return; }
    e.preventDefault();
    actionUrl.search = new URLSearchParams(new FormData(form)).toString();
    window.location.href = proxyPrefix + encodeURIComponent(actionUrl.href);
  }, true);

  fixLinks();
  if (window.MutationObserver && document.body) {
    new MutationObserver(fixLinks).observe(document.body, { childList: true, subtree: true });
  }
})();
</script>"#;

/// Escape a value for a single-quoted JavaScript string inside `<script>`.
pub fn escape_js_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            // keeps "</script>" in a value from closing the element
            '<' => out.push_str("\\x3c"),
            _ => out.push(c),
        }
    }
    out
}

/// Render the fixup script with the request's values baked in.
pub fn render(ctx: &RewriteContext) -> String {
    TEMPLATE
        .replace("__TARGET_URL__", &escape_js_literal(ctx.target_url()))
        .replace("__BASE_URL__", &escape_js_literal(ctx.base_origin()))
        .replace("__APP_ORIGIN__", &escape_js_literal(ctx.app_origin()))
        .replace("__ROUTE_PATH__", &escape_js_literal(ctx.route_path()))
}
