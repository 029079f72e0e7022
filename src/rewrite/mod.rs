//! HTML rewriting subsystem.
//!
//! # Data Flow
//! ```text
//! upstream HTML + RewriteContext
//!     → lol_html tokenizer (streams tags, untouched bytes pass through)
//!     → <head>            prepend <base href="{base}">
//!     → [href], [src]     resolve against base, route through the proxy
//!     → <form>            rewrite action, or add one for the current page
//!     → <body>            append the client link fixup (script.rs)
//!     → rewritten HTML
//! ```
//!
//! # Design Decisions
//! - Attributes are rewritten structurally per element, so quoting style,
//!   line breaks inside tags and attribute order do not matter
//! - Element type is not inspected: any `src` is treated the same
//! - A value that cannot be resolved is proxied as written
//! - Rewriting is not idempotent; proxy links are wrapped again

pub mod script;
pub mod urls;

use lol_html::html_content::{ContentType, Element};
use html_escape::decode_html_entities;
use lol_html::{element, rewrite_str, RewriteStrSettings};
use url::Url;

use self::urls::{is_proxyable, proxied_url, resolve};

pub use lol_html::errors::RewritingError;

/// Default mount point of the browse endpoint.
pub const DEFAULT_ROUTE_PATH: &str = "/api/proxy/browse";

type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Per-request values the rewriter needs. Immutable once built.
#[derive(Debug, Clone)]
pub struct RewriteContext {
    base: Url,
    app_origin: String,
    target_url: String,
    route_path: String,
}

impl RewriteContext {
    /// Build a context with an explicit resolution base.
    pub fn new(base: Url, app_origin: impl Into<String>, target_url: impl Into<String>) -> Self {
        let app_origin: String = app_origin.into();
        Self {
            base,
            app_origin: app_origin.trim_end_matches('/').to_string(),
            target_url: target_url.into(),
            route_path: DEFAULT_ROUTE_PATH.to_string(),
        }
    }

    /// Build a context for a fetched target; relative links resolve against
    /// the target's scheme and host.
    pub fn for_target(target: &Url, app_origin: impl Into<String>) -> Self {
        let mut base = target.clone();
        base.set_path("/");
        base.set_query(None);
        base.set_fragment(None);
        // credentials never belong in the injected <base>
        let _ = base.set_username("");
        let _ = base.set_password(None);
        Self::new(base, app_origin, target.as_str())
    }

    pub fn with_route_path(mut self, route_path: impl Into<String>) -> Self {
        self.route_path = route_path.into();
        self
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Base without the trailing slash, e.g. `https://example.com`.
    pub fn base_origin(&self) -> &str {
        self.base.as_str().trim_end_matches('/')
    }

    pub fn app_origin(&self) -> &str {
        &self.app_origin
    }

    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    pub fn route_path(&self) -> &str {
        &self.route_path
    }

    /// Resolve `value` against the base and wrap it in a proxy link.
    pub fn proxy(&self, value: &str) -> String {
        proxied_url(&self.app_origin, &self.route_path, &resolve(value, &self.base))
    }

    fn base_tag(&self) -> String {
        format!("<base href=\"{}/\">", self.base_origin())
    }
}

/// Attribute value as the browser sees it, character references decoded.
fn attribute_value(el: &Element<'_, '_>, name: &str) -> Option<String> {
    el.get_attribute(name)
        .map(|raw| decode_html_entities(&raw).into_owned())
}

fn rewrite_attribute(el: &mut Element<'_, '_>, name: &str, ctx: &RewriteContext) -> HandlerResult {
    if let Some(value) = attribute_value(el, name) {
        if is_proxyable(&value) {
            el.set_attribute(name, &ctx.proxy(&value))?;
        }
    }
    Ok(())
}

fn rewrite_form_action(el: &mut Element<'_, '_>, ctx: &RewriteContext) -> HandlerResult {
    match attribute_value(el, "action") {
        Some(action) if !action.trim().is_empty() => {
            if is_proxyable(&action) {
                el.set_attribute("action", &ctx.proxy(&action))?;
            }
        }
        // no action submits to the current page
        _ => {
            let action = proxied_url(&ctx.app_origin, &ctx.route_path, &ctx.target_url);
            el.set_attribute("action", &action)?;
        }
    }
    Ok(())
}

/// Rewrite an HTML document so links, resources and forms go through the proxy.
pub fn rewrite(html: &str, ctx: &RewriteContext) -> Result<String, RewritingError> {
    let base_tag = ctx.base_tag();
    let fixup_script = script::render(ctx);
    let mut base_injected = false;
    let mut script_injected = false;

    let settings = RewriteStrSettings {
        element_content_handlers: vec![
            element!("head", |el| {
                if !base_injected {
                    el.prepend(&base_tag, ContentType::Html);
                    base_injected = true;
                }
                Ok(())
            }),
            element!("[href]", |el| rewrite_attribute(el, "href", ctx)),
            element!("[src]", |el| rewrite_attribute(el, "src", ctx)),
            element!("form", |el| rewrite_form_action(el, ctx)),
            element!("body", |el| {
                if !script_injected {
                    el.append(&fixup_script, ContentType::Html);
                    script_injected = true;
                }
                Ok(())
            }),
        ],
        // ambiguous markup is rewritten best-effort instead of aborting
        strict: false,
        ..RewriteStrSettings::default()
    };

    let output = rewrite_str(html, settings);
    output
}
