use std::sync::OnceLock;

use regex::Regex;
use url::Url;

use crate::models::ProxyMode;

/// Same-origin path of the relay that fetches cross-origin pages for us.
pub const RELAY_PATH: &str = "/cors-buster";

fn absolute_re() -> &'static Regex {
    static ABSOLUTE_RE: OnceLock<Regex> = OnceLock::new();
    ABSOLUTE_RE.get_or_init(|| {
        Regex::new(r"(?i)^([a-z][a-z0-9+.\-]*:)?//").expect("valid absolute url regex")
    })
}

/// True for `scheme://...` and protocol-relative `//...` URLs.
pub fn is_absolute(url: &str) -> bool {
    absolute_re().is_match(url)
}

/// Computes the URL to actually fetch for `url`. Relative URLs are resolved
/// against the origin of `base` when one is given; `cors-relay` then wraps the
/// result in a relay request path.
pub fn resolve_fetch_url(url: &str, proxy: ProxyMode, base: Option<&str>) -> String {
    let resolved = match base {
        Some(base) if !is_absolute(url) => match origin_of(base) {
            Some(origin) => {
                let rewritten = if url.starts_with('/') {
                    format!("{origin}{url}")
                } else {
                    format!("{origin}/{url}")
                };
                tracing::debug!("Rewrote {} to {}", url, rewritten);
                rewritten
            }
            None => {
                tracing::debug!("Base {} has no origin, leaving {} as is", base, url);
                url.to_string()
            }
        },
        _ => url.to_string(),
    };

    match proxy {
        ProxyMode::CorsRelay => relay_url(&resolved),
        ProxyMode::None => resolved,
    }
}

fn relay_url(target: &str) -> String {
    format!("{RELAY_PATH}?page={}", urlencoding::encode(target))
}

fn origin_of(base: &str) -> Option<String> {
    let origin = Url::parse(base).ok()?.origin();
    origin
        .is_tuple()
        .then(|| origin.ascii_serialization())
}
