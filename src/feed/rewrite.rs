use html5ever::serialize::{serialize, SerializeOpts};
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::{parse_fragment, LocalName, Namespace, ParseOpts, QualName};
use markup5ever_rcdom::{Handle, NodeData, RcDom, SerializableHandle};

use crate::error::{AppError, Result};
use crate::models::FeedConfig;

use super::resolve::resolve_fetch_url;

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// URL-bearing attributes we route through the relay, per element.
fn media_attributes(element: &str) -> &'static [&'static str] {
    match element {
        "img" | "source" => &["src"],
        "video" => &["src", "poster"],
        _ => &[],
    }
}

/// Parses a feed-derived HTML fragment as if it were the body of a document.
pub fn parse_html_fragment(html: &str) -> RcDom {
    let context = QualName::new(
        None,
        Namespace::from(HTML_NAMESPACE),
        LocalName::from("body"),
    );
    parse_fragment(RcDom::default(), ParseOpts::default(), context, Vec::new()).one(html)
}

/// Rewrites media URLs under `root` so they resolve against the feed's URL
/// and load through the feed's proxy. `srcset` is dropped from rewritten
/// elements since its candidates cannot be relayed one by one. Anchors are
/// left alone. Returns the number of attributes rewritten.
pub fn rewrite_media_urls(feed: &FeedConfig, root: &Handle) -> usize {
    let mut rewritten = 0;
    let mut stack = vec![root.clone()];

    while let Some(node) = stack.pop() {
        if let NodeData::Element { name, attrs, .. } = &node.data {
            let targets = media_attributes(&name.local);
            if !targets.is_empty() {
                let mut attrs = attrs.borrow_mut();
                for attr in attrs.iter_mut() {
                    if targets.iter().any(|target| *target == &*attr.name.local) {
                        let resolved = resolve_fetch_url(&attr.value, feed.proxy, Some(&feed.url));
                        attr.value = StrTendril::from_slice(&resolved);
                        rewritten += 1;
                    }
                }
                attrs.retain(|attr| &*attr.name.local != "srcset");
            }
        }

        stack.extend(node.children.borrow().iter().cloned());
    }

    rewritten
}

/// Parses `html`, rewrites its media URLs for `feed` and serializes it back.
pub fn rewrite_html(feed: &FeedConfig, html: &str) -> Result<String> {
    let dom = parse_html_fragment(html);
    let count = rewrite_media_urls(feed, &dom.document);
    tracing::debug!("Rewrote {} media urls for feed {}", count, feed.id);

    // Fragment content lives under the synthetic <html> root.
    let root = dom
        .document
        .children
        .borrow()
        .first()
        .cloned()
        .ok_or_else(|| AppError::Validation("html fragment has no root".to_string()))?;

    let mut out = Vec::new();
    serialize(&mut out, &SerializableHandle::from(root), SerializeOpts::default())?;
    String::from_utf8(out).map_err(|e| anyhow::anyhow!("serialized html is not utf-8: {e}").into())
}
