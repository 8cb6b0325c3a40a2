use chrono::{DateTime, Utc};
use feed_rs::model::{Feed, FeedType as ParsedFeedType};
use feed_rs::parser;

use crate::error::Result;
use crate::models::{FeedConfig, FeedDetails, FeedType};

/// One way of reading a "last updated" instant out of a parsed feed.
type Strategy = fn(&Feed) -> Option<DateTime<Utc>>;

const RSS_STRATEGIES: &[Strategy] = &[document_updated, latest_entry_published];
const ATOM_STRATEGIES: &[Strategy] = &[document_updated, latest_entry_updated];

/// Works out when a feed's content last changed.
///
/// An unchanged etag means unchanged content, so the stored value is kept.
/// Otherwise the strategies for the feed's type run in order and the first
/// valid instant wins. When nothing can be extracted we record `now`, which is
/// imprecise but never goes backwards.
pub fn last_updated(
    feed: &FeedConfig,
    response_etag: Option<&str>,
    body: &str,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    if response_etag.is_some_and(|etag| etag == feed.etag) {
        if let Ok(previous) = DateTime::parse_from_rfc3339(&feed.last_updated) {
            return previous.with_timezone(&Utc);
        }
        tracing::debug!(
            "Etag unchanged for feed {} but stored last_updated {:?} is unusable",
            feed.id,
            feed.last_updated
        );
    }

    let strategies = match feed.feed_type {
        FeedType::Rss => RSS_STRATEGIES,
        FeedType::Atom => ATOM_STRATEGIES,
        FeedType::Unknown | FeedType::Unset => return now,
    };

    let parsed = match parser::parse(body.as_bytes()) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::debug!("Could not parse feed {} for timestamps: {}", feed.id, e);
            return now;
        }
    };

    strategies
        .iter()
        .find_map(|strategy| strategy(&parsed))
        .unwrap_or(now)
}

fn valid(instant: DateTime<Utc>) -> Option<DateTime<Utc>> {
    (instant.timestamp_millis() > 0).then_some(instant)
}

// RSS <lastBuildDate>, Atom feed-level <updated>
fn document_updated(feed: &Feed) -> Option<DateTime<Utc>> {
    feed.updated.and_then(valid)
}

// RSS <item><pubDate>
fn latest_entry_published(feed: &Feed) -> Option<DateTime<Utc>> {
    feed.entries
        .iter()
        .filter_map(|entry| entry.published.and_then(valid))
        .max()
}

// Atom <entry><updated>
fn latest_entry_updated(feed: &Feed) -> Option<DateTime<Utc>> {
    feed.entries
        .iter()
        .filter_map(|entry| entry.updated.and_then(valid))
        .max()
}

/// Sniffs title, description and type from a feed document. Empty values
/// are returned as empty strings so callers can keep what the user typed.
pub fn sniff_details(body: &[u8]) -> Result<FeedDetails> {
    let feed = parser::parse(body)?;

    let feed_type = match feed.feed_type {
        ParsedFeedType::RSS0 | ParsedFeedType::RSS1 | ParsedFeedType::RSS2 => FeedType::Rss,
        ParsedFeedType::Atom => FeedType::Atom,
        _ => FeedType::Unknown,
    };

    Ok(FeedDetails {
        title: feed.title.map(|t| t.content).unwrap_or_default(),
        description: feed.description.map(|d| d.content).unwrap_or_default(),
        feed_type,
    })
}
