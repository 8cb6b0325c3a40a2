use std::collections::HashSet;
use std::error::Error as _;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use futures::stream::{self, StreamExt};
use reqwest::header::{ETAG, IF_NONE_MATCH};
use reqwest::{Client, StatusCode};
use url::Url;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{FeedConfig, FeedConfigData, FeedConfigForm, FeedDetails, ProxyMode};
use crate::worker::WorkerHandle;

use super::resolve::resolve_fetch_url;
use super::updated;

const RELAY_HINT: &str = "Try using a relay proxy (cors-relay)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// New content was fetched and stored.
    Updated,
    /// The server answered 304; nothing was stored.
    NotModified,
}

pub struct FeedFetcher {
    client: Client,
    relay_origin: Url,
    max_concurrent: usize,
    in_flight: Mutex<HashSet<i64>>,
}

impl FeedFetcher {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let relay_origin = Url::parse(&config.relay_origin).map_err(|e| {
            AppError::Config(format!("invalid relay_origin {:?}: {}", config.relay_origin, e))
        })?;

        Ok(Self {
            client,
            relay_origin,
            max_concurrent: config.max_concurrent_refreshes.max(1),
            in_flight: Mutex::new(HashSet::new()),
        })
    }

    /// Absolute URL for a feed, going through the relay when asked to.
    fn request_url(&self, url: &str, proxy: ProxyMode) -> Result<Url> {
        let fetch_url = resolve_fetch_url(url, proxy, None);
        let parsed = match proxy {
            ProxyMode::CorsRelay => self.relay_origin.join(&fetch_url),
            ProxyMode::None => Url::parse(&fetch_url),
        };
        parsed.map_err(|e| AppError::Validation(format!("invalid feed url {url:?}: {e}")))
    }

    /// Conditionally fetches a feed and stores the result through the worker.
    ///
    /// Returns the fetched body, or an empty string when the server reports the
    /// content as not modified. In that case nothing is written, so callers must
    /// keep the `html` they already have.
    pub async fn refresh(&self, worker: &WorkerHandle, feed: &FeedConfig) -> Result<String> {
        let (_, body) = self.refresh_feed(worker, feed).await?;
        Ok(body)
    }

    async fn refresh_feed(
        &self,
        worker: &WorkerHandle,
        feed: &FeedConfig,
    ) -> Result<(RefreshOutcome, String)> {
        let _guard = self.begin_refresh(feed.id)?;
        let url = self.request_url(&feed.url, feed.proxy)?;

        let mut request = self.client.get(url.clone());
        if !feed.etag.is_empty() {
            request = request.header(IF_NONE_MATCH, feed.etag.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| network_error(&e, feed.proxy))?;

        if response.status() == StatusCode::NOT_MODIFIED {
            tracing::debug!("Feed {} not modified", feed.id);
            return Ok((RefreshOutcome::NotModified, String::new()));
        }

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Failed to fetch feed: HTTP {}", response.status()).into());
        }

        let last_checked = Utc::now();
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let html = response.text().await?;
        let last_updated = updated::last_updated(feed, etag.as_deref(), &html, last_checked);

        worker
            .update_feed_config_data(FeedConfigData {
                id: feed.id,
                last_checked: iso_timestamp(last_checked),
                last_updated: iso_timestamp(last_updated),
                etag: etag.unwrap_or_default(),
                html: html.clone(),
            })
            .await?;

        tracing::info!("Refreshed feed {} from {}", feed.id, url);
        Ok((RefreshOutcome::Updated, html))
    }

    /// Refresh several feeds concurrently with rate limiting
    pub async fn refresh_all(
        &self,
        worker: &WorkerHandle,
        feeds: Vec<FeedConfig>,
    ) -> Vec<(i64, Result<RefreshOutcome>)> {
        stream::iter(feeds)
            .map(|feed| async move {
                let result = self
                    .refresh_feed(worker, &feed)
                    .await
                    .map(|(outcome, _)| outcome);
                if let Err(e) = &result {
                    tracing::warn!("Failed to refresh {}: {}", feed.url, e);
                }
                (feed.id, result)
            })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await
    }

    /// Fetches a feed that is about to be added and sniffs its title,
    /// description and type. Sniffed values that come back empty fall back to
    /// whatever the form already carries.
    pub async fn fetch_feed_details(&self, form: &FeedConfigForm) -> Result<FeedDetails> {
        let url = self.request_url(&form.url, form.proxy)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| network_error(&e, form.proxy))?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Failed to fetch URL: HTTP {}", response.status()).into());
        }

        let bytes = response.bytes().await?;
        let sniffed = updated::sniff_details(&bytes)?;
        tracing::debug!("Sniffed {:?} from {}", sniffed, form.url);

        Ok(FeedDetails {
            title: non_empty_or(sniffed.title, &form.title),
            description: non_empty_or(sniffed.description, &form.description),
            feed_type: sniffed.feed_type,
        })
    }

    fn begin_refresh(&self, id: i64) -> Result<InFlight<'_>> {
        let mut in_flight = self
            .in_flight
            .lock()
            .map_err(|_| anyhow::anyhow!("refresh registry poisoned"))?;
        if !in_flight.insert(id) {
            return Err(AppError::RefreshInProgress(id));
        }
        Ok(InFlight {
            registry: &self.in_flight,
            id,
        })
    }
}

/// Marks a feed as being refreshed until dropped.
struct InFlight<'a> {
    registry: &'a Mutex<HashSet<i64>>,
    id: i64,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Ok(mut in_flight) = self.registry.lock() {
            in_flight.remove(&self.id);
        }
    }
}

fn non_empty_or(value: String, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

fn iso_timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn network_error(err: &reqwest::Error, proxy: ProxyMode) -> AppError {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }

    let cross_origin = err.is_connect() || looks_cross_origin(&message);
    AppError::Network(with_relay_hint(message, cross_origin, proxy))
}

fn looks_cross_origin(message: &str) -> bool {
    message.contains("NetworkError") || message.to_ascii_lowercase().contains("cors")
}

/// Appends a hint to use the relay when the failure looks like the target
/// refused us and the feed is not already relayed.
fn with_relay_hint(mut message: String, cross_origin: bool, proxy: ProxyMode) -> String {
    if cross_origin && proxy != ProxyMode::CorsRelay {
        message.push_str(". ");
        message.push_str(RELAY_HINT);
    }
    message
}
