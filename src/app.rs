use chrono::Utc;
use tokio::io::{self, BufReader};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::feed::{interval, rewrite, FeedFetcher, RefreshOutcome};
use crate::models::{FeedConfig, FeedConfigForm, ProxyMode};
use crate::worker::{serve_lines, WorkerHandle};

const DEFAULT_SCAN_INTERVAL: &str = "1h";

pub struct App {
    worker: WorkerHandle,
    fetcher: FeedFetcher,
}

impl App {
    pub async fn new(config: &Config) -> Result<Self> {
        let worker = WorkerHandle::open(&config.db_path, config.allow_dev_ops).await?;
        let fetcher = FeedFetcher::new(config)?;

        let applied = worker.upgrade().await?;
        if !applied.is_empty() {
            tracing::info!("Applied migrations: {}", applied.join(", "));
        }

        Ok(Self { worker, fetcher })
    }

    /// Refreshes every feed whose scan interval has elapsed. Returns how many
    /// feeds were fetched successfully, including not-modified ones.
    pub async fn refresh_due_feeds(&self) -> Result<usize> {
        let now = Utc::now();
        let due: Vec<FeedConfig> = self
            .worker
            .list_feed_configs()
            .await?
            .into_iter()
            .filter(|feed| match interval::is_due(feed, now) {
                Ok(due) => due,
                Err(e) => {
                    tracing::warn!("Skipping feed {}: {}", feed.id, e);
                    false
                }
            })
            .collect();

        if due.is_empty() {
            tracing::debug!("No feeds due for refresh");
            return Ok(0);
        }

        let results = self.fetcher.refresh_all(&self.worker, due).await;
        let refreshed = results
            .iter()
            .filter(|(_, result)| result.is_ok())
            .count();
        let not_modified = results
            .iter()
            .filter(|(_, result)| matches!(result, Ok(RefreshOutcome::NotModified)))
            .count();
        tracing::info!(
            "Refreshed {} of {} due feeds ({} not modified)",
            refreshed,
            results.len(),
            not_modified
        );

        Ok(refreshed)
    }

    /// Sniffs a feed's details and stores a new configuration for it.
    pub async fn add_feed(&self, url: &str, proxy: ProxyMode) -> Result<FeedConfig> {
        let mut form = FeedConfigForm {
            url: url.to_string(),
            proxy,
            scan_interval: DEFAULT_SCAN_INTERVAL.to_string(),
            ..Default::default()
        };

        let details = self.fetcher.fetch_feed_details(&form).await?;
        form.title = details.title;
        form.description = details.description;
        form.feed_type = details.feed_type;

        self.worker
            .insert_feed_config(form)
            .await?
            .into_iter()
            .max_by_key(|feed| feed.id)
            .ok_or_else(|| AppError::Worker("insert returned no feed configs".to_string()))
    }

    /// Rewrites media URLs in an entry's HTML so it renders with the
    /// stored feed's origin and proxy settings.
    pub async fn rewrite_entry_html(&self, feed_config_id: i64, html: &str) -> Result<String> {
        let feed = self.worker.get_feed_config_full(feed_config_id).await?.config;
        rewrite::rewrite_html(&feed, html)
    }

    /// Serves the worker protocol over stdin and stdout until stdin closes.
    pub async fn serve_stdio(&self) -> Result<()> {
        let reader = BufReader::new(io::stdin());
        serve_lines(&self.worker, reader, io::stdout()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeedConfigData, FeedType};
    use chrono::{Duration, SecondsFormat};
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RSS_BODY: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
<title>Sniffed</title><link>https://example.com/</link><description>From the feed</description>
<item><title>One</title><guid>one</guid><pubDate>Tue, 01 Oct 2024 09:00:00 GMT</pubDate></item>
</channel></rss>"#;

    fn config(dir: &TempDir) -> Config {
        Config {
            db_path: dir.path().join("feeds.db").to_string_lossy().to_string(),
            relay_origin: "http://relay.invalid".to_string(),
            request_timeout_secs: 5,
            max_concurrent_refreshes: 2,
            allow_dev_ops: false,
        }
    }

    #[tokio::test]
    async fn add_feed_sniffs_and_stores() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rss"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RSS_BODY))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let app = App::new(&config(&dir)).await.unwrap();

        let feed = app
            .add_feed(&format!("{}/rss", server.uri()), ProxyMode::None)
            .await
            .unwrap();
        assert_eq!(feed.title, "Sniffed");
        assert_eq!(feed.description, "From the feed");
        assert_eq!(feed.feed_type, FeedType::Rss);
        assert_eq!(feed.scan_interval, DEFAULT_SCAN_INTERVAL);
        assert!(feed.last_checked.is_empty());
    }

    #[tokio::test]
    async fn refreshes_only_due_feeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/due"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RSS_BODY))
            // once to sniff on add, once to refresh
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RSS_BODY))
            .expect(0)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let app = App::new(&config(&dir)).await.unwrap();

        let due = app
            .add_feed(&format!("{}/due", server.uri()), ProxyMode::None)
            .await
            .unwrap();
        let fresh = FeedConfigForm {
            url: format!("{}/fresh", server.uri()),
            feed_type: FeedType::Rss,
            scan_interval: "1d".to_string(),
            ..Default::default()
        };
        let fresh = app
            .worker
            .insert_feed_config(fresh)
            .await
            .unwrap()
            .into_iter()
            .max_by_key(|feed| feed.id)
            .unwrap();
        let recently = (Utc::now() - Duration::minutes(5)).to_rfc3339_opts(SecondsFormat::Millis, true);
        app.worker
            .update_feed_config_data(FeedConfigData {
                id: fresh.id,
                last_checked: recently.clone(),
                last_updated: recently,
                etag: String::new(),
                html: String::new(),
            })
            .await
            .unwrap();

        assert_eq!(app.refresh_due_feeds().await.unwrap(), 1);

        let stored = app.worker.get_feed_config_full(due.id).await.unwrap();
        assert_eq!(stored.html, RSS_BODY);
        assert_eq!(stored.config.last_updated, "2024-10-01T09:00:00.000Z");

        // Just refreshed, so nothing is due on the second pass.
        assert_eq!(app.refresh_due_feeds().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn rewrites_entry_html_for_stored_feed() {
        let dir = TempDir::new().unwrap();
        let app = App::new(&config(&dir)).await.unwrap();
        let feed = app
            .worker
            .insert_feed_config(FeedConfigForm {
                url: "https://blog.example.com/feed.xml".to_string(),
                proxy: ProxyMode::CorsRelay,
                scan_interval: "1h".to_string(),
                ..Default::default()
            })
            .await
            .unwrap()
            .remove(0);

        let html = app
            .rewrite_entry_html(feed.id, r#"<img src="/a.png" srcset="a 2x"><a href="/x">x</a>"#)
            .await
            .unwrap();
        assert_eq!(
            html,
            r#"<img src="/cors-buster?page=https%3A%2F%2Fblog.example.com%2Fa.png"><a href="/x">x</a>"#
        );

        assert!(app.rewrite_entry_html(feed.id + 1, "<p></p>").await.is_err());
    }

    #[tokio::test]
    async fn invalid_intervals_are_skipped() {
        let dir = TempDir::new().unwrap();
        let app = App::new(&config(&dir)).await.unwrap();
        app.worker
            .insert_feed_config(FeedConfigForm {
                url: "http://127.0.0.1:9/never".to_string(),
                scan_interval: "sometimes".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(app.refresh_due_feeds().await.unwrap(), 0);
    }
}
