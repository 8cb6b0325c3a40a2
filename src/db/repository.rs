use std::collections::HashSet;
use std::path::Path;

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::{AppError, Result};
use crate::models::{
    FeedConfig, FeedConfigData, FeedConfigForm, FeedConfigFull, FeedEntryMetadata, FeedType,
    OpenEntrySetting, ProxyMode,
};

use super::migrations::{self, Migration};

const FEED_CONFIG_COLUMNS: &str = "id, feed_type, url, proxy, title, description, scan_interval, \
     open_entry_setting, last_updated, last_checked, etag";

/// Typed access to the feed store. The connection lives on its own thread
/// and every call is serialized through it.
pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Ok(Self { conn })
    }

    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Ok(Self { conn })
    }

    pub async fn migrate(&self, migrations: &'static [Migration]) -> Result<Vec<&'static str>> {
        let applied = self
            .conn
            .call(move |conn| Ok(migrations::migrate(conn, migrations)?))
            .await?;
        Ok(applied)
    }

    // Feed config operations

    pub async fn list_feed_configs(&self) -> Result<Vec<FeedConfig>> {
        let feeds = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {FEED_CONFIG_COLUMNS} FROM feed_configs ORDER BY id"
                ))?;
                let feeds = stmt
                    .query_map([], feed_config_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(feeds)
            })
            .await?;
        Ok(feeds)
    }

    pub async fn get_feed_config_full(&self, id: i64) -> Result<Option<FeedConfigFull>> {
        let feed = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {FEED_CONFIG_COLUMNS}, html FROM feed_configs WHERE id = ?1"
                ))?;
                let feed = stmt
                    .query_row(params![id], |row| {
                        Ok(FeedConfigFull {
                            config: feed_config_from_row(row)?,
                            html: text(row, 11)?,
                        })
                    })
                    .optional()?;
                Ok(feed)
            })
            .await?;
        Ok(feed)
    }

    pub async fn insert_feed_config(&self, form: FeedConfigForm) -> Result<i64> {
        let id = self
            .conn
            .call(move |conn| {
                let id = conn.query_row(
                    r#"INSERT INTO feed_configs (
                           feed_type, url, proxy, title, description, scan_interval,
                           open_entry_setting, last_updated, last_checked, etag, html
                       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                       RETURNING id"#,
                    params![
                        form.feed_type,
                        form.url,
                        form.proxy,
                        form.title,
                        form.description,
                        form.scan_interval,
                        form.open_entry_setting,
                        "",
                        "",
                        "",
                        "",
                    ],
                    |row| row.get(0),
                )?;
                Ok(id)
            })
            .await?;
        tracing::debug!("Inserted feed config {}", id);
        Ok(id)
    }

    /// Updates the editable fields of a feed config and returns the stored
    /// title, or `None` when no row has that id.
    pub async fn update_feed_config(&self, form: FeedConfigForm) -> Result<Option<String>> {
        let id = form
            .id
            .ok_or_else(|| AppError::Validation("feed config update requires an id".to_string()))?;

        let title = self
            .conn
            .call(move |conn| {
                let title = conn
                    .query_row(
                        r#"UPDATE feed_configs SET
                               feed_type = ?1,
                               url = ?2,
                               proxy = ?3,
                               title = ?4,
                               description = ?5,
                               scan_interval = ?6,
                               open_entry_setting = ?7
                           WHERE id = ?8
                           RETURNING title"#,
                        params![
                            form.feed_type,
                            form.url,
                            form.proxy,
                            form.title,
                            form.description,
                            form.scan_interval,
                            form.open_entry_setting,
                            id,
                        ],
                        |row| row.get::<_, Option<String>>(0),
                    )
                    .optional()?;
                Ok(title.map(Option::unwrap_or_default))
            })
            .await?;
        Ok(title)
    }

    /// Deletes a feed config together with its entry metadata.
    pub async fn delete_feed_config(&self, id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "DELETE FROM feed_entry_metadata WHERE feed_config_id = ?1",
                    params![id],
                )?;
                let deleted = tx.execute("DELETE FROM feed_configs WHERE id = ?1", params![id])?;
                tx.commit()?;
                Ok(deleted > 0)
            })
            .await?;
        Ok(deleted)
    }

    /// Stores the result of a refresh. The four fields are written as one unit.
    pub async fn update_feed_config_data(&self, data: FeedConfigData) -> Result<bool> {
        let updated = self
            .conn
            .call(move |conn| {
                let updated = conn.execute(
                    r#"UPDATE feed_configs SET
                           last_updated = ?1,
                           last_checked = ?2,
                           etag = ?3,
                           html = ?4
                       WHERE id = ?5"#,
                    params![data.last_updated, data.last_checked, data.etag, data.html, data.id],
                )?;
                Ok(updated > 0)
            })
            .await?;
        Ok(updated)
    }

    // Entry metadata operations

    pub async fn list_feed_entries_metadata(
        &self,
        feed_config_id: i64,
    ) -> Result<Vec<FeedEntryMetadata>> {
        let entries = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT entry_id, is_marked_read FROM feed_entry_metadata
                       WHERE feed_config_id = ?1
                       ORDER BY entry_id"#,
                )?;
                let entries = stmt
                    .query_map(params![feed_config_id], |row| {
                        Ok(FeedEntryMetadata {
                            entry_id: row.get(0)?,
                            is_marked_read: row.get(1)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(entries)
            })
            .await?;
        Ok(entries)
    }

    pub async fn upsert_feed_entry_metadata(
        &self,
        feed_config_id: i64,
        entry: FeedEntryMetadata,
    ) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO feed_entry_metadata (feed_config_id, entry_id, is_marked_read)
                       VALUES (?1, ?2, ?3)
                       ON CONFLICT(feed_config_id, entry_id) DO UPDATE SET
                           is_marked_read = excluded.is_marked_read"#,
                    params![feed_config_id, entry.entry_id, entry.is_marked_read],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Marks every given entry as read with one prepared statement inside a
    /// single transaction. Repeated ids are written once; returns the number
    /// of distinct entries written.
    pub async fn bulk_mark_entries_read(
        &self,
        feed_config_id: i64,
        entry_ids: Vec<String>,
    ) -> Result<usize> {
        let written = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut written = 0;
                {
                    let mut stmt = tx.prepare(
                        r#"INSERT INTO feed_entry_metadata (feed_config_id, entry_id, is_marked_read)
                           VALUES (?1, ?2, 1)
                           ON CONFLICT(feed_config_id, entry_id) DO UPDATE SET
                               is_marked_read = 1"#,
                    )?;
                    let mut seen = HashSet::with_capacity(entry_ids.len());
                    for entry_id in &entry_ids {
                        if seen.insert(entry_id.as_str()) {
                            written += stmt.execute(params![feed_config_id, entry_id])?;
                        }
                    }
                }
                tx.commit()?;
                Ok(written)
            })
            .await?;
        Ok(written)
    }

    // Development helpers

    pub async fn insert_demo_feed(&self) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        let id = self
            .conn
            .call(move |conn| {
                let id = conn.query_row(
                    r#"INSERT INTO feed_configs (
                           feed_type, url, proxy, title, description, scan_interval,
                           open_entry_setting, last_updated, last_checked, etag, html
                       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                       RETURNING id"#,
                    params![
                        FeedType::Rss,
                        "https://example.com/rss",
                        ProxyMode::None,
                        "Example RSS Feed",
                        "An example RSS feed",
                        "1h",
                        OpenEntrySetting::InApp,
                        now,
                        now,
                        "12345",
                        "",
                    ],
                    |row| row.get(0),
                )?;
                Ok(id)
            })
            .await?;
        Ok(id)
    }

    /// Drops every table in the store, migration records included.
    pub async fn nuke(&self) -> Result<Vec<String>> {
        let dropped = self
            .conn
            .call(|conn| {
                let names = {
                    let mut stmt = conn.prepare(
                        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
                    )?;
                    let names = stmt
                        .query_map([], |row| row.get::<_, String>(0))?
                        .collect::<std::result::Result<Vec<_>, _>>()?;
                    names
                };
                for name in &names {
                    // Identifiers cannot be bound; these come from the catalog.
                    conn.execute_batch(&format!("DROP TABLE \"{}\"", name.replace('"', "\"\"")))?;
                }
                Ok(names)
            })
            .await?;
        tracing::warn!("Dropped tables: {:?}", dropped);
        Ok(dropped)
    }
}

fn text(row: &Row, idx: usize) -> rusqlite::Result<String> {
    Ok(row.get::<_, Option<String>>(idx)?.unwrap_or_default())
}

fn feed_config_from_row(row: &Row) -> rusqlite::Result<FeedConfig> {
    Ok(FeedConfig {
        id: row.get(0)?,
        feed_type: row.get(1)?,
        url: text(row, 2)?,
        proxy: row.get(3)?,
        title: text(row, 4)?,
        description: text(row, 5)?,
        scan_interval: text(row, 6)?,
        open_entry_setting: row.get(7)?,
        last_updated: text(row, 8)?,
        last_checked: text(row, 9)?,
        etag: text(row, 10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::MIGRATIONS;
    use tokio_test::assert_ok;

    async fn repository() -> Repository {
        let repo = Repository::open_in_memory().await.unwrap();
        repo.migrate(MIGRATIONS).await.unwrap();
        repo
    }

    fn form(url: &str) -> FeedConfigForm {
        FeedConfigForm {
            feed_type: FeedType::Rss,
            url: url.to_string(),
            title: "A feed".to_string(),
            scan_interval: "1h".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn inserted_config_starts_with_empty_refresh_fields() {
        let repo = repository().await;
        let id = repo.insert_feed_config(form("https://example.com/rss")).await.unwrap();

        let full = repo.get_feed_config_full(id).await.unwrap().unwrap();
        assert_eq!(full.config.id, id);
        assert_eq!(full.config.url, "https://example.com/rss");
        assert_eq!(full.config.open_entry_setting, OpenEntrySetting::InApp);
        assert!(full.config.last_checked.is_empty());
        assert!(full.config.last_updated.is_empty());
        assert!(full.config.etag.is_empty());
        assert!(full.html.is_empty());
    }

    #[tokio::test]
    async fn update_returns_title_or_none() {
        let repo = repository().await;
        let id = repo.insert_feed_config(form("https://example.com/rss")).await.unwrap();

        let mut edit = form("https://example.com/feed.xml");
        edit.id = Some(id);
        edit.title = "Renamed".to_string();
        edit.proxy = ProxyMode::CorsRelay;
        edit.open_entry_setting = OpenEntrySetting::NewTab;
        let title = repo.update_feed_config(edit.clone()).await.unwrap();
        assert_eq!(title.as_deref(), Some("Renamed"));

        let feeds = repo.list_feed_configs().await.unwrap();
        assert_eq!(feeds[0].url, "https://example.com/feed.xml");
        assert_eq!(feeds[0].proxy, ProxyMode::CorsRelay);
        assert_eq!(feeds[0].open_entry_setting, OpenEntrySetting::NewTab);

        edit.id = Some(id + 100);
        assert_eq!(repo.update_feed_config(edit).await.unwrap(), None);
    }

    #[tokio::test]
    async fn update_without_id_is_rejected() {
        let repo = repository().await;
        let result = repo.update_feed_config(form("https://example.com/rss")).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn refresh_data_is_written_as_a_unit() {
        let repo = repository().await;
        let id = repo.insert_feed_config(form("https://example.com/rss")).await.unwrap();

        let updated = repo
            .update_feed_config_data(FeedConfigData {
                id,
                last_checked: "2024-10-02T10:05:00.000Z".to_string(),
                last_updated: "2024-10-02T10:00:00.000Z".to_string(),
                etag: "\"abc\"".to_string(),
                html: "<rss/>".to_string(),
            })
            .await
            .unwrap();
        assert!(updated);

        let full = repo.get_feed_config_full(id).await.unwrap().unwrap();
        assert_eq!(full.config.etag, "\"abc\"");
        assert_eq!(full.config.last_updated, "2024-10-02T10:00:00.000Z");
        assert_eq!(full.config.last_checked, "2024-10-02T10:05:00.000Z");
        assert_eq!(full.html, "<rss/>");
        assert_eq!(full.config.title, "A feed");
    }

    #[tokio::test]
    async fn upsert_keeps_one_row_with_last_value() {
        let repo = repository().await;
        let id = repo.insert_feed_config(form("https://example.com/rss")).await.unwrap();

        for is_marked_read in [true, false] {
            assert_ok!(
                repo.upsert_feed_entry_metadata(
                    id,
                    FeedEntryMetadata {
                        entry_id: "guid-1".to_string(),
                        is_marked_read,
                    },
                )
                .await
            );
        }

        let entries = repo.list_feed_entries_metadata(id).await.unwrap();
        assert_eq!(
            entries,
            vec![FeedEntryMetadata {
                entry_id: "guid-1".to_string(),
                is_marked_read: false,
            }]
        );
    }

    #[tokio::test]
    async fn bulk_mark_read_covers_every_entry_once() {
        let repo = repository().await;
        let id = repo.insert_feed_config(form("https://example.com/rss")).await.unwrap();
        repo.upsert_feed_entry_metadata(
            id,
            FeedEntryMetadata {
                entry_id: "entry-0007".to_string(),
                is_marked_read: false,
            },
        )
        .await
        .unwrap();

        let ids: Vec<String> = (0..500).map(|i| format!("entry-{i:04}")).collect();
        let written = repo.bulk_mark_entries_read(id, ids).await.unwrap();
        assert_eq!(written, 500);

        let entries = repo.list_feed_entries_metadata(id).await.unwrap();
        assert_eq!(entries.len(), 500);
        assert!(entries.iter().all(|e| e.is_marked_read));
    }

    #[tokio::test]
    async fn bulk_mark_read_counts_repeated_ids_once() {
        let repo = repository().await;
        let id = repo.insert_feed_config(form("https://example.com/rss")).await.unwrap();

        let ids = vec!["a".to_string(), "b".to_string(), "a".to_string(), "a".to_string()];
        let written = assert_ok!(repo.bulk_mark_entries_read(id, ids).await);
        assert_eq!(written, 2);

        let entries = repo.list_feed_entries_metadata(id).await.unwrap();
        let entry_ids: Vec<&str> = entries.iter().map(|e| e.entry_id.as_str()).collect();
        assert_eq!(entry_ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn delete_removes_entry_metadata() {
        let repo = repository().await;
        let keep = repo.insert_feed_config(form("https://example.com/a")).await.unwrap();
        let gone = repo.insert_feed_config(form("https://example.com/b")).await.unwrap();
        repo.bulk_mark_entries_read(keep, vec!["x".to_string()]).await.unwrap();
        repo.bulk_mark_entries_read(gone, vec!["y".to_string()]).await.unwrap();

        assert!(repo.delete_feed_config(gone).await.unwrap());
        assert!(!repo.delete_feed_config(gone).await.unwrap());

        assert!(repo.list_feed_entries_metadata(gone).await.unwrap().is_empty());
        assert_eq!(repo.list_feed_entries_metadata(keep).await.unwrap().len(), 1);
        let ids: Vec<i64> = repo.list_feed_configs().await.unwrap().iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![keep]);
    }

    #[tokio::test]
    async fn store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feeds.db");

        let id = {
            let repo = Repository::open(&path).await.unwrap();
            repo.migrate(MIGRATIONS).await.unwrap();
            repo.insert_feed_config(form("https://example.com/rss")).await.unwrap()
        };

        let repo = Repository::open(&path).await.unwrap();
        assert!(repo.migrate(MIGRATIONS).await.unwrap().is_empty());
        let feeds = repo.list_feed_configs().await.unwrap();
        assert_eq!(feeds.len(), 1);
        assert_eq!(feeds[0].id, id);
    }

    #[tokio::test]
    async fn nuke_drops_everything() {
        let repo = repository().await;
        repo.insert_demo_feed().await.unwrap();

        let mut dropped = repo.nuke().await.unwrap();
        dropped.sort();
        assert_eq!(
            dropped,
            vec!["feed_configs", "feed_entry_metadata", "schema_migrations"]
        );
        assert_eq!(repo.migrate(MIGRATIONS).await.unwrap().len(), MIGRATIONS.len());
        assert!(repo.list_feed_configs().await.unwrap().is_empty());
    }
}
