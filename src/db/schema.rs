use super::migrations::Migration;

pub const SCHEMA_MIGRATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at TEXT NOT NULL
);
"#;

/// Every migration the store has ever had, oldest first. Append only: a
/// migration may assume all earlier entries already ran.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "feed_configs",
        sql: r#"
CREATE TABLE feed_configs (
    id INTEGER PRIMARY KEY,
    feed_type TEXT,
    url TEXT,
    proxy TEXT,
    title TEXT,
    description TEXT,
    scan_interval TEXT,
    last_updated TEXT,
    last_checked TEXT,
    etag TEXT,
    html TEXT
);
"#,
    },
    Migration {
        version: "feed_configs_open_entry_setting",
        sql: r#"
ALTER TABLE feed_configs ADD COLUMN open_entry_setting TEXT NOT NULL DEFAULT 'in-app';
"#,
    },
    Migration {
        version: "feed_entry_metadata",
        sql: r#"
CREATE TABLE feed_entry_metadata (
    feed_config_id INTEGER NOT NULL,
    entry_id TEXT NOT NULL,
    is_marked_read INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (feed_config_id, entry_id)
);
"#,
    },
];
