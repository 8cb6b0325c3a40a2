use std::collections::HashMap;

use chrono::Utc;
use rusqlite::{params, Connection};

use super::schema::SCHEMA_MIGRATIONS_TABLE;

/// A named, forward-only schema or data change.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: &'static str,
    pub sql: &'static str,
}

/// Versions already recorded in `schema_migrations`, mapped to when they ran.
pub fn applied_migrations(conn: &Connection) -> rusqlite::Result<HashMap<String, String>> {
    conn.execute_batch(SCHEMA_MIGRATIONS_TABLE)?;

    let mut stmt = conn.prepare("SELECT version, applied_at FROM schema_migrations")?;
    let applied = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<HashMap<_, _>>>()?;
    Ok(applied)
}

/// Runs every migration not yet recorded, in the order given, and returns the
/// versions applied by this call. Each migration commits together with its
/// record, so a failure leaves earlier migrations applied and nothing partial.
pub fn migrate(
    conn: &mut Connection,
    migrations: &[Migration],
) -> rusqlite::Result<Vec<&'static str>> {
    let applied = applied_migrations(conn)?;
    let mut newly_applied = Vec::new();

    for migration in migrations {
        if let Some(applied_at) = applied.get(migration.version) {
            tracing::debug!(
                "Migration {} already applied at {}",
                migration.version,
                applied_at
            );
            continue;
        }

        tracing::info!("Applying migration {}", migration.version);
        let tx = conn.transaction()?;
        tx.execute_batch(migration.sql)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            params![migration.version, Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;

        newly_applied.push(migration.version);
    }

    Ok(newly_applied)
}
