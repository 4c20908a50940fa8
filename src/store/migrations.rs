//! Schema versions for the libSQL backend.
//!
//! Applied versions are recorded in `_migrations`. Each pending step runs in
//! its own transaction together with its version row, so a failed step
//! leaves the database at the previous version.

use libsql::Connection;
use tracing::info;

use crate::error::DatabaseError;

/// (version, name, sql). Append only.
const STEPS: &[(i64, &str, &str)] = &[
    (
        1,
        "requests_and_settings",
        r#"
        CREATE TABLE IF NOT EXISTS requests (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            agency_name TEXT NOT NULL,
            agency_type TEXT NOT NULL,
            record_type TEXT NOT NULL,
            record_description TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_requests_user ON requests(user_id);

        CREATE TABLE IF NOT EXISTS settings (
            user_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (user_id, key)
        );
        "#,
    ),
    (
        2,
        "request_letters",
        r#"
        ALTER TABLE requests ADD COLUMN letter_text TEXT;
        CREATE INDEX IF NOT EXISTS idx_requests_user_created
            ON requests(user_id, created_at);
        "#,
    ),
];

/// Latest schema version this build knows about.
pub fn latest_version() -> i64 {
    STEPS.last().map_or(0, |(version, _, _)| *version)
}

/// Bring the schema up to [`latest_version`].
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("_migrations table: {e}")))?;

    let applied = schema_version(conn).await?;
    for &(version, name, sql) in STEPS.iter().filter(|(v, _, _)| *v > applied) {
        apply(conn, version, name, sql).await?;
        info!(version, name, "Schema migrated");
    }
    Ok(())
}

/// Highest recorded version, 0 on a fresh database.
pub async fn schema_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("read version: {e}")))?;
    let Some(row) = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("read version: {e}")))?
    else {
        return Ok(0);
    };
    row.get::<i64>(0)
        .map_err(|e| DatabaseError::Migration(format!("read version: {e}")))
}

async fn apply(conn: &Connection, version: i64, name: &str, sql: &str) -> Result<(), DatabaseError> {
    let failed = |e: libsql::Error| DatabaseError::Migration(format!("V{version} {name}: {e}"));

    let tx = conn.transaction().await.map_err(failed)?;
    tx.execute_batch(sql).await.map_err(failed)?;
    tx.execute(
        "INSERT INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(failed)?;
    tx.commit().await.map_err(failed)
}
