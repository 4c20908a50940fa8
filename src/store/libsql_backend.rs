//! [`Database`] over libSQL, on a local file or in memory.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use libsql::params::IntoParams;
use libsql::{Connection, Row, Rows, Value, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::entitlement::plans::RequestLimit;
use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{Database, GuardedInsert, NewRequest, RequestRecord, RequestStatus};

const REQUEST_COLUMNS: &str = "id, user_id, agency_name, agency_type, record_type, \
    record_description, letter_text, status, created_at, updated_at";

/// One shared connection; libSQL connections are safe to use concurrently.
pub struct LibSqlBackend {
    // Owns the database the connection was opened from.
    _db: libsql::Database,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open the database file at `path`, creating it and its directory if
    /// needed, and migrate it.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| {
                DatabaseError::Pool(format!("create {}: {e}", dir.display()))
            })?;
        }
        let backend = Self::connect(libsql::Builder::new_local(path).build().await).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// A private in-memory database, migrated. Used by tests.
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        Self::connect(libsql::Builder::new_local(":memory:").build().await).await
    }

    async fn connect(built: libsql::Result<libsql::Database>) -> Result<Self, DatabaseError> {
        let db = built.map_err(|e| DatabaseError::Pool(format!("open: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("connect: {e}")))?;
        let backend = Self { _db: db, conn };
        backend.init_schema().await?;
        Ok(backend)
    }

    async fn first_row(
        &self,
        op: &str,
        sql: &str,
        args: impl IntoParams,
    ) -> Result<Option<Row>, DatabaseError> {
        let mut rows = self.rows(op, sql, args).await?;
        rows.next().await.map_err(|e| query_failed(op, e))
    }

    async fn rows(&self, op: &str, sql: &str, args: impl IntoParams) -> Result<Rows, DatabaseError> {
        self.conn.query(sql, args).await.map_err(|e| query_failed(op, e))
    }
}

fn query_failed(op: &str, e: libsql::Error) -> DatabaseError {
    DatabaseError::Query(format!("{op}: {e}"))
}

/// Timestamps are written as RFC 3339; SQLite's own `datetime('now')`
/// format is accepted too. Unreadable values sort first.
fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f").map(|n| n.and_utc()))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Bind values for [`REQUEST_COLUMNS`] in order, with `now` as both
/// timestamps.
fn request_values(id: Uuid, request: &NewRequest, now: &str) -> Vec<Value> {
    let letter = request.letter.clone().map_or(Value::Null, Value::Text);
    vec![
        Value::Text(id.to_string()),
        Value::Text(request.user_id.clone()),
        Value::Text(request.agency_name.clone()),
        Value::Text(request.agency_type.clone()),
        Value::Text(request.record_type.clone()),
        Value::Text(request.record_description.clone()),
        letter,
        Value::Text(RequestStatus::Pending.as_str().to_string()),
        Value::Text(now.to_string()),
        Value::Text(now.to_string()),
    ]
}

impl TryFrom<&Row> for RequestRecord {
    type Error = DatabaseError;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        let column = |e: libsql::Error| query_failed("request row", e);
        let raw_id: String = row.get(0).map_err(column)?;
        let id = Uuid::parse_str(&raw_id)
            .map_err(|e| DatabaseError::Query(format!("request row: bad id {raw_id:?}: {e}")))?;
        Ok(Self {
            id,
            user_id: row.get(1).map_err(column)?,
            agency_name: row.get(2).map_err(column)?,
            agency_type: row.get(3).map_err(column)?,
            record_type: row.get(4).map_err(column)?,
            record_description: row.get(5).map_err(column)?,
            letter: row.get::<String>(6).ok(),
            status: RequestStatus::parse(&row.get::<String>(7).map_err(column)?),
            created_at: parse_timestamp(&row.get::<String>(8).map_err(column)?),
            updated_at: parse_timestamp(&row.get::<String>(9).map_err(column)?),
        })
    }
}

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(&self.conn).await
    }

    async fn insert_request(&self, request: &NewRequest) -> Result<Uuid, DatabaseError> {
        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                &format!(
                    "INSERT INTO requests ({REQUEST_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                ),
                request_values(id, request, &now),
            )
            .await
            .map_err(|e| query_failed("insert_request", e))?;

        debug!(request_id = %id, user_id = %request.user_id, "Request inserted");
        Ok(id)
    }

    async fn insert_request_within_limit(
        &self,
        request: &NewRequest,
        limit: RequestLimit,
    ) -> Result<GuardedInsert, DatabaseError> {
        let RequestLimit::Limited(max) = limit else {
            return self.insert_request(request).await.map(GuardedInsert::Inserted);
        };

        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        let mut values = request_values(id, request, &now);
        values.push(Value::Integer(i64::from(max)));
        let inserted = self
            .conn
            .execute(
                &format!(
                    "INSERT INTO requests ({REQUEST_COLUMNS})
                     SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10
                     WHERE (SELECT COUNT(*) FROM requests WHERE user_id = ?2) < ?11"
                ),
                values,
            )
            .await
            .map_err(|e| query_failed("insert_request_within_limit", e))?;

        if inserted == 0 {
            debug!(user_id = %request.user_id, max, "Quota exhausted, insert refused");
            return Ok(GuardedInsert::QuotaExhausted);
        }
        debug!(request_id = %id, user_id = %request.user_id, max, "Request inserted within limit");
        Ok(GuardedInsert::Inserted(id))
    }

    async fn count_requests(&self, user_id: &str) -> Result<u64, DatabaseError> {
        let row = self
            .first_row(
                "count_requests",
                "SELECT COUNT(*) FROM requests WHERE user_id = ?1",
                params![user_id],
            )
            .await?;
        let count = match row {
            Some(row) => row.get::<i64>(0).map_err(|e| query_failed("count_requests", e))?,
            None => 0,
        };
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn get_request(&self, id: Uuid) -> Result<Option<RequestRecord>, DatabaseError> {
        self.first_row(
            "get_request",
            &format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE id = ?1"),
            params![id.to_string()],
        )
        .await?
        .map(|row| RequestRecord::try_from(&row))
        .transpose()
    }

    async fn list_requests(&self, user_id: &str) -> Result<Vec<RequestRecord>, DatabaseError> {
        let mut rows = self
            .rows(
                "list_requests",
                &format!(
                    "SELECT {REQUEST_COLUMNS} FROM requests
                     WHERE user_id = ?1 ORDER BY created_at DESC"
                ),
                params![user_id],
            )
            .await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| query_failed("list_requests", e))? {
            records.push(RequestRecord::try_from(&row)?);
        }
        Ok(records)
    }

    async fn get_setting(&self, user_id: &str, key: &str) -> Result<Option<String>, DatabaseError> {
        let row = self
            .first_row(
                "get_setting",
                "SELECT value FROM settings WHERE user_id = ?1 AND key = ?2",
                params![user_id, key],
            )
            .await?;
        Ok(row.and_then(|r| r.get::<String>(0).ok()))
    }

    async fn set_setting(&self, user_id: &str, key: &str, value: &str)
        -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "INSERT INTO settings (user_id, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (user_id, key) DO UPDATE SET value = excluded.value,
                     updated_at = excluded.updated_at",
                params![user_id, key, value, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| query_failed("set_setting", e))?;
        debug!(user_id, key, "Setting written");
        Ok(())
    }

    async fn delete_setting(&self, user_id: &str, key: &str) -> Result<bool, DatabaseError> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM settings WHERE user_id = ?1 AND key = ?2",
                params![user_id, key],
            )
            .await
            .map_err(|e| query_failed("delete_setting", e))?;
        Ok(removed > 0)
    }

    async fn take_setting(&self, user_id: &str, key: &str)
        -> Result<Option<String>, DatabaseError> {
        let row = self
            .first_row(
                "take_setting",
                "DELETE FROM settings WHERE user_id = ?1 AND key = ?2 RETURNING value",
                params![user_id, key],
            )
            .await?;
        Ok(row.and_then(|r| r.get::<String>(0).ok()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn make_request(user_id: &str) -> NewRequest {
        NewRequest {
            user_id: user_id.to_string(),
            agency_name: "City Police Department".to_string(),
            agency_type: "municipal".to_string(),
            record_type: "Incident reports".to_string(),
            record_description: "Incident reports for Elm St, March 2024".to_string(),
            letter: Some("Dear Records Officer,".to_string()),
        }
    }

    #[tokio::test]
    async fn inserted_request_reads_back() {
        let db = memory_db().await;
        let id = db.insert_request(&make_request("u1")).await.unwrap();

        let fetched = db.get_request(id).await.unwrap().unwrap();
        assert_eq!(fetched.id, id);
        assert_eq!(fetched.user_id, "u1");
        assert_eq!(fetched.agency_name, "City Police Department");
        assert_eq!(fetched.letter.as_deref(), Some("Dear Records Officer,"));
        assert_eq!(fetched.status, RequestStatus::Pending);
        assert_eq!(fetched.created_at, fetched.updated_at);
    }

    #[tokio::test]
    async fn unknown_request_is_none() {
        let db = memory_db().await;
        assert!(db.get_request(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn insert_without_letter() {
        let db = memory_db().await;
        let mut request = make_request("u1");
        request.letter = None;
        let id = db.insert_request(&request).await.unwrap();
        assert!(db.get_request(id).await.unwrap().unwrap().letter.is_none());
    }

    #[tokio::test]
    async fn count_is_per_user() {
        let db = memory_db().await;
        db.insert_request(&make_request("u1")).await.unwrap();
        db.insert_request(&make_request("u1")).await.unwrap();
        db.insert_request(&make_request("u2")).await.unwrap();

        assert_eq!(db.count_requests("u1").await.unwrap(), 2);
        assert_eq!(db.count_requests("u2").await.unwrap(), 1);
        assert_eq!(db.count_requests("nobody").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn list_requests_for_user() {
        let db = memory_db().await;
        db.insert_request(&make_request("u1")).await.unwrap();
        db.insert_request(&make_request("u2")).await.unwrap();

        let listed = db.list_requests("u1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].user_id, "u1");
    }

    #[tokio::test]
    async fn guarded_insert_stops_at_limit() {
        let db = memory_db().await;
        let request = make_request("u1");
        let limit = RequestLimit::Limited(2);

        assert!(matches!(
            db.insert_request_within_limit(&request, limit).await.unwrap(),
            GuardedInsert::Inserted(_)
        ));
        assert!(matches!(
            db.insert_request_within_limit(&request, limit).await.unwrap(),
            GuardedInsert::Inserted(_)
        ));
        assert_eq!(
            db.insert_request_within_limit(&request, limit).await.unwrap(),
            GuardedInsert::QuotaExhausted
        );
        assert_eq!(db.count_requests("u1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn guarded_insert_zero_limit_never_inserts() {
        let db = memory_db().await;
        let result = db
            .insert_request_within_limit(&make_request("u1"), RequestLimit::Limited(0))
            .await
            .unwrap();
        assert_eq!(result, GuardedInsert::QuotaExhausted);
        assert_eq!(db.count_requests("u1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn guarded_insert_unlimited() {
        let db = memory_db().await;
        for _ in 0..3 {
            db.insert_request(&make_request("u1")).await.unwrap();
        }
        let result = db
            .insert_request_within_limit(&make_request("u1"), RequestLimit::Unlimited)
            .await
            .unwrap();
        assert!(matches!(result, GuardedInsert::Inserted(_)));
    }

    #[tokio::test]
    async fn guarded_insert_counts_only_own_requests() {
        let db = memory_db().await;
        db.insert_request(&make_request("other")).await.unwrap();
        let result = db
            .insert_request_within_limit(&make_request("u1"), RequestLimit::Limited(1))
            .await
            .unwrap();
        assert!(matches!(result, GuardedInsert::Inserted(_)));
    }

    #[tokio::test]
    async fn settings_roundtrip_and_overwrite() {
        let db = memory_db().await;
        assert!(db.get_setting("u1", "k").await.unwrap().is_none());

        db.set_setting("u1", "k", r#"{"a":1}"#).await.unwrap();
        db.set_setting("u1", "k", r#"{"a":2}"#).await.unwrap();
        assert_eq!(
            db.get_setting("u1", "k").await.unwrap().as_deref(),
            Some(r#"{"a":2}"#)
        );
        assert!(db.get_setting("u2", "k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_setting_reports_existence() {
        let db = memory_db().await;
        db.set_setting("u1", "k", "1").await.unwrap();
        assert!(db.delete_setting("u1", "k").await.unwrap());
        assert!(!db.delete_setting("u1", "k").await.unwrap());
    }

    #[tokio::test]
    async fn take_setting_is_single_shot() {
        let db = memory_db().await;
        db.set_setting("u1", "slot", "payload").await.unwrap();

        assert_eq!(
            db.take_setting("u1", "slot").await.unwrap().as_deref(),
            Some("payload")
        );
        assert!(db.take_setting("u1", "slot").await.unwrap().is_none());
        assert!(db.get_setting("u1", "slot").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn open_local_file_creates_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("records.db");
        let db = LibSqlBackend::new_local(&path).await.unwrap();
        db.insert_request(&make_request("u1")).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn reopening_keeps_data() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("records.db");
        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.insert_request(&make_request("u1")).await.unwrap();
        }
        let db = LibSqlBackend::new_local(&path).await.unwrap();
        assert_eq!(db.count_requests("u1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn malformed_stored_id_is_an_error() {
        let db = memory_db().await;
        db.insert_request(&make_request("u1")).await.unwrap();
        db.conn
            .execute(
                &format!(
                    "INSERT INTO requests ({REQUEST_COLUMNS})
                     VALUES ('not-a-uuid', 'u1', 'Clerk', 'county', 'Licenses', 'All',
                         NULL, 'pending', '2026-01-01T00:00:00+00:00', '2026-01-01T00:00:00+00:00')"
                ),
                (),
            )
            .await
            .unwrap();

        let err = db.list_requests("u1").await.unwrap_err();
        assert!(matches!(err, DatabaseError::Query(msg) if msg.contains("not-a-uuid")));
    }

    #[test]
    fn timestamps_from_either_format() {
        let written = parse_timestamp("2026-01-02T03:04:05+00:00");
        assert_eq!(written.to_rfc3339(), "2026-01-02T03:04:05+00:00");
        assert_eq!(parse_timestamp("2026-01-02 03:04:05"), written);
        assert_eq!(parse_timestamp("not a time"), DateTime::<Utc>::MIN_UTC);
    }
}
