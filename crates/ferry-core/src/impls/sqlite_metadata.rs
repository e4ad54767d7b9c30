//! SqliteMetadataRepository - rusqlite によるメタデータ正本
//!
//! rusqlite is synchronous; every call runs on the blocking pool with the
//! connection behind a std `Mutex`.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Row, params};

use crate::domain::{FerryError, RecordId, RecordPage, RecordStatus, StoredObjectRecord};
use crate::ports::MetadataRepository;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS files (
    id            TEXT PRIMARY KEY,
    key           TEXT NOT NULL UNIQUE,
    original_name TEXT NOT NULL,
    size          INTEGER NOT NULL,
    mime_type     TEXT NOT NULL,
    url           TEXT NOT NULL,
    status        TEXT NOT NULL,
    created_at    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_files_created_at ON files(created_at DESC);
";

#[derive(Clone)]
pub struct SqliteMetadataRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteMetadataRepository {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FerryError> {
        let conn = Connection::open(path.as_ref()).map_err(sqlite_error)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")
            .map_err(sqlite_error)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, FerryError> {
        Self::init(Connection::open_in_memory().map_err(sqlite_error)?)
    }

    fn init(conn: Connection) -> Result<Self, FerryError> {
        conn.execute_batch(SCHEMA).map_err(sqlite_error)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, FerryError>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&conn)
        })
        .await
        .map_err(|e| FerryError::metadata(format!("blocking task failed: {e}")))?
        .map_err(sqlite_error)
    }
}

fn sqlite_error(e: rusqlite::Error) -> FerryError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _) => {
            let code = format!("{:?}", err.code);
            FerryError::metadata(e.to_string()).with_code(code)
        }
        _ => FerryError::metadata(e.to_string()),
    }
}

/// Fixed-width UTC timestamps sort lexically in time order.
fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn conversion_error(
    idx: usize,
    e: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into())
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<StoredObjectRecord> {
    let id: String = row.get(0)?;
    let size: i64 = row.get(3)?;
    let status: String = row.get(6)?;
    let created_at: String = row.get(7)?;

    Ok(StoredObjectRecord {
        id: RecordId::from_str(&id).map_err(|e| conversion_error(0, e))?,
        key: row.get(1)?,
        original_name: row.get(2)?,
        size: u64::try_from(size).map_err(|e| conversion_error(3, e))?,
        mime_type: row.get(4)?,
        url: row.get(5)?,
        status: RecordStatus::parse(&status)
            .ok_or_else(|| conversion_error(6, format!("unknown status {status:?}")))?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| conversion_error(7, e))?
            .with_timezone(&Utc),
    })
}

#[async_trait]
impl MetadataRepository for SqliteMetadataRepository {
    async fn save(&self, record: StoredObjectRecord) -> Result<RecordId, FerryError> {
        let id = record.id;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO files (id, key, original_name, size, mime_type, url, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.id.to_string(),
                    record.key,
                    record.original_name,
                    i64::try_from(record.size).unwrap_or(i64::MAX),
                    record.mime_type,
                    record.url,
                    record.status.as_str(),
                    format_timestamp(record.created_at),
                ],
            )
        })
        .await?;
        Ok(id)
    }

    async fn list(&self, page: u32, limit: u32) -> Result<RecordPage, FerryError> {
        let offset = i64::from(page.max(1) - 1) * i64::from(limit);
        let limit = i64::from(limit);
        self.with_conn(move |conn| {
            let total: i64 = conn.query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
            let mut stmt = conn.prepare(
                "SELECT id, key, original_name, size, mime_type, url, status, created_at
                 FROM files
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?1 OFFSET ?2",
            )?;
            let records = stmt
                .query_map(params![limit, offset], row_to_record)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(RecordPage {
                records,
                total: total.max(0) as u64,
            })
        })
        .await
    }

    async fn ping(&self) -> bool {
        self.with_conn(|conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)))
            .await
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn record(i: i64) -> StoredObjectRecord {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap() + Duration::milliseconds(i * 1500);
        StoredObjectRecord {
            id: RecordId::generate(),
            key: format!("uploads/{}-doc{i}.pdf", at.timestamp_millis()),
            original_name: format!("doc{i}.pdf"),
            size: 1024 + i as u64,
            mime_type: "application/pdf".into(),
            url: format!("https://bucket.test/doc{i}.pdf"),
            status: RecordStatus::Completed,
            created_at: at,
        }
    }

    #[tokio::test]
    async fn round_trips_a_record() {
        let repo = SqliteMetadataRepository::open_in_memory().unwrap();
        let r = record(1);
        let id = repo.save(r.clone()).await.unwrap();
        assert_eq!(id, r.id);

        let page = repo.list(1, 10).await.unwrap();
        assert_eq!(page.records, vec![r]);
        assert!(repo.ping().await);
    }

    #[tokio::test]
    async fn paginates_newest_first() {
        let repo = SqliteMetadataRepository::open_in_memory().unwrap();
        for i in 0..25 {
            repo.save(record(i)).await.unwrap();
        }

        let page = repo.list(2, 10).await.unwrap();
        assert_eq!(page.total, 25);
        assert_eq!(page.page_count(10), 3);
        let names: Vec<_> = page.records.iter().map(|r| r.original_name.as_str()).collect();
        assert_eq!(names.first(), Some(&"doc14.pdf"));
        assert_eq!(names.last(), Some(&"doc5.pdf"));
        assert_eq!(repo.list(3, 10).await.unwrap().records.len(), 5);
    }

    #[tokio::test]
    async fn duplicate_key_reports_constraint_code() {
        let repo = SqliteMetadataRepository::open_in_memory().unwrap();
        let r = record(1);
        repo.save(r.clone()).await.unwrap();

        let mut dup = r;
        dup.id = RecordId::generate();
        match repo.save(dup).await.unwrap_err() {
            FerryError::Storage { code, .. } => {
                assert_eq!(code.as_deref(), Some("ConstraintViolation"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ferry.db");
        {
            let repo = SqliteMetadataRepository::open(&path).unwrap();
            repo.save(record(7)).await.unwrap();
        }
        let repo = SqliteMetadataRepository::open(&path).unwrap();
        let page = repo.list(1, 10).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.records[0].original_name, "doc7.pdf");
    }
}
