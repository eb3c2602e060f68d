//! rollcall-store: SQLite implementation of the rollcall store traits.
//!
//! One [`SqliteStore`] owns a single `tokio_rusqlite::Connection` and
//! implements every store trait, so the daemon can hand the same handle out
//! as `Arc<dyn StudentStore>`, `Arc<dyn AttendanceStore>` and so on.

mod attendance;
mod pending;
mod schema;
mod students;
mod teachers;

use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rollcall_core::StoreError;
use rusqlite::types::Type;
use rusqlite::{ErrorCode, Row};

const DATE_FMT: &str = "%Y-%m-%d";
const TIME_FMT: &str = "%H:%M:%S";

#[derive(Clone)]
pub struct SqliteStore {
    conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Backend(e.to_string()))?;
            }
        }
        let conn = tokio_rusqlite::Connection::open(path).await.map_err(backend)?;
        let store = Self { conn };
        store.migrate().await?;
        tracing::info!(path = %path.display(), "attendance database opened");
        Ok(store)
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = tokio_rusqlite::Connection::open_in_memory().await.map_err(backend)?;
        let store = Self { conn };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        self.conn
            .call(|conn| {
                conn.execute_batch(schema::SCHEMA)?;
                Ok(())
            })
            .await
            .map_err(backend)
    }
}

fn backend(e: tokio_rusqlite::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn is_constraint_violation(e: &tokio_rusqlite::Error) -> bool {
    matches!(
        e,
        tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(f, _))
            if f.code == ErrorCode::ConstraintViolation
    )
}

/// Map a uniqueness conflict to [`StoreError::Duplicate`] keyed on `key`.
fn duplicate_or_backend(e: tokio_rusqlite::Error, key: &str) -> StoreError {
    if is_constraint_violation(&e) {
        StoreError::Duplicate(key.to_string())
    } else {
        backend(e)
    }
}

fn conversion(idx: usize, e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn date_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FMT).map_err(|e| conversion(idx, e))
}

fn time_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveTime> {
    let raw: String = row.get(idx)?;
    NaiveTime::parse_from_str(&raw, TIME_FMT).map_err(|e| conversion(idx, e))
}

fn timestamp_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion(idx, e))
}

fn json_col<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion(idx, e))
}

fn to_json<T: serde::Serialize>(value: &T) -> rusqlite::Result<String> {
    serde_json::to_string(value).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

fn fmt_date(date: NaiveDate) -> String {
    date.format(DATE_FMT).to_string()
}

fn fmt_time(time: NaiveTime) -> String {
    time.format(TIME_FMT).to_string()
}
