use async_trait::async_trait;
use chrono::NaiveDate;
use rollcall_core::{AttendanceRecord, AttendanceStatus, AttendanceStore, Source, StoreError};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Row};

use crate::{backend, date_col, fmt_date, fmt_time, time_col, SqliteStore};

const COLUMNS: &str = "roll_no, date, status, time, source";

fn unknown(idx: usize, raw: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, format!("unknown value {raw:?}").into())
}

fn record_row(row: &Row<'_>) -> rusqlite::Result<AttendanceRecord> {
    let status: String = row.get(2)?;
    let source: String = row.get(4)?;
    Ok(AttendanceRecord {
        roll_no: row.get(0)?,
        date: date_col(row, 1)?,
        status: AttendanceStatus::parse(&status).ok_or_else(|| unknown(2, status.clone()))?,
        time: time_col(row, 3)?,
        source: Source::parse(&source).ok_or_else(|| unknown(4, source.clone()))?,
    })
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[async_trait]
impl AttendanceStore for SqliteStore {
    async fn insert_if_absent(&self, record: &AttendanceRecord) -> Result<bool, StoreError> {
        let r = record.clone();
        self.conn
            .call(move |conn| {
                let written = conn.execute(
                    &format!("INSERT OR IGNORE INTO attendance ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)"),
                    params![
                        r.roll_no,
                        fmt_date(r.date),
                        r.status.as_str(),
                        fmt_time(r.time),
                        r.source.as_str(),
                    ],
                )?;
                Ok(written == 1)
            })
            .await
            .map_err(backend)
    }

    async fn put(&self, record: &AttendanceRecord) -> Result<(), StoreError> {
        let r = record.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    &format!(
                        "INSERT INTO attendance ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)
                         ON CONFLICT(roll_no, date) DO UPDATE
                         SET status = excluded.status, time = excluded.time, source = excluded.source"
                    ),
                    params![
                        r.roll_no,
                        fmt_date(r.date),
                        r.status.as_str(),
                        fmt_time(r.time),
                        r.source.as_str(),
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(backend)
    }

    async fn delete_for_date(&self, date: NaiveDate, roll_nos: &[String]) -> Result<u64, StoreError> {
        if roll_nos.is_empty() {
            return Ok(0);
        }
        let date = fmt_date(date);
        let rolls = roll_nos.to_vec();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut removed = 0u64;
                {
                    let mut stmt = tx.prepare("DELETE FROM attendance WHERE date = ?1 AND roll_no = ?2")?;
                    for roll in &rolls {
                        removed += stmt.execute(params![date, roll])? as u64;
                    }
                }
                tx.commit()?;
                Ok(removed)
            })
            .await
            .map_err(backend)
    }

    async fn find_by_date(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>, StoreError> {
        let date = fmt_date(date);
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM attendance WHERE date = ?1 ORDER BY id"))?;
                let rows = stmt.query_map([date], record_row)?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .await
            .map_err(backend)
    }

    async fn find_by_rolls(&self, roll_nos: &[String]) -> Result<Vec<AttendanceRecord>, StoreError> {
        if roll_nos.is_empty() {
            return Ok(Vec::new());
        }
        let rolls = roll_nos.to_vec();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {COLUMNS} FROM attendance WHERE roll_no IN ({}) ORDER BY date, id",
                    placeholders(rolls.len())
                ))?;
                let rows = stmt.query_map(params_from_iter(rolls.iter()), record_row)?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .await
            .map_err(backend)
    }
}
