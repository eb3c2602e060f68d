use async_trait::async_trait;
use rollcall_core::{ClassScope, PendingStatus, PendingStore, PendingStudent, StoreError};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};

use crate::{backend, date_col, duplicate_or_backend, fmt_date, json_col, to_json, SqliteStore};

const COLUMNS: &str =
    "roll_no, name, email, photo_path, department_id, year, subject_ids, registration_date, status";

fn pending_row(row: &Row<'_>) -> rusqlite::Result<PendingStudent> {
    let status: String = row.get(8)?;
    Ok(PendingStudent {
        roll_no: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        photo_path: row.get(3)?,
        department_id: row.get(4)?,
        year: row.get(5)?,
        subject_ids: json_col(row, 6)?,
        registration_date: date_col(row, 7)?,
        status: PendingStatus::parse(&status).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(8, Type::Text, format!("unknown status {status:?}").into())
        })?,
    })
}

#[async_trait]
impl PendingStore for SqliteStore {
    async fn insert(&self, pending: &PendingStudent) -> Result<(), StoreError> {
        let p = pending.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    &format!("INSERT INTO pending_students ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
                    params![
                        p.roll_no,
                        p.name,
                        p.email,
                        p.photo_path,
                        p.department_id,
                        p.year,
                        to_json(&p.subject_ids)?,
                        fmt_date(p.registration_date),
                        p.status.as_str(),
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| duplicate_or_backend(e, &pending.roll_no))
    }

    async fn list_pending(&self, scope: &ClassScope) -> Result<Vec<PendingStudent>, StoreError> {
        let rows = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {COLUMNS} FROM pending_students WHERE status = 'pending' ORDER BY seq"
                ))?;
                let rows = stmt.query_map([], pending_row)?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .await
            .map_err(backend)?;
        Ok(rows.into_iter().filter(|p| scope.contains_pending(p)).collect())
    }

    async fn find_pending(&self, roll_no: &str) -> Result<Option<PendingStudent>, StoreError> {
        let roll_no = roll_no.to_string();
        self.conn
            .call(move |conn| {
                let row = conn
                    .query_row(
                        &format!("SELECT {COLUMNS} FROM pending_students WHERE roll_no = ?1 AND status = 'pending'"),
                        [roll_no],
                        pending_row,
                    )
                    .optional()?;
                Ok(row)
            })
            .await
            .map_err(backend)
    }

    async fn mark_approved(&self, roll_no: &str) -> Result<bool, StoreError> {
        let roll_no = roll_no.to_string();
        self.conn
            .call(move |conn| {
                let n = conn.execute(
                    "UPDATE pending_students SET status = 'approved' WHERE roll_no = ?1",
                    [roll_no],
                )?;
                Ok(n > 0)
            })
            .await
            .map_err(backend)
    }

    async fn delete_pending(&self, roll_no: &str) -> Result<bool, StoreError> {
        let roll_no = roll_no.to_string();
        self.conn
            .call(move |conn| {
                let n = conn.execute(
                    "DELETE FROM pending_students WHERE roll_no = ?1 AND status = 'pending'",
                    [roll_no],
                )?;
                Ok(n > 0)
            })
            .await
            .map_err(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn registration(roll: &str, subject: &str) -> PendingStudent {
        PendingStudent {
            roll_no: roll.into(),
            name: format!("Student {roll}"),
            email: format!("{}@school.edu", roll.to_lowercase()),
            photo_path: format!("images/{roll}.jpg"),
            department_id: Some("cs".into()),
            year: Some("2".into()),
            subject_ids: vec![subject.into()],
            registration_date: NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
            status: PendingStatus::Pending,
        }
    }

    #[tokio::test]
    async fn test_list_and_approve() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store.insert(&registration("R1", "dbms")).await.unwrap();
        store.insert(&registration("R2", "os")).await.unwrap();
        assert!(matches!(
            store.insert(&registration("R1", "dbms")).await,
            Err(StoreError::Duplicate(_))
        ));

        let dbms = store.list_pending(&ClassScope::class("cs", "2", "dbms")).await.unwrap();
        assert_eq!(dbms.len(), 1);
        assert_eq!(dbms[0].roll_no, "R1");

        assert!(store.mark_approved("R1").await.unwrap());
        assert!(!store.mark_approved("R9").await.unwrap());
        assert_eq!(store.find_pending("R1").await.unwrap(), None);
        assert!(store.list_pending(&ClassScope::default()).await.unwrap().iter().all(|p| p.roll_no == "R2"));
    }

    #[tokio::test]
    async fn test_delete_pending_leaves_approved_rows() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store.insert(&registration("R1", "dbms")).await.unwrap();
        store.insert(&registration("R2", "dbms")).await.unwrap();
        store.mark_approved("R2").await.unwrap();

        assert!(store.delete_pending("R1").await.unwrap());
        assert!(!store.delete_pending("R1").await.unwrap());
        assert!(!store.delete_pending("R2").await.unwrap());

        // A rejected roll number may register again.
        store.insert(&registration("R1", "dbms")).await.unwrap();
        assert!(store.find_pending("R1").await.unwrap().is_some());
    }
}
