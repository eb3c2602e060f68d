use async_trait::async_trait;
use rollcall_core::{ClassScope, StoreError, Student, StudentStore};
use rusqlite::{params, OptionalExtension, Row};

use crate::{backend, date_col, duplicate_or_backend, fmt_date, json_col, to_json, SqliteStore};

const COLUMNS: &str = "roll_no, name, photo_path, department_id, year, subject_ids, registration_date, email";

fn student_row(row: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        roll_no: row.get(0)?,
        name: row.get(1)?,
        photo_path: row.get(2)?,
        department_id: row.get(3)?,
        year: row.get(4)?,
        subject_ids: json_col(row, 5)?,
        registration_date: date_col(row, 6)?,
        email: row.get(7)?,
    })
}

#[async_trait]
impl StudentStore for SqliteStore {
    async fn find_by_scope(&self, scope: &ClassScope) -> Result<Vec<Student>, StoreError> {
        let department = scope.department_id.clone();
        let year = scope.year.clone();
        let students = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {COLUMNS} FROM students
                     WHERE (?1 IS NULL OR department_id = ?1) AND (?2 IS NULL OR year = ?2)
                     ORDER BY seq"
                ))?;
                let rows = stmt.query_map(params![department, year], student_row)?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .await
            .map_err(backend)?;
        // Subject overlap is checked here; the set lives in a JSON column.
        Ok(students.into_iter().filter(|s| scope.contains(s)).collect())
    }

    async fn find(&self, roll_no: &str) -> Result<Option<Student>, StoreError> {
        let roll_no = roll_no.to_string();
        self.conn
            .call(move |conn| {
                let student = conn
                    .query_row(
                        &format!("SELECT {COLUMNS} FROM students WHERE roll_no = ?1"),
                        [roll_no],
                        student_row,
                    )
                    .optional()?;
                Ok(student)
            })
            .await
            .map_err(backend)
    }

    async fn insert(&self, student: &Student) -> Result<(), StoreError> {
        let s = student.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    &format!("INSERT INTO students ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
                    params![
                        s.roll_no,
                        s.name,
                        s.photo_path,
                        s.department_id,
                        s.year,
                        to_json(&s.subject_ids)?,
                        fmt_date(s.registration_date),
                        s.email,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| duplicate_or_backend(e, &student.roll_no))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn student(roll: &str, dept: &str, subjects: &[&str]) -> Student {
        Student {
            roll_no: roll.into(),
            name: format!("Student {roll}"),
            photo_path: format!("images/{roll}.jpg"),
            department_id: Some(dept.into()),
            year: Some("2".into()),
            subject_ids: subjects.iter().map(|s| s.to_string()).collect(),
            registration_date: NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
            email: None,
        }
    }

    #[tokio::test]
    async fn test_insert_find_and_duplicate() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let s = student("R1", "cs", &["dbms", "os"]);
        store.insert(&s).await.unwrap();

        assert_eq!(store.find("R1").await.unwrap(), Some(s.clone()));
        assert_eq!(store.find("R9").await.unwrap(), None);
        assert!(matches!(store.insert(&s).await, Err(StoreError::Duplicate(r)) if r == "R1"));
    }

    #[tokio::test]
    async fn test_find_by_scope_filters_and_keeps_registration_order() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store.insert(&student("R3", "cs", &["dbms"])).await.unwrap();
        store.insert(&student("R1", "cs", &["os"])).await.unwrap();
        store.insert(&student("R2", "ee", &["dbms"])).await.unwrap();
        store.insert(&student("R4", "cs", &["dbms", "os"])).await.unwrap();

        let dbms = store.find_by_scope(&ClassScope::class("cs", "2", "dbms")).await.unwrap();
        let rolls: Vec<_> = dbms.iter().map(|s| s.roll_no.as_str()).collect();
        assert_eq!(rolls, ["R3", "R4"]);

        let everyone = store.find_by_scope(&ClassScope::default()).await.unwrap();
        assert_eq!(everyone.len(), 4);
        assert_eq!(everyone[0].roll_no, "R3");
    }
}
