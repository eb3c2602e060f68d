use async_trait::async_trait;
use rollcall_core::{StoreError, Teacher, TeacherStore};
use rusqlite::{params, OptionalExtension, Row};

use crate::{backend, duplicate_or_backend, json_col, timestamp_col, to_json, SqliteStore};

const COLUMNS: &str = "name, email, password_hash, school, phone, class_details, registered_at";

fn teacher_row(row: &Row<'_>) -> rusqlite::Result<Teacher> {
    Ok(Teacher {
        name: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        school: row.get(3)?,
        phone: row.get(4)?,
        class_details: json_col(row, 5)?,
        registered_at: timestamp_col(row, 6)?,
    })
}

#[async_trait]
impl TeacherStore for SqliteStore {
    async fn insert(&self, teacher: &Teacher) -> Result<(), StoreError> {
        let t = teacher.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    &format!("INSERT INTO teachers ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
                    params![
                        t.name,
                        t.email,
                        t.password_hash,
                        t.school,
                        t.phone,
                        to_json(&t.class_details)?,
                        t.registered_at.to_rfc3339(),
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| duplicate_or_backend(e, &teacher.email))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Teacher>, StoreError> {
        let email = email.to_string();
        self.conn
            .call(move |conn| {
                let teacher = conn
                    .query_row(
                        &format!("SELECT {COLUMNS} FROM teachers WHERE email = ?1"),
                        [email],
                        teacher_row,
                    )
                    .optional()?;
                Ok(teacher)
            })
            .await
            .map_err(backend)
    }
}
