//! Narrow data-access interfaces, one per entity.
//!
//! The core never holds a connection handle. The SQLite implementation lives
//! in `rollcall-store`; [`crate::memory`] provides in-process fakes.

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::model::{AttendanceRecord, ClassScope, PendingStudent, Student, Teacher};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("duplicate key: {0}")]
    Duplicate(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("storage backend: {0}")]
    Backend(String),
}

#[async_trait]
pub trait StudentStore: Send + Sync {
    /// Students matching `scope`, in registration order.
    async fn find_by_scope(&self, scope: &ClassScope) -> Result<Vec<Student>, StoreError>;

    async fn find(&self, roll_no: &str) -> Result<Option<Student>, StoreError>;

    /// Fails with [`StoreError::Duplicate`] if the roll number is taken.
    async fn insert(&self, student: &Student) -> Result<(), StoreError>;
}

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    /// Insert unless a row already exists for `(roll_no, date)`.
    ///
    /// Returns `true` if the row was written. A uniqueness conflict is reported
    /// as `Ok(false)`, never as an error.
    async fn insert_if_absent(&self, record: &AttendanceRecord) -> Result<bool, StoreError>;

    /// Write a row, replacing any existing row for `(roll_no, date)`.
    async fn put(&self, record: &AttendanceRecord) -> Result<(), StoreError>;

    /// Delete rows on `date` for the given roll numbers. Returns rows removed.
    async fn delete_for_date(&self, date: NaiveDate, roll_nos: &[String]) -> Result<u64, StoreError>;

    async fn find_by_date(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>, StoreError>;

    /// All rows for the given roll numbers, ordered by date.
    async fn find_by_rolls(&self, roll_nos: &[String]) -> Result<Vec<AttendanceRecord>, StoreError>;
}

#[async_trait]
pub trait PendingStore: Send + Sync {
    /// Fails with [`StoreError::Duplicate`] if a registration with this roll number exists.
    async fn insert(&self, pending: &PendingStudent) -> Result<(), StoreError>;

    /// Registrations still in `pending` status matching `scope`.
    async fn list_pending(&self, scope: &ClassScope) -> Result<Vec<PendingStudent>, StoreError>;

    /// The registration for `roll_no` if it is still pending.
    async fn find_pending(&self, roll_no: &str) -> Result<Option<PendingStudent>, StoreError>;

    async fn mark_approved(&self, roll_no: &str) -> Result<bool, StoreError>;

    /// Delete a still-pending registration. Returns whether a row was removed.
    async fn delete_pending(&self, roll_no: &str) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait TeacherStore: Send + Sync {
    /// Fails with [`StoreError::Duplicate`] if the email is registered.
    async fn insert(&self, teacher: &Teacher) -> Result<(), StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Teacher>, StoreError>;
}
