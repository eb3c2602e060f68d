//! In-process store implementations, used by tests and local tooling.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::model::{AttendanceRecord, ClassScope, PendingStatus, PendingStudent, Student, Teacher};
use crate::store::{AttendanceStore, PendingStore, StoreError, StudentStore, TeacherStore};

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    m.lock().map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
}

#[derive(Default)]
pub struct MemoryStudents {
    rows: Mutex<Vec<Student>>,
}

impl MemoryStudents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(students: Vec<Student>) -> Self {
        Self {
            rows: Mutex::new(students),
        }
    }
}

#[async_trait]
impl StudentStore for MemoryStudents {
    async fn find_by_scope(&self, scope: &ClassScope) -> Result<Vec<Student>, StoreError> {
        let rows = lock(&self.rows)?;
        Ok(rows.iter().filter(|s| scope.contains(s)).cloned().collect())
    }

    async fn find(&self, roll_no: &str) -> Result<Option<Student>, StoreError> {
        let rows = lock(&self.rows)?;
        Ok(rows.iter().find(|s| s.roll_no == roll_no).cloned())
    }

    async fn insert(&self, student: &Student) -> Result<(), StoreError> {
        let mut rows = lock(&self.rows)?;
        if rows.iter().any(|s| s.roll_no == student.roll_no) {
            return Err(StoreError::Duplicate(student.roll_no.clone()));
        }
        rows.push(student.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryAttendance {
    rows: Mutex<Vec<AttendanceRecord>>,
}

impl MemoryAttendance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored row, in insertion order.
    pub fn all(&self) -> Vec<AttendanceRecord> {
        self.rows.lock().map(|rows| rows.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AttendanceStore for MemoryAttendance {
    async fn insert_if_absent(&self, record: &AttendanceRecord) -> Result<bool, StoreError> {
        let mut rows = lock(&self.rows)?;
        if rows
            .iter()
            .any(|r| r.roll_no == record.roll_no && r.date == record.date)
        {
            return Ok(false);
        }
        rows.push(record.clone());
        Ok(true)
    }

    async fn put(&self, record: &AttendanceRecord) -> Result<(), StoreError> {
        let mut rows = lock(&self.rows)?;
        rows.retain(|r| !(r.roll_no == record.roll_no && r.date == record.date));
        rows.push(record.clone());
        Ok(())
    }

    async fn delete_for_date(&self, date: NaiveDate, roll_nos: &[String]) -> Result<u64, StoreError> {
        let mut rows = lock(&self.rows)?;
        let before = rows.len();
        rows.retain(|r| !(r.date == date && roll_nos.contains(&r.roll_no)));
        Ok((before - rows.len()) as u64)
    }

    async fn find_by_date(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>, StoreError> {
        let rows = lock(&self.rows)?;
        Ok(rows.iter().filter(|r| r.date == date).cloned().collect())
    }

    async fn find_by_rolls(&self, roll_nos: &[String]) -> Result<Vec<AttendanceRecord>, StoreError> {
        let rows = lock(&self.rows)?;
        let mut out: Vec<AttendanceRecord> = rows
            .iter()
            .filter(|r| roll_nos.contains(&r.roll_no))
            .cloned()
            .collect();
        out.sort_by_key(|r| r.date);
        Ok(out)
    }
}

#[derive(Default)]
pub struct MemoryPending {
    rows: Mutex<Vec<PendingStudent>>,
}

impl MemoryPending {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<PendingStudent> {
        self.rows.lock().map(|rows| rows.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PendingStore for MemoryPending {
    async fn insert(&self, pending: &PendingStudent) -> Result<(), StoreError> {
        let mut rows = lock(&self.rows)?;
        if rows.iter().any(|p| p.roll_no == pending.roll_no) {
            return Err(StoreError::Duplicate(pending.roll_no.clone()));
        }
        rows.push(pending.clone());
        Ok(())
    }

    async fn list_pending(&self, scope: &ClassScope) -> Result<Vec<PendingStudent>, StoreError> {
        let rows = lock(&self.rows)?;
        Ok(rows
            .iter()
            .filter(|p| p.status == PendingStatus::Pending && scope.contains_pending(p))
            .cloned()
            .collect())
    }

    async fn find_pending(&self, roll_no: &str) -> Result<Option<PendingStudent>, StoreError> {
        let rows = lock(&self.rows)?;
        Ok(rows
            .iter()
            .find(|p| p.roll_no == roll_no && p.status == PendingStatus::Pending)
            .cloned())
    }

    async fn mark_approved(&self, roll_no: &str) -> Result<bool, StoreError> {
        let mut rows = lock(&self.rows)?;
        match rows.iter_mut().find(|p| p.roll_no == roll_no) {
            Some(p) => {
                p.status = PendingStatus::Approved;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_pending(&self, roll_no: &str) -> Result<bool, StoreError> {
        let mut rows = lock(&self.rows)?;
        let before = rows.len();
        rows.retain(|p| !(p.roll_no == roll_no && p.status == PendingStatus::Pending));
        Ok(rows.len() < before)
    }
}

#[derive(Default)]
pub struct MemoryTeachers {
    rows: Mutex<Vec<Teacher>>,
}

impl MemoryTeachers {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TeacherStore for MemoryTeachers {
    async fn insert(&self, teacher: &Teacher) -> Result<(), StoreError> {
        let mut rows = lock(&self.rows)?;
        if rows.iter().any(|t| t.email == teacher.email) {
            return Err(StoreError::Duplicate(teacher.email.clone()));
        }
        rows.push(teacher.clone());
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Teacher>, StoreError> {
        let rows = lock(&self.rows)?;
        Ok(rows.iter().find(|t| t.email == email).cloned())
    }
}
