//! Attendance recorder for the automated path: append-if-absent, never overwrite.

use std::sync::Arc;

use chrono::{Local, NaiveDate};

use crate::model::{AttendanceRecord, AttendanceStatus, Source};
use crate::store::{AttendanceStore, StoreError};

#[derive(Clone)]
pub struct AttendanceRecorder {
    store: Arc<dyn AttendanceStore>,
}

impl AttendanceRecorder {
    pub fn new(store: Arc<dyn AttendanceStore>) -> Self {
        Self { store }
    }

    /// Mark `roll_no` present on `date` unless a row for that day already exists.
    ///
    /// Returns `true` if a row was inserted. Relies on the store's
    /// `(roll_no, date)` uniqueness, so concurrent calls cannot double-insert.
    pub async fn record(&self, roll_no: &str, date: NaiveDate, source: Source) -> Result<bool, StoreError> {
        let record = AttendanceRecord {
            roll_no: roll_no.to_string(),
            date,
            status: AttendanceStatus::Present,
            time: Local::now().time(),
            source,
        };
        let inserted = self.store.insert_if_absent(&record).await?;
        if inserted {
            tracing::info!(roll_no, %date, source = source.as_str(), "attendance recorded");
        } else {
            tracing::debug!(roll_no, %date, "attendance already recorded");
        }
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryAttendance;
    use crate::testing::date;

    #[tokio::test]
    async fn test_record_is_idempotent() {
        let store = Arc::new(MemoryAttendance::new());
        let recorder = AttendanceRecorder::new(store.clone());
        let day = date("2025-07-22");

        assert!(recorder.record("R1", day, Source::Face).await.unwrap());
        assert!(!recorder.record("R1", day, Source::Face).await.unwrap());

        let rows = store.all();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, AttendanceStatus::Present);
        assert_eq!(rows[0].source, Source::Face);
    }

    #[tokio::test]
    async fn test_record_never_overwrites_manual_absent() {
        let store = Arc::new(MemoryAttendance::new());
        let day = date("2025-07-22");
        store
            .put(&AttendanceRecord {
                roll_no: "R1".into(),
                date: day,
                status: AttendanceStatus::Absent,
                time: Local::now().time(),
                source: Source::Manual,
            })
            .await
            .unwrap();

        let recorder = AttendanceRecorder::new(store.clone());
        assert!(!recorder.record("R1", day, Source::Face).await.unwrap());
        assert_eq!(store.all()[0].status, AttendanceStatus::Absent);
    }

    #[tokio::test]
    async fn test_record_separate_days() {
        let store = Arc::new(MemoryAttendance::new());
        let recorder = AttendanceRecorder::new(store.clone());
        assert!(recorder.record("R1", date("2025-07-22"), Source::Face).await.unwrap());
        assert!(recorder.record("R1", date("2025-07-23"), Source::Face).await.unwrap());
        assert_eq!(store.all().len(), 2);
    }
}
