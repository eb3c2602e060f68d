//! Manual bulk attendance: authoritative overwrite of one date for one class.

use chrono::{Local, NaiveDate};
use serde::Serialize;

use crate::model::{AttendanceRecord, AttendanceStatus, ClassScope, Source};
use crate::store::{AttendanceStore, StoreError, StudentStore};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManualOutcome {
    pub present: Vec<String>,
    pub absent: Vec<String>,
}

/// Overwrite attendance for `date` across the roster of `scope`.
///
/// Existing rows for the roster on that date are deleted first. Every
/// supplied roll number is written present; the rest of the roster is written
/// absent. When `present` is empty no absent rows are written at all: this
/// mirrors the long-standing behaviour and is kept until product decides
/// otherwise.
pub async fn mark_manual(
    students: &dyn StudentStore,
    attendance: &dyn AttendanceStore,
    date: NaiveDate,
    scope: &ClassScope,
    present: &[String],
) -> Result<ManualOutcome, StoreError> {
    let roster: Vec<String> = students
        .find_by_scope(scope)
        .await?
        .into_iter()
        .map(|s| s.roll_no)
        .collect();

    let mut present_set: Vec<String> = Vec::with_capacity(present.len());
    for roll in present {
        if !present_set.contains(roll) {
            present_set.push(roll.clone());
        }
    }
    let absent: Vec<String> = roster
        .iter()
        .filter(|r| !present_set.contains(r))
        .cloned()
        .collect();

    let removed = attendance.delete_for_date(date, &roster).await?;
    tracing::info!(%date, removed, roster = roster.len(), "cleared attendance for manual entry");

    let time = Local::now().time();
    for roll in &present_set {
        attendance
            .put(&AttendanceRecord {
                roll_no: roll.clone(),
                date,
                status: AttendanceStatus::Present,
                time,
                source: Source::Manual,
            })
            .await?;
    }

    if !present_set.is_empty() {
        for roll in &absent {
            attendance
                .put(&AttendanceRecord {
                    roll_no: roll.clone(),
                    date,
                    status: AttendanceStatus::Absent,
                    time,
                    source: Source::Manual,
                })
                .await?;
        }
    } else {
        tracing::warn!(%date, "manual entry with no present students; absent rows not written");
    }

    Ok(ManualOutcome {
        present: present_set,
        absent,
    })
}
