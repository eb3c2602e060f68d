//! Read-side aggregation: day sheets, per-student history, class summaries.
//!
//! The free functions are pure; [`Reports`] wires them to the stores.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;

use crate::model::{AttendanceRecord, AttendanceStatus, ClassScope, Source, Student};
use crate::store::{AttendanceStore, StoreError, StudentStore};

/// Below this percentage a student is flagged for a low-attendance notice.
pub const DEFAULT_LOW_ATTENDANCE_PERCENT: u32 = 75;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DayStatus {
    Present,
    Absent,
    NotMarked,
}

impl From<AttendanceStatus> for DayStatus {
    fn from(s: AttendanceStatus) -> Self {
        match s {
            AttendanceStatus::Present => Self::Present,
            AttendanceStatus::Absent => Self::Absent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DaySheetRow {
    #[serde(flatten)]
    pub student: Student,
    pub status: DayStatus,
    pub source: Option<Source>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub date: NaiveDate,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentHistory {
    #[serde(flatten)]
    pub student: Student,
    pub attendance: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub roll_no: String,
    pub name: String,
    #[serde(skip)]
    pub email: Option<String>,
    pub present: u32,
    pub absent: u32,
    pub total_days: u32,
    pub percentage: u32,
}

/// Distinct dates on which any of `records` was taken, ascending.
pub fn class_dates(records: &[AttendanceRecord]) -> Vec<NaiveDate> {
    records
        .iter()
        .map(|r| r.date)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Whole-number percentage, rounding halves to even; 0 when `total` is 0.
pub fn percentage(present: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    (f64::from(present) * 100.0 / f64::from(total)).round_ties_even() as u32
}

/// Per-student counts over the class dates found in `records`.
///
/// Dates before a student's registration date count for neither numerator nor
/// denominator. A class date with no row for the student counts as absent.
pub fn summarize(students: &[Student], records: &[AttendanceRecord]) -> Vec<SummaryRow> {
    let dates = class_dates(records);

    let mut by_student: HashMap<&str, HashMap<NaiveDate, AttendanceStatus>> = HashMap::new();
    for r in records {
        by_student
            .entry(r.roll_no.as_str())
            .or_default()
            .insert(r.date, r.status);
    }

    students
        .iter()
        .map(|s| {
            let own = by_student.get(s.roll_no.as_str());
            let mut present = 0;
            let mut total = 0;
            for d in dates.iter().filter(|d| **d >= s.registration_date) {
                total += 1;
                if own.and_then(|m| m.get(d)) == Some(&AttendanceStatus::Present) {
                    present += 1;
                }
            }
            SummaryRow {
                roll_no: s.roll_no.clone(),
                name: s.name.clone(),
                email: s.email.clone(),
                present,
                absent: total - present,
                total_days: total,
                percentage: percentage(present, total),
            }
        })
        .collect()
}

/// One student's status on every class date since registration.
///
/// `class_records` are the rows of the student's classmates (the student included).
pub fn history(student: &Student, class_records: &[AttendanceRecord]) -> StudentHistory {
    let own: HashMap<NaiveDate, AttendanceStatus> = class_records
        .iter()
        .filter(|r| r.roll_no == student.roll_no)
        .map(|r| (r.date, r.status))
        .collect();

    let attendance = class_dates(class_records)
        .into_iter()
        .filter(|d| *d >= student.registration_date)
        .map(|date| HistoryEntry {
            date,
            status: match own.get(&date) {
                Some(AttendanceStatus::Present) => AttendanceStatus::Present,
                _ => AttendanceStatus::Absent,
            },
        })
        .collect();

    StudentHistory {
        student: student.clone(),
        attendance,
    }
}

/// Roster with each student's status on one day.
pub fn day_sheet(students: &[Student], day_records: &[AttendanceRecord]) -> Vec<DaySheetRow> {
    let marks: HashMap<&str, &AttendanceRecord> =
        day_records.iter().map(|r| (r.roll_no.as_str(), r)).collect();
    students
        .iter()
        .map(|s| match marks.get(s.roll_no.as_str()) {
            Some(r) => DaySheetRow {
                student: s.clone(),
                status: r.status.into(),
                source: Some(r.source),
            },
            None => DaySheetRow {
                student: s.clone(),
                status: DayStatus::NotMarked,
                source: None,
            },
        })
        .collect()
}

/// Rows strictly below `threshold` percent for students with an email address.
pub fn low_attendance(summary: &[SummaryRow], threshold: u32) -> Vec<SummaryRow> {
    summary
        .iter()
        .filter(|row| row.total_days > 0 && row.percentage < threshold && row.email.is_some())
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct DayStatusMap {
    pub students: Vec<Student>,
    pub attendance: HashMap<String, AttendanceStatus>,
}

/// Store-backed reporting queries.
#[derive(Clone)]
pub struct Reports {
    students: Arc<dyn StudentStore>,
    attendance: Arc<dyn AttendanceStore>,
}

impl Reports {
    pub fn new(students: Arc<dyn StudentStore>, attendance: Arc<dyn AttendanceStore>) -> Self {
        Self { students, attendance }
    }

    /// Students in `scope` marked present on `date`.
    pub async fn present_on(&self, date: NaiveDate, scope: &ClassScope) -> Result<Vec<Student>, StoreError> {
        let present: Vec<String> = self
            .attendance
            .find_by_date(date)
            .await?
            .into_iter()
            .filter(|r| r.status == AttendanceStatus::Present)
            .map(|r| r.roll_no)
            .collect();
        let students = self.students.find_by_scope(scope).await?;
        Ok(students
            .into_iter()
            .filter(|s| present.contains(&s.roll_no))
            .collect())
    }

    pub async fn day_sheet(&self, date: NaiveDate, scope: &ClassScope) -> Result<Vec<DaySheetRow>, StoreError> {
        let students = self.students.find_by_scope(scope).await?;
        let records = self.attendance.find_by_date(date).await?;
        Ok(day_sheet(&students, &records))
    }

    pub async fn day_status_map(&self, date: NaiveDate, scope: &ClassScope) -> Result<DayStatusMap, StoreError> {
        let students = self.students.find_by_scope(scope).await?;
        let attendance = self
            .attendance
            .find_by_date(date)
            .await?
            .into_iter()
            .filter(|r| students.iter().any(|s| s.roll_no == r.roll_no))
            .map(|r| (r.roll_no, r.status))
            .collect();
        Ok(DayStatusMap { students, attendance })
    }

    pub async fn history(&self, roll_no: &str) -> Result<StudentHistory, StoreError> {
        let student = self
            .students
            .find(roll_no)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("student {roll_no}")))?;
        let classmates = match ClassScope::of_student(&student) {
            Some(scope) => self.roll_nos(&scope).await?,
            None => Vec::new(),
        };
        let records = self.attendance.find_by_rolls(&classmates).await?;
        Ok(history(&student, &records))
    }

    pub async fn summary(&self, scope: &ClassScope) -> Result<Vec<SummaryRow>, StoreError> {
        let students = self.students.find_by_scope(scope).await?;
        let rolls: Vec<String> = students.iter().map(|s| s.roll_no.clone()).collect();
        let records = self.attendance.find_by_rolls(&rolls).await?;
        Ok(summarize(&students, &records))
    }

    pub async fn low_attendance(&self, scope: &ClassScope, threshold: u32) -> Result<Vec<SummaryRow>, StoreError> {
        Ok(low_attendance(&self.summary(scope).await?, threshold))
    }

    async fn roll_nos(&self, scope: &ClassScope) -> Result<Vec<String>, StoreError> {
        Ok(self
            .students
            .find_by_scope(scope)
            .await?
            .into_iter()
            .map(|s| s.roll_no)
            .collect())
    }
}
