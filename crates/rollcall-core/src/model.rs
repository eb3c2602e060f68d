//! Persistent entities: students, pending registrations, attendance rows, teachers.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// An enrolled student. `roll_no` is caller-assigned and unique across the roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub roll_no: String,
    pub name: String,
    pub photo_path: String,
    pub department_id: Option<String>,
    pub year: Option<String>,
    #[serde(default)]
    pub subject_ids: Vec<String>,
    pub registration_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingStatus {
    Pending,
    Approved,
}

impl PendingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            _ => None,
        }
    }
}

/// A self-registration awaiting review. Rejection deletes the row outright.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingStudent {
    pub roll_no: String,
    pub name: String,
    pub email: String,
    pub photo_path: String,
    pub department_id: Option<String>,
    pub year: Option<String>,
    #[serde(default)]
    pub subject_ids: Vec<String>,
    pub registration_date: NaiveDate,
    pub status: PendingStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "present" => Some(Self::Present),
            "absent" => Some(Self::Absent),
            _ => None,
        }
    }
}

/// Which path produced an attendance row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Face,
    Manual,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Face => "face",
            Self::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "face" => Some(Self::Face),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

/// At most one row exists per `(roll_no, date)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub roll_no: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub time: NaiveTime,
    pub source: Source,
}

/// Department / year / subject-set filter. `None` or an empty subject list
/// means "no filter" on that axis; subjects match on any overlap.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassScope {
    pub department_id: Option<String>,
    pub year: Option<String>,
    #[serde(default)]
    pub subject_ids: Vec<String>,
}

impl ClassScope {
    /// Scope for a single department/year/subject class.
    pub fn class(department: &str, year: &str, subject: &str) -> Self {
        Self {
            department_id: Some(department.to_string()),
            year: Some(year.to_string()),
            subject_ids: vec![subject.to_string()],
        }
    }

    pub fn matches(&self, department_id: Option<&str>, year: Option<&str>, subject_ids: &[String]) -> bool {
        if let Some(d) = self.department_id.as_deref() {
            if department_id != Some(d) {
                return false;
            }
        }
        if let Some(y) = self.year.as_deref() {
            if year != Some(y) {
                return false;
            }
        }
        self.subject_ids.is_empty() || subject_ids.iter().any(|s| self.subject_ids.contains(s))
    }

    pub fn contains(&self, student: &Student) -> bool {
        self.matches(student.department_id.as_deref(), student.year.as_deref(), &student.subject_ids)
    }

    pub fn contains_pending(&self, pending: &PendingStudent) -> bool {
        self.matches(pending.department_id.as_deref(), pending.year.as_deref(), &pending.subject_ids)
    }

    /// The classmates scope of a student: same department and year, any shared subject.
    ///
    /// `None` when the student lacks a department, a year or any subject. Such a
    /// student has no classmates, not every student.
    pub fn of_student(student: &Student) -> Option<Self> {
        if student.subject_ids.is_empty() {
            return None;
        }
        Some(Self {
            department_id: Some(student.department_id.clone()?),
            year: Some(student.year.clone()?),
            subject_ids: student.subject_ids.clone(),
        })
    }
}

/// A (department, year, subject) combination a teacher takes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDetail {
    pub department: String,
    pub year: String,
    pub subject: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Teacher {
    pub name: String,
    pub email: String,
    /// Argon2 PHC string. Never serialized to API callers.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub school: String,
    pub phone: String,
    pub class_details: Vec<ClassDetail>,
    pub registered_at: DateTime<Utc>,
}
