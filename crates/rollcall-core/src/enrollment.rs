//! Self-registration lifecycle: pending -> approved (becomes a Student) or
//! rejected (deleted). Each transition emails the student.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use serde::Deserialize;
use thiserror::Error;

use crate::model::{ClassScope, PendingStatus, PendingStudent, Student};
use crate::notify::{self, Notifier};
use crate::oracle::EmbeddingOracle;
use crate::store::{PendingStore, StoreError, StudentStore};

const PHOTO_DIR: &str = "images";

#[derive(Error, Debug)]
pub enum EnrollmentError {
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("invalid roll number: {0}")]
    InvalidRollNo(String),
    #[error("pending student not found: {0}")]
    NotFound(String),
    #[error("reference photo rejected: {0}")]
    PhotoRejected(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("photo write failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationForm {
    pub roll_no: String,
    pub name: String,
    pub email: String,
    pub department: Option<String>,
    pub year: Option<String>,
    pub subject: Option<String>,
}

/// Class placement chosen by the reviewer; unset fields fall back to what
/// the student registered with.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Placement {
    pub department: Option<String>,
    pub year: Option<String>,
    pub subject: Option<String>,
}

pub struct Enrollment {
    students: Arc<dyn StudentStore>,
    pending: Arc<dyn PendingStore>,
    notifier: Arc<dyn Notifier>,
    data_dir: PathBuf,
    /// Set to require exactly one face in a reference photo at registration.
    strict_oracle: Option<Arc<dyn EmbeddingOracle>>,
}

impl Enrollment {
    pub fn new(
        students: Arc<dyn StudentStore>,
        pending: Arc<dyn PendingStore>,
        notifier: Arc<dyn Notifier>,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            students,
            pending,
            notifier,
            data_dir: data_dir.into(),
            strict_oracle: None,
        }
    }

    pub fn with_strict_reference_check(mut self, oracle: Arc<dyn EmbeddingOracle>) -> Self {
        self.strict_oracle = Some(oracle);
        self
    }

    pub async fn register(&self, form: RegistrationForm, photo: Vec<u8>) -> Result<PendingStudent, EnrollmentError> {
        let roll_no = required(&form.roll_no, "roll_no")?;
        let name = required(&form.name, "name")?;
        let email = required(&form.email, "email")?;
        if photo.is_empty() {
            return Err(EnrollmentError::MissingField("photo"));
        }
        if !is_safe_roll_no(roll_no) {
            return Err(EnrollmentError::InvalidRollNo(roll_no.to_string()));
        }
        if self.students.find(roll_no).await?.is_some() {
            return Err(StoreError::Duplicate(roll_no.to_string()).into());
        }

        self.check_reference_photo(roll_no, &photo).await?;

        let relative = format!("{PHOTO_DIR}/{roll_no}.jpg");
        let pending = PendingStudent {
            roll_no: roll_no.to_string(),
            name: name.to_string(),
            email: email.to_string(),
            photo_path: relative.clone(),
            department_id: non_empty(form.department),
            year: non_empty(form.year),
            subject_ids: non_empty(form.subject).into_iter().collect(),
            registration_date: Local::now().date_naive(),
            status: PendingStatus::Pending,
        };
        // The pending row claims the roll number before the photo slot is touched.
        self.pending.insert(&pending).await?;
        if let Err(e) = self.save_photo(&relative, &photo).await {
            self.pending.delete_pending(roll_no).await?;
            return Err(e.into());
        }
        tracing::info!(roll_no, "registration pending approval");

        notify::dispatch(
            &self.notifier,
            notify::registration_received(&pending.email, &pending.name, &pending.roll_no),
        );
        Ok(pending)
    }

    pub async fn approve(&self, roll_no: &str, placement: Placement) -> Result<Student, EnrollmentError> {
        let pending = self
            .pending
            .find_pending(roll_no)
            .await?
            .ok_or_else(|| EnrollmentError::NotFound(roll_no.to_string()))?;

        let department_id = non_empty(placement.department).or(pending.department_id.clone());
        let year = non_empty(placement.year).or(pending.year.clone());
        let subject_ids = match non_empty(placement.subject) {
            Some(s) => vec![s],
            None => pending.subject_ids.clone(),
        };

        let student = Student {
            roll_no: pending.roll_no.clone(),
            name: pending.name.clone(),
            photo_path: pending.photo_path.clone(),
            department_id,
            year,
            subject_ids,
            registration_date: pending.registration_date,
            email: Some(pending.email.clone()),
        };
        self.students.insert(&student).await?;
        self.pending.mark_approved(roll_no).await?;
        tracing::info!(roll_no, "registration approved");

        notify::dispatch(
            &self.notifier,
            notify::registration_approved(
                &pending.email,
                &pending.name,
                roll_no,
                student.department_id.as_deref().unwrap_or("-"),
                student.year.as_deref().unwrap_or("-"),
                &student.subject_ids.join(", "),
            ),
        );
        Ok(student)
    }

    pub async fn reject(&self, roll_no: &str, reason: Option<&str>) -> Result<(), EnrollmentError> {
        let pending = self
            .pending
            .find_pending(roll_no)
            .await?
            .ok_or_else(|| EnrollmentError::NotFound(roll_no.to_string()))?;

        let removed = self.pending.delete_pending(roll_no).await?;
        tracing::info!(roll_no, removed, "registration rejected");

        let reason = reason.filter(|r| !r.trim().is_empty()).unwrap_or("No reason provided");
        notify::dispatch(
            &self.notifier,
            notify::registration_rejected(&pending.email, &pending.name, roll_no, reason),
        );
        Ok(())
    }

    pub async fn list_pending(&self, scope: &ClassScope) -> Result<Vec<PendingStudent>, EnrollmentError> {
        Ok(self.pending.list_pending(scope).await?)
    }

    async fn save_photo(&self, relative: &str, photo: &[u8]) -> std::io::Result<()> {
        tokio::fs::create_dir_all(self.data_dir.join(PHOTO_DIR)).await?;
        tokio::fs::write(self.data_dir.join(relative), photo).await
    }

    async fn check_reference_photo(&self, roll_no: &str, photo: &[u8]) -> Result<(), EnrollmentError> {
        let Some(oracle) = &self.strict_oracle else {
            return Ok(());
        };
        match oracle.encode_reference(photo).await {
            Ok(faces) if faces.len() == 1 => Ok(()),
            Ok(faces) => Err(EnrollmentError::PhotoRejected(format!(
                "expected exactly one face, found {}",
                faces.len()
            ))),
            Err(e) => {
                tracing::warn!(roll_no, error = %e, "reference photo check unavailable; accepting");
                Ok(())
            }
        }
    }
}

fn required<'a>(value: &'a str, field: &'static str) -> Result<&'a str, EnrollmentError> {
    let v = value.trim();
    if v.is_empty() {
        Err(EnrollmentError::MissingField(field))
    } else {
        Ok(v)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Roll numbers double as photo file names.
fn is_safe_roll_no(roll_no: &str) -> bool {
    roll_no
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !roll_no.starts_with('.')
}
