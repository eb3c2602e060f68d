//! Outbound notifications. Delivery is fire-and-forget: a failed send is
//! logged and never fails the request that triggered it.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("delivery failed: {0}")]
    Delivery(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &Notification) -> Result<(), NotifyError>;
}

/// Send `message` on a background task.
pub fn dispatch(notifier: &Arc<dyn Notifier>, message: Notification) {
    let notifier = Arc::clone(notifier);
    tokio::spawn(async move {
        if let Err(e) = notifier.send(&message).await {
            tracing::warn!(to = %message.to, subject = %message.subject, error = %e, "notification not delivered");
        }
    });
}

/// Stand-in used when no mail transport is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &Notification) -> Result<(), NotifyError> {
        tracing::info!(to = %message.to, subject = %message.subject, "notification (mail transport disabled)");
        Ok(())
    }
}

pub fn registration_received(to: &str, name: &str, roll_no: &str) -> Notification {
    Notification {
        to: to.to_string(),
        subject: "Registration Received - Pending Approval".into(),
        body: format!(
            "Hello {name},\n\nYour registration (Roll No: {roll_no}) has been received.\n\n\
             Please wait while the teacher approves your request.\n\nThank you!\n"
        ),
    }
}

pub fn registration_approved(
    to: &str,
    name: &str,
    roll_no: &str,
    department: &str,
    year: &str,
    subject: &str,
) -> Notification {
    Notification {
        to: to.to_string(),
        subject: "Registration Approved".into(),
        body: format!(
            "Hello {name},\n\nYour registration (Roll No: {roll_no}) has been approved!\n\n\
             Class Info:\nDepartment: {department}\nYear: {year}\nSubject: {subject}\n\nThank you.\n"
        ),
    }
}

pub fn registration_rejected(to: &str, name: &str, roll_no: &str, reason: &str) -> Notification {
    Notification {
        to: to.to_string(),
        subject: "Registration Rejected".into(),
        body: format!(
            "Hello {name},\n\nYour registration (Roll No: {roll_no}) has been rejected.\n\n\
             Reason: {reason}\n\nIf you believe this is a mistake, please contact your teacher.\n\n\
             Regards,\nAttendance Office\n"
        ),
    }
}

pub fn low_attendance_warning(to: &str, name: &str, percentage: u32, threshold: u32) -> Notification {
    Notification {
        to: to.to_string(),
        subject: "Low Attendance Warning".into(),
        body: format!(
            "Dear {name},\n\nYour current attendance is {percentage}%, which is below the required \
             {threshold}% threshold.\n\nPlease ensure regular attendance in future classes.\n\n\
             Regards,\nAttendance Office\n"
        ),
    }
}
