//! Axum router and handlers.

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Local, NaiveDate};
use rollcall_core::accounts::TeacherSignup;
use rollcall_core::enrollment::{Placement, RegistrationForm};
use rollcall_core::manual::mark_manual;
use rollcall_core::notify::{self, low_attendance_warning};
use rollcall_core::{ClassScope, UploadRequest};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::state::AppState;

type Shared = State<Arc<AppState>>;
type ApiResult<T> = Result<T, ApiError>;

const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/upload", post(upload))
        .route("/image", get(last_attendance_image))
        .route("/image/{filename}", get(student_image))
        .route("/register", post(register))
        .route("/pending", get(pending))
        .route("/approve", post(approve))
        .route("/reject", post(reject))
        .route("/teacher/register", post(teacher_register))
        .route("/teacher/login", post(teacher_login))
        .route("/students", get(students))
        .route("/students/by-class", get(students_by_class))
        .route("/attendance", get(attendance_on_date))
        .route("/attendance/by-date", get(attendance_by_date))
        .route("/attendance/by-date-detailed", get(attendance_by_date_detailed))
        .route("/attendance/full-history/{roll_no}", get(full_history))
        .route("/attendance/summary", get(summary))
        .route("/attendance/manual", post(manual))
        .route("/attendance/low-attendance/notify", post(notify_low_attendance))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Class filter carried in query strings (`department`, `year`, `subject`).
#[derive(Debug, Default, Deserialize)]
struct ClassQuery {
    department: Option<String>,
    year: Option<String>,
    subject: Option<String>,
    date: Option<String>,
    teacher_email: Option<String>,
    threshold: Option<u32>,
}

impl ClassQuery {
    /// Any subset of the filter; absent fields do not filter.
    fn scope(&self) -> ClassScope {
        ClassScope {
            department_id: present(&self.department),
            year: present(&self.year),
            subject_ids: present(&self.subject).into_iter().collect(),
        }
    }

    /// A single class: department, year and subject all required.
    fn class(&self) -> ApiResult<ClassScope> {
        match (present(&self.department), present(&self.year), present(&self.subject)) {
            (Some(d), Some(y), Some(s)) => Ok(ClassScope::class(&d, &y, &s)),
            _ => Err(ApiError::bad_request("department, year and subject are required")),
        }
    }

    fn date(&self) -> ApiResult<NaiveDate> {
        parse_date(self.date.as_deref())
    }
}

fn present(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

fn parse_date(raw: Option<&str>) -> ApiResult<NaiveDate> {
    let raw = raw
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .ok_or_else(|| ApiError::bad_request("date is required"))?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ApiError::bad_request(format!("malformed date {raw:?}, expected YYYY-MM-DD")))
}

async fn home() -> &'static str {
    "Rollcall attendance service running"
}

/// Multipart fields collected up front so order does not matter.
#[derive(Default)]
struct Form {
    file: Option<Vec<u8>>,
    text: std::collections::HashMap<String, String>,
}

impl Form {
    async fn read(mut multipart: Multipart, file_fields: &[&str]) -> ApiResult<Self> {
        let mut form = Form::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(format!("malformed multipart body: {e}")))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if file_fields.contains(&name.as_str()) {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("reading {name}: {e}")))?;
                if !bytes.is_empty() {
                    form.file = Some(bytes.to_vec());
                }
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("reading {name}: {e}")))?;
                form.text.insert(name, value);
            }
        }
        Ok(form)
    }

    fn get(&self, key: &str) -> Option<String> {
        present(&self.text.get(key).cloned())
    }

    fn require(&self, key: &str) -> ApiResult<String> {
        self.get(key).ok_or_else(|| ApiError::bad_request(format!("missing field: {key}")))
    }
}

async fn upload(State(state): Shared, multipart: Multipart) -> ApiResult<Json<Value>> {
    let form = Form::read(multipart, &["file", "image"]).await?;
    let image = form.file.clone().ok_or_else(|| ApiError::bad_request("missing field: file"))?;
    let department = form.require("department_id")?;
    let year = form.require("year")?;
    let subject_ids: Vec<String> = serde_json::from_str(&form.require("subject_ids")?)
        .map_err(|_| ApiError::bad_request("subject_ids must be a JSON array of strings"))?;
    let date = parse_date(form.get("date").as_deref())?;

    let info = state.imaging.validate(image.clone()).await?;
    let request_id = uuid::Uuid::new_v4();
    tracing::info!(%request_id, %date, width = info.width, height = info.height, "attendance upload");

    let outcome = state
        .pipeline
        .run(UploadRequest {
            image,
            scope: ClassScope {
                department_id: Some(department),
                year: Some(year),
                subject_ids,
            },
            date,
        })
        .await?;

    for slot in outcome.roster.skipped() {
        tracing::info!(%request_id, roll_no = %slot.roll_no, entry = ?slot.entry, "student not indexed");
    }
    for slot in outcome.roster.ambiguous() {
        tracing::warn!(%request_id, roll_no = %slot.roll_no, faces = slot.reference_faces, "matched against first of several reference faces");
    }

    Ok(Json(json!({
        "present": outcome.present,
        "count": outcome.present.len(),
        "timestamp": Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
    })))
}

async fn last_attendance_image(State(state): Shared) -> ApiResult<impl IntoResponse> {
    let bytes = tokio::fs::read(&state.last_attendance)
        .await
        .map_err(|_| ApiError::NotFound("Marked image not found".into()))?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], bytes))
}

async fn student_image(State(state): Shared, Path(filename): Path<String>) -> ApiResult<impl IntoResponse> {
    if filename.is_empty() || filename.contains(['/', '\\']) || filename.starts_with('.') {
        return Err(ApiError::NotFound(format!("image {filename} not found")));
    }
    let bytes = tokio::fs::read(state.images_dir.join(&filename))
        .await
        .map_err(|_| ApiError::NotFound(format!("image {filename} not found")))?;
    let content_type = match filename.rsplit('.').next().map(str::to_ascii_lowercase).as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    };
    Ok(([(header::CONTENT_TYPE, content_type)], bytes))
}

async fn register(State(state): Shared, multipart: Multipart) -> ApiResult<impl IntoResponse> {
    let form = Form::read(multipart, &["photo"]).await?;
    let photo = form.file.clone().ok_or_else(|| ApiError::bad_request("missing field: photo"))?;
    state.imaging.validate(photo.clone()).await?;

    let registration = RegistrationForm {
        roll_no: form.require("roll_no")?,
        name: form.require("name")?,
        email: form.require("email")?,
        department: form.get("department"),
        year: form.get("year"),
        subject: form.get("subject"),
    };
    let pending = state.enrollment.register(registration, photo).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Registration submitted. Await approval.",
            "roll_no": pending.roll_no,
        })),
    ))
}

async fn pending(State(state): Shared, Query(q): Query<ClassQuery>) -> ApiResult<Json<Value>> {
    let records = state.enrollment.list_pending(&q.scope()).await?;
    Ok(Json(json!(records)))
}

#[derive(Deserialize)]
struct ApproveBody {
    roll_no: String,
    #[serde(flatten)]
    placement: Placement,
}

async fn approve(State(state): Shared, Json(body): Json<ApproveBody>) -> ApiResult<Json<Value>> {
    if body.roll_no.trim().is_empty() {
        return Err(ApiError::bad_request("roll_no is required"));
    }
    let student = state.enrollment.approve(body.roll_no.trim(), body.placement).await?;
    Ok(Json(json!({
        "message": format!("Student {} approved", student.roll_no),
        "student": student,
    })))
}

#[derive(Deserialize)]
struct RejectBody {
    roll_no: String,
    reason: Option<String>,
}

async fn reject(State(state): Shared, Json(body): Json<RejectBody>) -> ApiResult<Json<Value>> {
    if body.roll_no.trim().is_empty() {
        return Err(ApiError::bad_request("roll_no is required"));
    }
    state
        .enrollment
        .reject(body.roll_no.trim(), body.reason.as_deref())
        .await?;
    Ok(Json(json!({ "message": format!("Student {} rejected", body.roll_no.trim()) })))
}

async fn teacher_register(State(state): Shared, Json(signup): Json<TeacherSignup>) -> ApiResult<impl IntoResponse> {
    let teacher = state.accounts.register(signup).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Teacher registered successfully", "email": teacher.email })),
    ))
}

#[derive(Deserialize)]
struct LoginBody {
    email: String,
    password: String,
}

async fn teacher_login(State(state): Shared, Json(body): Json<LoginBody>) -> ApiResult<Json<Value>> {
    let teacher = state.accounts.login(body.email.trim(), &body.password).await?;
    Ok(Json(json!({ "message": "Login successful", "teacher": teacher })))
}

async fn students(State(state): Shared, Query(q): Query<ClassQuery>) -> ApiResult<Json<Value>> {
    let students = state.students.find_by_scope(&q.scope()).await?;
    Ok(Json(json!(students)))
}

async fn students_by_class(State(state): Shared, Query(q): Query<ClassQuery>) -> ApiResult<Json<Value>> {
    let students = state.students.find_by_scope(&q.class()?).await?;
    Ok(Json(json!({ "students": students })))
}

async fn attendance_on_date(State(state): Shared, Query(q): Query<ClassQuery>) -> ApiResult<Json<Value>> {
    let present = state.reports.present_on(q.date()?, &q.scope()).await?;
    Ok(Json(json!(present)))
}

async fn attendance_by_date(State(state): Shared, Query(q): Query<ClassQuery>) -> ApiResult<Json<Value>> {
    let date = q.date()?;
    let map = state.reports.day_status_map(date, &q.class()?).await?;
    Ok(Json(json!(map)))
}

async fn attendance_by_date_detailed(State(state): Shared, Query(q): Query<ClassQuery>) -> ApiResult<Json<Value>> {
    let date = q.date()?;
    let rows = state.reports.day_sheet(date, &q.class()?).await?;
    Ok(Json(json!({ "students": rows })))
}

async fn full_history(State(state): Shared, Path(roll_no): Path<String>) -> ApiResult<Json<Value>> {
    let history = state.reports.history(&roll_no).await?;
    Ok(Json(json!(history)))
}

async fn summary(State(state): Shared, Query(q): Query<ClassQuery>) -> ApiResult<Json<Value>> {
    let scope = q.class()?;
    if let Some(email) = present(&q.teacher_email) {
        tracing::debug!(teacher = %email, "summary requested");
    }
    let rows = state.reports.summary(&scope).await?;
    Ok(Json(json!(rows)))
}

#[derive(Deserialize)]
struct ManualBody {
    date: Option<String>,
    roll_nos: Option<Vec<String>>,
    department: Option<String>,
    year: Option<String>,
    subject: Option<String>,
}

async fn manual(State(state): Shared, Json(body): Json<ManualBody>) -> ApiResult<Json<Value>> {
    let date = parse_date(body.date.as_deref())?;
    let roll_nos = body
        .roll_nos
        .ok_or_else(|| ApiError::bad_request("roll_nos must be a list"))?;
    let scope = ClassQuery {
        department: body.department,
        year: body.year,
        subject: body.subject,
        ..ClassQuery::default()
    }
    .class()?;

    let outcome = mark_manual(state.students.as_ref(), state.attendance.as_ref(), date, &scope, &roll_nos).await?;
    Ok(Json(json!({
        "message": "Manual attendance marked.",
        "present": outcome.present,
        "absent": outcome.absent,
    })))
}

async fn notify_low_attendance(State(state): Shared, Query(q): Query<ClassQuery>) -> ApiResult<Json<Value>> {
    let scope = q.class()?;
    let threshold = q.threshold.unwrap_or(state.low_attendance_threshold);
    let flagged = state.reports.low_attendance(&scope, threshold).await?;

    let mut notified = Vec::with_capacity(flagged.len());
    for row in flagged {
        if let Some(email) = row.email.as_deref() {
            notify::dispatch(
                &state.notifier,
                low_attendance_warning(email, &row.name, row.percentage, threshold),
            );
            notified.push(json!({ "roll_no": row.roll_no, "percentage": row.percentage }));
        }
    }
    tracing::info!(count = notified.len(), threshold, "low-attendance warnings queued");
    Ok(Json(json!({ "threshold": threshold, "notified": notified })))
}
