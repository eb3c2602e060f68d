//! Upload pipeline: group photo + class scope -> matched roll numbers,
//! recorded attendance and an annotated photo.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use thiserror::Error;

use crate::annotate::ImageSink;
use crate::enhance::{enhance_or_original, PhotoEnhancer};
use crate::matcher::{match_faces, AcceptedMatch, EuclideanMatcher};
use crate::model::{ClassScope, Source};
use crate::oracle::{EmbeddingOracle, OracleError};
use crate::recorder::AttendanceRecorder;
use crate::roster::{RosterIndex, RosterIndexBuilder, DEFAULT_ORACLE_TIMEOUT};
use crate::store::{AttendanceStore, StoreError, StudentStore};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid upload: {0}")]
    InvalidInput(String),
    /// Detection on the group photo failed; nothing can be matched.
    #[error("face detection failed: {0}")]
    Oracle(#[from] OracleError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub image: Vec<u8>,
    pub scope: ClassScope,
    pub date: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct UploadOutcome {
    /// Matched roll numbers, in detection order.
    pub present: Vec<String>,
    pub matches: Vec<AcceptedMatch>,
    pub faces_detected: usize,
    /// How many matches produced a new row (the rest were already recorded).
    pub newly_recorded: usize,
    pub roster: RosterIndex,
}

pub struct AttendancePipeline {
    students: Arc<dyn StudentStore>,
    recorder: AttendanceRecorder,
    oracle: Arc<dyn EmbeddingOracle>,
    roster: RosterIndexBuilder,
    matcher: EuclideanMatcher,
    enhancer: Option<Arc<dyn PhotoEnhancer>>,
    sink: Option<Arc<dyn ImageSink>>,
    detect_timeout: Duration,
}

impl AttendancePipeline {
    pub fn new(
        students: Arc<dyn StudentStore>,
        attendance: Arc<dyn AttendanceStore>,
        oracle: Arc<dyn EmbeddingOracle>,
        photo_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            students,
            recorder: AttendanceRecorder::new(attendance),
            roster: RosterIndexBuilder::new(oracle.clone(), photo_root),
            oracle,
            matcher: EuclideanMatcher::default(),
            enhancer: None,
            sink: None,
            detect_timeout: DEFAULT_ORACLE_TIMEOUT,
        }
    }

    /// Per-call oracle timeout, for both reference encoding and detection.
    pub fn with_oracle_timeout(mut self, timeout: Duration) -> Self {
        self.roster = self.roster.with_timeout(timeout);
        self.detect_timeout = timeout;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.roster = self.roster.with_concurrency(concurrency);
        self
    }

    pub fn with_enhancer(mut self, enhancer: Arc<dyn PhotoEnhancer>) -> Self {
        self.enhancer = Some(enhancer);
        self
    }

    pub fn with_image_sink(mut self, sink: Arc<dyn ImageSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub async fn run(&self, request: UploadRequest) -> Result<UploadOutcome, PipelineError> {
        let UploadRequest { image, scope, date } = request;
        if image.is_empty() {
            return Err(PipelineError::InvalidInput("image is empty".into()));
        }

        let image = enhance_or_original(self.enhancer.as_deref(), image).await;
        let roster = self.roster.build_for_scope(self.students.as_ref(), &scope).await?;
        let known = roster.known_faces();

        let detected = match tokio::time::timeout(self.detect_timeout, self.oracle.detect(&image)).await {
            Ok(result) => result?,
            Err(_) => return Err(OracleError::Timeout(self.detect_timeout.as_millis() as u64).into()),
        };

        let matches = match_faces(&self.matcher, &known, &detected);
        tracing::info!(
            %date,
            faces = detected.len(),
            known = known.len(),
            matched = matches.len(),
            "group photo matched"
        );

        let mut newly_recorded = 0;
        for m in &matches {
            if self.recorder.record(&m.roll_no, date, Source::Face).await? {
                newly_recorded += 1;
            }
        }

        if let Some(sink) = &self.sink {
            if let Err(e) = sink.store_annotated(image, matches.clone()).await {
                tracing::warn!(error = %e, "annotated photo not saved");
            }
        }

        Ok(UploadOutcome {
            present: matches.iter().map(|m| m.roll_no.clone()).collect(),
            faces_detected: detected.len(),
            newly_recorded,
            matches,
            roster,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::AnnotateError;
    use crate::memory::{MemoryAttendance, MemoryStudents};
    use crate::model::AttendanceStatus;
    use crate::testing::{date, student, FakeOracle};
    use crate::types::{BoundingBox, DetectedFace, Embedding};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CapturingSink {
        saved: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl ImageSink for CapturingSink {
        async fn store_annotated(&self, _image: Vec<u8>, matches: Vec<AcceptedMatch>) -> Result<(), AnnotateError> {
            self.saved
                .lock()
                .unwrap()
                .push(matches.into_iter().map(|m| m.roll_no).collect());
            Ok(())
        }
    }

    struct BrokenSink;

    #[async_trait]
    impl ImageSink for BrokenSink {
        async fn store_annotated(&self, _: Vec<u8>, _: Vec<AcceptedMatch>) -> Result<(), AnnotateError> {
            Err(AnnotateError::WorkerGone)
        }
    }

    fn detected(x: f32, values: Vec<f32>) -> DetectedFace {
        DetectedFace {
            bbox: BoundingBox { x, y: 0.0, width: 10.0, height: 10.0 },
            signature: Embedding::new(values),
        }
    }

    fn classroom() -> (tempfile::TempDir, Arc<MemoryStudents>) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("images")).unwrap();
        std::fs::write(dir.path().join("images/R1.jpg"), b"ref-r1").unwrap();
        std::fs::write(dir.path().join("images/R2.jpg"), b"ref-r2").unwrap();
        let students = Arc::new(MemoryStudents::with(vec![student("R1"), student("R2")]));
        (dir, students)
    }

    fn oracle() -> FakeOracle {
        // S1 = [0, 0], S2 = [10, 0]. The group photo has one face 0.3 from S1
        // and one face 0.6 from S2.
        FakeOracle::new()
            .reference(b"ref-r1", vec![vec![0.0, 0.0]])
            .reference(b"ref-r2", vec![vec![10.0, 0.0]])
            .group(b"class", vec![detected(5.0, vec![0.3, 0.0]), detected(50.0, vec![10.0, 0.6])])
            .group(b"twice", vec![detected(5.0, vec![0.1, 0.0]), detected(50.0, vec![0.0, 0.1])])
    }

    fn request(image: &[u8]) -> UploadRequest {
        UploadRequest {
            image: image.to_vec(),
            scope: ClassScope::class("cs", "2", "dbms"),
            date: date("2025-07-22"),
        }
    }

    #[tokio::test]
    async fn test_end_to_end_only_close_face_is_present() {
        let (dir, students) = classroom();
        let attendance = Arc::new(MemoryAttendance::new());
        let sink = Arc::new(CapturingSink::default());
        let pipeline = AttendancePipeline::new(students, attendance.clone(), Arc::new(oracle()), dir.path())
            .with_image_sink(sink.clone());

        let outcome = pipeline.run(request(b"class")).await.unwrap();
        assert_eq!(outcome.present, vec!["R1"]);
        assert_eq!(outcome.faces_detected, 2);
        assert_eq!(outcome.newly_recorded, 1);
        assert_eq!(outcome.roster.included_count(), 2);

        let rows = attendance.all();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].roll_no, "R1");
        assert_eq!(rows[0].status, AttendanceStatus::Present);
        assert_eq!(rows[0].source, Source::Face);
        assert_eq!(*sink.saved.lock().unwrap(), vec![vec!["R1".to_string()]]);
    }

    #[tokio::test]
    async fn test_repeat_upload_same_day_is_idempotent() {
        let (dir, students) = classroom();
        let attendance = Arc::new(MemoryAttendance::new());
        let pipeline = AttendancePipeline::new(students, attendance.clone(), Arc::new(oracle()), dir.path());

        pipeline.run(request(b"class")).await.unwrap();
        let again = pipeline.run(request(b"class")).await.unwrap();
        assert_eq!(again.present, vec!["R1"]);
        assert_eq!(again.newly_recorded, 0);
        assert_eq!(attendance.all().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_faces_one_record() {
        let (dir, students) = classroom();
        let attendance = Arc::new(MemoryAttendance::new());
        let pipeline = AttendancePipeline::new(students, attendance.clone(), Arc::new(oracle()), dir.path());

        let outcome = pipeline.run(request(b"twice")).await.unwrap();
        assert_eq!(outcome.present, vec!["R1"]);
        assert_eq!(outcome.matches[0].bbox.x, 5.0);
        assert_eq!(attendance.all().len(), 1);
    }

    #[tokio::test]
    async fn test_no_faces_is_not_an_error() {
        let (dir, students) = classroom();
        let attendance = Arc::new(MemoryAttendance::new());
        let pipeline = AttendancePipeline::new(students, attendance.clone(), Arc::new(oracle()), dir.path())
            .with_image_sink(Arc::new(BrokenSink));

        let outcome = pipeline.run(request(b"empty room")).await.unwrap();
        assert!(outcome.present.is_empty());
        assert!(attendance.all().is_empty());
    }

    #[tokio::test]
    async fn test_group_detection_failure_fails_request() {
        let (dir, students) = classroom();
        let attendance = Arc::new(MemoryAttendance::new());
        let pipeline = AttendancePipeline::new(
            students,
            attendance.clone(),
            Arc::new(FakeOracle::new().failing()),
            dir.path(),
        );

        assert!(matches!(
            pipeline.run(request(b"class")).await,
            Err(PipelineError::Oracle(OracleError::Unreachable(_)))
        ));
        assert!(attendance.all().is_empty());
    }

    #[tokio::test]
    async fn test_empty_image_rejected_before_any_work() {
        let (dir, students) = classroom();
        let attendance = Arc::new(MemoryAttendance::new());
        let pipeline = AttendancePipeline::new(students, attendance.clone(), Arc::new(oracle()), dir.path());

        assert!(matches!(pipeline.run(request(b"")).await, Err(PipelineError::InvalidInput(_))));
        assert!(attendance.all().is_empty());
    }

    #[tokio::test]
    async fn test_detection_timeout() {
        let (dir, students) = classroom();
        let pipeline = AttendancePipeline::new(
            students,
            Arc::new(MemoryAttendance::new()),
            Arc::new(FakeOracle::new().delay(Duration::from_millis(200))),
            dir.path(),
        )
        .with_oracle_timeout(Duration::from_millis(20));

        let result = pipeline.run(request(b"class")).await;
        assert!(matches!(result, Err(PipelineError::Oracle(OracleError::Timeout(20)))));
    }
}
