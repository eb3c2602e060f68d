use std::path::PathBuf;
use std::sync::Arc;

use rollcall_core::accounts::Accounts;
use rollcall_core::enhance::PhotoEnhancer;
use rollcall_core::enrollment::Enrollment;
use rollcall_core::notify::Notifier;
use rollcall_core::report::Reports;
use rollcall_core::{AttendancePipeline, AttendanceStore, EmbeddingOracle, PendingStore, StudentStore, TeacherStore};

use crate::config::Config;
use crate::imaging::ImagingHandle;

/// Everything a handler can reach. Built once at startup, shared as `Arc<AppState>`.
pub struct AppState {
    pub students: Arc<dyn StudentStore>,
    pub attendance: Arc<dyn AttendanceStore>,
    pub pipeline: AttendancePipeline,
    pub enrollment: Enrollment,
    pub accounts: Accounts,
    pub reports: Reports,
    pub imaging: ImagingHandle,
    pub notifier: Arc<dyn Notifier>,
    pub images_dir: PathBuf,
    pub last_attendance: PathBuf,
    pub low_attendance_threshold: u32,
}

/// Concrete collaborators the daemon wires into the core services.
pub struct Backends<S> {
    pub store: Arc<S>,
    pub oracle: Arc<dyn EmbeddingOracle>,
    pub enhancer: Option<Arc<dyn PhotoEnhancer>>,
    pub notifier: Arc<dyn Notifier>,
    pub imaging: ImagingHandle,
}

impl AppState {
    pub fn new<S>(config: &Config, backends: Backends<S>) -> Self
    where
        S: StudentStore + AttendanceStore + PendingStore + TeacherStore + 'static,
    {
        let Backends {
            store,
            oracle,
            enhancer,
            notifier,
            imaging,
        } = backends;
        let students: Arc<dyn StudentStore> = store.clone();
        let attendance: Arc<dyn AttendanceStore> = store.clone();
        let pending: Arc<dyn PendingStore> = store.clone();
        let teachers: Arc<dyn TeacherStore> = store;

        let mut pipeline = AttendancePipeline::new(students.clone(), attendance.clone(), oracle.clone(), &config.data_dir)
            .with_oracle_timeout(config.oracle_timeout())
            .with_concurrency(config.roster_concurrency)
            .with_image_sink(Arc::new(imaging.clone()));
        if let Some(enhancer) = enhancer {
            pipeline = pipeline.with_enhancer(enhancer);
        }

        let mut enrollment = Enrollment::new(students.clone(), pending, notifier.clone(), &config.data_dir);
        if config.strict_reference_photos {
            enrollment = enrollment.with_strict_reference_check(oracle);
        }

        Self {
            reports: Reports::new(students.clone(), attendance.clone()),
            accounts: Accounts::new(teachers),
            students,
            attendance,
            pipeline,
            enrollment,
            imaging,
            notifier,
            images_dir: config.images_dir(),
            last_attendance: config.last_attendance_path(),
            low_attendance_threshold: config.low_attendance_threshold,
        }
    }
}
