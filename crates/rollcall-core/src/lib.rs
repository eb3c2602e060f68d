//! rollcall-core: classroom attendance from group photos.
//!
//! Reference signatures come from an external embedding oracle, matching is
//! a strict Euclidean threshold, and every persistence or delivery concern
//! sits behind an async trait so the daemon can plug in SQLite, SMTP and HTTP.

pub mod accounts;
pub mod annotate;
pub mod enhance;
pub mod enrollment;
pub mod manual;
pub mod matcher;
pub mod memory;
pub mod model;
pub mod notify;
pub mod oracle;
pub mod pipeline;
pub mod recorder;
pub mod report;
pub mod roster;
pub mod store;
pub mod types;

#[cfg(test)]
mod testing;

pub use matcher::{match_faces, AcceptedMatch, EuclideanMatcher, Matcher, MATCH_DISTANCE_THRESHOLD};
pub use model::{
    AttendanceRecord, AttendanceStatus, ClassDetail, ClassScope, PendingStatus, PendingStudent, Source, Student,
    Teacher,
};
pub use oracle::{EmbeddingOracle, OracleError};
pub use pipeline::{AttendancePipeline, PipelineError, UploadOutcome, UploadRequest};
pub use roster::{RosterEntry, RosterIndex, RosterIndexBuilder};
pub use store::{AttendanceStore, PendingStore, StoreError, StudentStore, TeacherStore};
pub use types::{BoundingBox, DetectedFace, Embedding, KnownFace};
