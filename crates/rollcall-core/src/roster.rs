//! Roster index builder: reference signatures for every student in a class scope.
//!
//! Rebuilt on every upload; nothing is cached across requests. Each student
//! resolves to a [`RosterEntry`] so skip reasons stay observable.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};

use crate::model::{ClassScope, Student};
use crate::oracle::{EmbeddingOracle, OracleError};
use crate::store::{StoreError, StudentStore};
use crate::types::{Embedding, KnownFace};

pub const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Outcome of indexing one student's reference photo.
#[derive(Debug, Clone, PartialEq)]
pub enum RosterEntry {
    Included(Embedding),
    SkippedNoPhoto,
    SkippedNoFace,
    SkippedTimeout,
    SkippedOracleError(String),
}

impl RosterEntry {
    pub fn is_included(&self) -> bool {
        matches!(self, Self::Included(_))
    }
}

#[derive(Debug, Clone)]
pub struct RosterSlot {
    pub roll_no: String,
    pub entry: RosterEntry,
    /// Faces the oracle found in the reference photo; 0 when it was never encoded.
    pub reference_faces: usize,
}

/// Per-student results in registration order.
#[derive(Debug, Clone, Default)]
pub struct RosterIndex {
    pub slots: Vec<RosterSlot>,
}

impl RosterIndex {
    /// The `(roll_no, signature)` list the matcher consumes.
    pub fn known_faces(&self) -> Vec<KnownFace> {
        self.slots
            .iter()
            .filter_map(|slot| match &slot.entry {
                RosterEntry::Included(sig) => Some(KnownFace {
                    roll_no: slot.roll_no.clone(),
                    signature: sig.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    pub fn included_count(&self) -> usize {
        self.slots.iter().filter(|s| s.entry.is_included()).count()
    }

    pub fn skipped(&self) -> impl Iterator<Item = &RosterSlot> {
        self.slots.iter().filter(|s| !s.entry.is_included())
    }

    /// Included students whose reference photo showed more than one face.
    pub fn ambiguous(&self) -> impl Iterator<Item = &RosterSlot> {
        self.slots
            .iter()
            .filter(|s| s.entry.is_included() && s.reference_faces > 1)
    }
}

pub struct RosterIndexBuilder {
    oracle: Arc<dyn EmbeddingOracle>,
    photo_root: PathBuf,
    timeout: Duration,
    concurrency: usize,
}

impl RosterIndexBuilder {
    /// `photo_root` anchors relative `photo_path` values.
    pub fn new(oracle: Arc<dyn EmbeddingOracle>, photo_root: impl Into<PathBuf>) -> Self {
        Self {
            oracle,
            photo_root: photo_root.into(),
            timeout: DEFAULT_ORACLE_TIMEOUT,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Load the students in `scope` and index them.
    pub async fn build_for_scope(
        &self,
        students: &dyn StudentStore,
        scope: &ClassScope,
    ) -> Result<RosterIndex, StoreError> {
        let roster = students.find_by_scope(scope).await?;
        Ok(self.build(&roster).await)
    }

    /// Index `students`, keeping their order. Never fails: every problem
    /// becomes a skip entry.
    pub async fn build(&self, students: &[Student]) -> RosterIndex {
        // Futures are inert until polled; collecting them keeps the closure
        // type out of this future so it stays provably `Send`.
        let pending: Vec<_> = students
            .iter()
            .map(|s| async move {
                let (entry, reference_faces) = self.index_student(s).await;
                RosterSlot {
                    roll_no: s.roll_no.clone(),
                    entry,
                    reference_faces,
                }
            })
            .collect();
        let slots: Vec<RosterSlot> = stream::iter(pending)
            .buffered(self.concurrency)
            .collect()
            .await;

        let index = RosterIndex { slots };
        tracing::info!(
            students = students.len(),
            included = index.included_count(),
            ambiguous = index.ambiguous().count(),
            "roster index built"
        );
        index
    }

    fn photo_path(&self, student: &Student) -> PathBuf {
        let p = Path::new(&student.photo_path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.photo_root.join(p)
        }
    }

    async fn index_student(&self, student: &Student) -> (RosterEntry, usize) {
        let roll_no = student.roll_no.as_str();
        let path = self.photo_path(student);

        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(roll_no, path = %path.display(), error = %e, "reference photo unreadable; skipping");
                return (RosterEntry::SkippedNoPhoto, 0);
            }
        };

        let result = tokio::time::timeout(self.timeout, self.oracle.encode_reference(&bytes)).await;
        match result {
            Err(_) | Ok(Err(OracleError::Timeout(_))) => {
                tracing::warn!(roll_no, "reference encoding timed out; skipping");
                (RosterEntry::SkippedTimeout, 0)
            }
            Ok(Err(e)) => {
                tracing::warn!(roll_no, error = %e, "reference encoding failed; skipping");
                (RosterEntry::SkippedOracleError(e.to_string()), 0)
            }
            Ok(Ok(signatures)) => {
                let faces = signatures.len();
                if faces > 1 {
                    tracing::warn!(roll_no, faces, "reference photo has several faces; using the first");
                }
                match signatures.into_iter().next() {
                    Some(sig) => (RosterEntry::Included(sig), faces),
                    None => {
                        tracing::info!(roll_no, "no face in reference photo; skipping");
                        (RosterEntry::SkippedNoFace, 0)
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStudents;
    use crate::testing::{student, FakeOracle};

    fn write_photo(dir: &Path, name: &str, contents: &[u8]) {
        std::fs::create_dir_all(dir.join("images")).unwrap();
        std::fs::write(dir.join("images").join(name), contents).unwrap();
    }

    #[tokio::test]
    async fn test_build_records_skip_reasons_in_order() {
        let dir = tempfile::tempdir().unwrap();
        write_photo(dir.path(), "A.jpg", b"face-a");
        write_photo(dir.path(), "C.jpg", b"blank");
        write_photo(dir.path(), "D.jpg", b"group");

        let oracle = FakeOracle::new()
            .reference(b"face-a", vec![vec![0.1, 0.2]])
            .reference(b"blank", vec![])
            .reference(b"group", vec![vec![0.5, 0.5], vec![0.9, 0.9]]);

        let students = vec![student("A"), student("B"), student("C"), student("D")];
        let builder = RosterIndexBuilder::new(Arc::new(oracle), dir.path());
        let index = builder.build(&students).await;

        let entries: Vec<(&str, &RosterEntry)> =
            index.slots.iter().map(|s| (s.roll_no.as_str(), &s.entry)).collect();
        assert_eq!(entries[0], ("A", &RosterEntry::Included(Embedding::new(vec![0.1, 0.2]))));
        assert_eq!(entries[1], ("B", &RosterEntry::SkippedNoPhoto));
        assert_eq!(entries[2], ("C", &RosterEntry::SkippedNoFace));
        // Several faces: first signature only.
        assert_eq!(entries[3], ("D", &RosterEntry::Included(Embedding::new(vec![0.5, 0.5]))));

        let known = index.known_faces();
        assert_eq!(known.len(), 2);
        assert_eq!(known[0].roll_no, "A");
        assert_eq!(known[1].roll_no, "D");
        assert_eq!(index.skipped().count(), 2);

        let ambiguous: Vec<(&str, usize)> = index
            .ambiguous()
            .map(|s| (s.roll_no.as_str(), s.reference_faces))
            .collect();
        assert_eq!(ambiguous, vec![("D", 2)]);
    }

    #[tokio::test]
    async fn test_build_timeout_becomes_skip() {
        let dir = tempfile::tempdir().unwrap();
        write_photo(dir.path(), "A.jpg", b"slow");

        let oracle = FakeOracle::new().delay(Duration::from_millis(200));
        let builder = RosterIndexBuilder::new(Arc::new(oracle), dir.path())
            .with_timeout(Duration::from_millis(20));
        let index = builder.build(&[student("A")]).await;
        assert_eq!(index.slots[0].entry, RosterEntry::SkippedTimeout);
        assert!(index.known_faces().is_empty());
    }

    #[tokio::test]
    async fn test_build_oracle_error_becomes_skip() {
        let dir = tempfile::tempdir().unwrap();
        write_photo(dir.path(), "A.jpg", b"anything");

        let oracle = FakeOracle::new().failing();
        let builder = RosterIndexBuilder::new(Arc::new(oracle), dir.path());
        let index = builder.build(&[student("A")]).await;
        assert!(matches!(index.slots[0].entry, RosterEntry::SkippedOracleError(_)));
    }

    #[tokio::test]
    async fn test_build_for_scope_filters_students() {
        let dir = tempfile::tempdir().unwrap();
        write_photo(dir.path(), "A.jpg", b"face-a");
        write_photo(dir.path(), "B.jpg", b"face-b");

        let mut other = student("B");
        other.department_id = Some("mech".into());
        let store = MemoryStudents::with(vec![student("A"), other]);

        let oracle = FakeOracle::new()
            .reference(b"face-a", vec![vec![0.1]])
            .reference(b"face-b", vec![vec![0.2]]);
        let builder = RosterIndexBuilder::new(Arc::new(oracle), dir.path()).with_concurrency(2);
        let index = builder
            .build_for_scope(&store, &ClassScope::class("cs", "2", "dbms"))
            .await
            .unwrap();
        assert_eq!(index.slots.len(), 1);
        assert_eq!(index.slots[0].roll_no, "A");
    }
}
