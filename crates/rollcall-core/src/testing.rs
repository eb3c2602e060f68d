//! Shared fixtures for unit tests.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::model::Student;
use crate::oracle::{EmbeddingOracle, OracleError};
use crate::types::{DetectedFace, Embedding};

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// A student in class cs / 2 / dbms registered on 2025-07-01.
pub fn student(roll: &str) -> Student {
    Student {
        roll_no: roll.into(),
        name: format!("Student {roll}"),
        photo_path: format!("images/{roll}.jpg"),
        department_id: Some("cs".into()),
        year: Some("2".into()),
        subject_ids: vec!["dbms".into()],
        registration_date: date("2025-07-01"),
        email: Some(format!("{}@school.edu", roll.to_lowercase())),
    }
}

/// Oracle keyed on raw image bytes.
#[derive(Default)]
pub struct FakeOracle {
    references: HashMap<Vec<u8>, Vec<Embedding>>,
    groups: HashMap<Vec<u8>, Vec<DetectedFace>>,
    delay: Option<Duration>,
    failing: bool,
}

impl FakeOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reference(mut self, image: &[u8], sigs: Vec<Vec<f32>>) -> Self {
        self.references
            .insert(image.to_vec(), sigs.into_iter().map(Embedding::new).collect());
        self
    }

    pub fn group(mut self, image: &[u8], faces: Vec<DetectedFace>) -> Self {
        self.groups.insert(image.to_vec(), faces);
        self
    }

    pub fn delay(mut self, d: Duration) -> Self {
        self.delay = Some(d);
        self
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    async fn pause(&self) -> Result<(), OracleError> {
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        if self.failing {
            return Err(OracleError::Unreachable("fake oracle down".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl EmbeddingOracle for FakeOracle {
    async fn detect(&self, image: &[u8]) -> Result<Vec<DetectedFace>, OracleError> {
        self.pause().await?;
        Ok(self.groups.get(image).cloned().unwrap_or_default())
    }

    async fn encode_reference(&self, image: &[u8]) -> Result<Vec<Embedding>, OracleError> {
        self.pause().await?;
        Ok(self.references.get(image).cloned().unwrap_or_default())
    }
}
