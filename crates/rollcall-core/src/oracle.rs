//! The face-embedding oracle: an external detector/encoder.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{DetectedFace, Embedding};

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("oracle unreachable: {0}")]
    Unreachable(String),
    #[error("oracle call timed out after {0} ms")]
    Timeout(u64),
    #[error("oracle returned an unusable response: {0}")]
    BadResponse(String),
}

#[async_trait]
pub trait EmbeddingOracle: Send + Sync {
    /// Faces in a group photo with their signatures, in detection order.
    async fn detect(&self, image: &[u8]) -> Result<Vec<DetectedFace>, OracleError>;

    /// Signatures for every face in a reference photo. Callers use the first.
    async fn encode_reference(&self, image: &[u8]) -> Result<Vec<Embedding>, OracleError>;
}
