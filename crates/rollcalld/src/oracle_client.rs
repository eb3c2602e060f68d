//! HTTP client for the external embedding oracle.
//!
//! `POST {base}/detect` and `POST {base}/encode` take raw image bytes.

use std::time::Duration;

use async_trait::async_trait;
use rollcall_core::{DetectedFace, Embedding, EmbeddingOracle, OracleError};
use serde::Deserialize;

#[derive(Deserialize)]
struct DetectResponse {
    faces: Vec<DetectedFace>,
}

#[derive(Deserialize)]
struct EncodeResponse {
    embeddings: Vec<Embedding>,
}

pub struct HttpOracle {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpOracle {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::Unreachable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    async fn post<T: serde::de::DeserializeOwned>(&self, path: &str, image: &[u8]) -> Result<T, OracleError> {
        let url = format!("{}/{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::BadResponse(format!("{path}: {status} {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| OracleError::BadResponse(format!("{path}: {e}")))
    }

    fn classify(&self, e: reqwest::Error) -> OracleError {
        if e.is_timeout() {
            OracleError::Timeout(self.timeout.as_millis() as u64)
        } else {
            OracleError::Unreachable(e.to_string())
        }
    }
}

#[async_trait]
impl EmbeddingOracle for HttpOracle {
    async fn detect(&self, image: &[u8]) -> Result<Vec<DetectedFace>, OracleError> {
        let response: DetectResponse = self.post("detect", image).await?;
        tracing::debug!(faces = response.faces.len(), "oracle detect");
        Ok(response.faces)
    }

    async fn encode_reference(&self, image: &[u8]) -> Result<Vec<Embedding>, OracleError> {
        let response: EncodeResponse = self.post("encode", image).await?;
        Ok(response.embeddings)
    }
}
