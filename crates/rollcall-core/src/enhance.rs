//! Optional pre-processing hook that upscales a group photo before detection.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnhanceError {
    #[error("enhancement request failed: {0}")]
    Request(String),
    #[error("enhancement service response missing {0}")]
    MissingField(&'static str),
}

#[async_trait]
pub trait PhotoEnhancer: Send + Sync {
    async fn enhance(&self, image: &[u8]) -> Result<Vec<u8>, EnhanceError>;
}

/// Enhance `image`, or hand back the original if the service fails.
pub async fn enhance_or_original(enhancer: Option<&dyn PhotoEnhancer>, image: Vec<u8>) -> Vec<u8> {
    let Some(enhancer) = enhancer else {
        return image;
    };
    match enhancer.enhance(&image).await {
        Ok(enhanced) => {
            tracing::debug!(before = image.len(), after = enhanced.len(), "photo enhanced");
            enhanced
        }
        Err(e) => {
            tracing::warn!(error = %e, "photo enhancement failed; using original");
            image
        }
    }
}
