//! Let's Enhance client: upload, request a faces-tuned enhancement, download.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use rollcall_core::enhance::{EnhanceError, PhotoEnhancer};
use serde::Deserialize;
use serde_json::{json, Value};

const ENHANCE_VERSION: &str = "v2.0_faces";

#[derive(Deserialize)]
struct UploadResponse {
    id: Option<Value>,
}

#[derive(Deserialize)]
struct EnhanceResponse {
    result_url: Option<String>,
}

pub struct LetsEnhance {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl LetsEnhance {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, EnhanceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(request)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn upload(&self, image: &[u8]) -> Result<String, EnhanceError> {
        let photo = Part::bytes(image.to_vec())
            .file_name("classroom.jpg")
            .mime_str("image/jpeg")
            .map_err(request)?;
        let response = self
            .client
            .post(format!("{}/v1/photo", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(Form::new().part("photo", photo))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(request)?;

        let body: UploadResponse = response.json().await.map_err(request)?;
        match body.id {
            Some(Value::String(id)) if !id.is_empty() => Ok(id),
            Some(Value::Number(id)) => Ok(id.to_string()),
            _ => Err(EnhanceError::MissingField("id")),
        }
    }

    async fn enhance_uploaded(&self, photo_id: &str) -> Result<String, EnhanceError> {
        let response = self
            .client
            .post(format!("{}/v1/photo/{photo_id}/enhance", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({ "version": ENHANCE_VERSION, "enhance": true }))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(request)?;

        let body: EnhanceResponse = response.json().await.map_err(request)?;
        body.result_url
            .filter(|u| !u.is_empty())
            .ok_or(EnhanceError::MissingField("result_url"))
    }
}

fn request(e: reqwest::Error) -> EnhanceError {
    EnhanceError::Request(e.to_string())
}

#[async_trait]
impl PhotoEnhancer for LetsEnhance {
    async fn enhance(&self, image: &[u8]) -> Result<Vec<u8>, EnhanceError> {
        let photo_id = self.upload(image).await?;
        let result_url = self.enhance_uploaded(&photo_id).await?;
        tracing::debug!(%photo_id, "downloading enhanced photo");

        let bytes = self
            .client
            .get(&result_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(request)?
            .bytes()
            .await
            .map_err(request)?;
        Ok(bytes.to_vec())
    }
}
