//! Document storage boundary: bytes in, public URL out. The core never
//! retries uploads and never deletes what it uploaded.

use async_trait::async_trait;
use serde::Deserialize;

use crate::errors::{AppError, Result};

#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload_bytes(&self, folder: &str, filename: &str, bytes: Vec<u8>) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
}

/// Unsigned-preset upload to the Cloudinary image API.
pub struct CloudinaryUploader {
    http: reqwest::Client,
    cloud_name: String,
    upload_preset: String,
}

impl CloudinaryUploader {
    pub fn new(cloud_name: &str, upload_preset: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            cloud_name: cloud_name.to_string(),
            upload_preset: upload_preset.to_string(),
        }
    }

    fn upload_url(&self) -> String {
        format!(
            "https://api.cloudinary.com/v1_1/{}/image/upload",
            self.cloud_name
        )
    }
}

#[async_trait]
impl Uploader for CloudinaryUploader {
    async fn upload_bytes(&self, folder: &str, filename: &str, bytes: Vec<u8>) -> Result<String> {
        let form = reqwest::multipart::Form::new()
            .text("upload_preset", self.upload_preset.clone())
            .text("folder", folder.to_string())
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string()),
            );

        let response = self
            .http
            .post(self.upload_url())
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::StorageError(format!("upload request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::StorageError(format!(
                "upload failed ({}): {}",
                status.as_u16(),
                body
            )));
        }

        let parsed: UploadResponse = response
            .json()
            .await
            .map_err(|e| AppError::StorageError(format!("malformed upload response: {}", e)))?;
        Ok(parsed.secure_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_url_targets_the_configured_cloud() {
        let uploader = CloudinaryUploader::new("demo-cloud", "kyc_unsigned");
        assert_eq!(
            uploader.upload_url(),
            "https://api.cloudinary.com/v1_1/demo-cloud/image/upload"
        );
    }
}
