use crate::errors::{AppError, Result};
use std::env;

/// Runtime configuration, read once from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_path: String,
    pub face_api_url: String,
    pub face_api_key: String,
    pub face_timeout_secs: u64,
    pub cloudinary_cloud_name: String,
    pub cloudinary_upload_preset: String,
    /// When true, a submission without a selfie is rejected up front.
    pub require_selfie: bool,
    /// Role code a user must carry to submit documents.
    pub eligible_role: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let face_api_key = env::var("FACE_API_KEY")
            .map_err(|_| AppError::ConfigError("FACE_API_KEY is not set".to_string()))?;
        let cloudinary_cloud_name = env::var("CLOUDINARY_CLOUD_NAME")
            .map_err(|_| AppError::ConfigError("CLOUDINARY_CLOUD_NAME is not set".to_string()))?;
        let cloudinary_upload_preset = env::var("CLOUDINARY_UPLOAD_PRESET")
            .map_err(|_| AppError::ConfigError("CLOUDINARY_UPLOAD_PRESET is not set".to_string()))?;

        let face_timeout_secs = env::var("FACE_API_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(20);

        let require_selfie = env::var("KYC_REQUIRE_SELFIE")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        Ok(Self {
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "data/kyc.db".to_string()),
            face_api_url: env::var("FACE_API_URL").unwrap_or_else(|_| {
                "https://api.iapp.co.th/v3/store/ekyc/face-and-id-card-verification".to_string()
            }),
            face_api_key,
            face_timeout_secs,
            cloudinary_cloud_name,
            cloudinary_upload_preset,
            require_selfie,
            eligible_role: env::var("KYC_ELIGIBLE_ROLE")
                .unwrap_or_else(|_| "APPLICANT".to_string()),
        })
    }
}
