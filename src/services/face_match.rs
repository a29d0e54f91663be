//! Face-match/OCR provider boundary. The adapter owns timeouts and error
//! translation only; the orchestrator decides what a failure means.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::errors::{AppError, Result};

/// Normalized outcome of a provider comparison. The wire format's
/// string-typed boolean never leaves this module.
#[derive(Debug, Clone, Copy)]
pub struct FaceMatch {
    pub score: f64,
    pub is_same_person: bool,
}

#[async_trait]
pub trait FaceMatchClient: Send + Sync {
    /// Identifier recorded on submissions (e.g. "iapp").
    fn provider(&self) -> &str;

    async fn compare_face_and_id(
        &self,
        id_bytes: Vec<u8>,
        id_name: &str,
        selfie_bytes: Vec<u8>,
        selfie_name: &str,
    ) -> Result<FaceMatch>;
}

#[derive(Debug, Deserialize)]
struct WireScore {
    #[serde(default)]
    confidence: f64,
    #[serde(rename = "isSamePerson", default)]
    is_same_person: String,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    total: Option<WireScore>,
    #[serde(default)]
    error_message: Option<String>,
}

/// HTTP client for the iApp face-and-id-card verification endpoint.
pub struct IappFaceMatch {
    url: String,
    api_key: String,
    http: reqwest::Client,
}

impl IappFaceMatch {
    pub fn new(url: &str, api_key: &str, timeout_secs: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build http client: {}", e)))?;

        Ok(Self {
            url: url.to_string(),
            api_key: api_key.to_string(),
            http,
        })
    }
}

#[async_trait]
impl FaceMatchClient for IappFaceMatch {
    fn provider(&self) -> &str {
        "iapp"
    }

    async fn compare_face_and_id(
        &self,
        id_bytes: Vec<u8>,
        id_name: &str,
        selfie_bytes: Vec<u8>,
        selfie_name: &str,
    ) -> Result<FaceMatch> {
        if self.api_key.is_empty() {
            return Err(AppError::ProviderError("missing face api key".to_string()));
        }

        // Provider field naming: file1 carries the ID card, file0 the selfie.
        let form = reqwest::multipart::Form::new()
            .part(
                "file1",
                reqwest::multipart::Part::bytes(id_bytes).file_name(id_name.to_string()),
            )
            .part(
                "file0",
                reqwest::multipart::Part::bytes(selfie_bytes).file_name(selfie_name.to_string()),
            );

        let response = self
            .http
            .post(&self.url)
            .header("apikey", &self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::ProviderError(format!("face match request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::ProviderError(format!("face match response unreadable: {}", e)))?;

        if !status.is_success() {
            if let Ok(parsed) = serde_json::from_str::<WireResponse>(&body) {
                if let Some(msg) = parsed.error_message {
                    return Err(AppError::ProviderError(format!(
                        "provider error ({}): {}",
                        status.as_u16(),
                        msg
                    )));
                }
            }
            return Err(AppError::ProviderError(format!(
                "provider http error ({}): {}",
                status.as_u16(),
                body
            )));
        }

        interpret_body(&body)
    }
}

/// Parse a 2xx provider body into a normalized result. Bodies that carry an
/// `error_message` alongside a success status still count as failures.
fn interpret_body(body: &str) -> Result<FaceMatch> {
    let parsed: WireResponse = serde_json::from_str(body)
        .map_err(|e| AppError::ProviderError(format!("malformed provider response: {}", e)))?;

    if let Some(msg) = parsed.error_message {
        return Err(AppError::ProviderError(msg));
    }

    let total = parsed.total.ok_or_else(|| {
        AppError::ProviderError("provider response missing total score".to_string())
    })?;

    Ok(FaceMatch {
        score: total.confidence,
        is_same_person: total.is_same_person.eq_ignore_ascii_case("true"),
    })
}
