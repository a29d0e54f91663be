//! Submission orchestration: validate input, normalize and upload every
//! document, consult the face-match provider, derive the auto-approval
//! decision, and commit the whole submission atomically.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::database::SqliteDatabase;
use crate::errors::{AppError, Result};
use crate::models::submission::{DocType, Document, ReviewDecision, Submission, SubmissionStatus};
use crate::models::types::{
    DocumentView, PendingSubmission, SubmissionStatusView, SubmitInput, SubmitOutcome,
};
use crate::services::face_match::{FaceMatchClient, IappFaceMatch};
use crate::services::roles::{RoleLookup, SqliteRoleLookup};
use crate::services::storage::{CloudinaryUploader, Uploader};
use crate::utils::image::normalize_to_jpeg;
use crate::utils::validation::Validator;

/// Minimum total confidence for an automatic approval.
pub const FACE_MATCH_THRESHOLD: f64 = 0.75;
/// Canonical width cap applied to every stored document.
pub const NORMALIZED_MAX_WIDTH: u32 = 1200;
pub const NORMALIZED_JPEG_QUALITY: u8 = 85;

#[derive(Debug, Clone)]
pub struct VerificationPolicy {
    pub require_selfie: bool,
    pub eligible_role: String,
}

impl Default for VerificationPolicy {
    fn default() -> Self {
        Self {
            require_selfie: true,
            eligible_role: "APPLICANT".to_string(),
        }
    }
}

pub struct VerificationService {
    db: Arc<SqliteDatabase>,
    uploader: Arc<dyn Uploader>,
    face_match: Arc<dyn FaceMatchClient>,
    roles: Arc<dyn RoleLookup>,
    policy: VerificationPolicy,
}

impl VerificationService {
    pub fn new(
        db: Arc<SqliteDatabase>,
        uploader: Arc<dyn Uploader>,
        face_match: Arc<dyn FaceMatchClient>,
        roles: Arc<dyn RoleLookup>,
        policy: VerificationPolicy,
    ) -> Self {
        Self {
            db,
            uploader,
            face_match,
            roles,
            policy,
        }
    }

    /// Wire up the production collaborators from configuration.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let db = Arc::new(SqliteDatabase::new(&config.database_path).await?);
        let uploader = Arc::new(CloudinaryUploader::new(
            &config.cloudinary_cloud_name,
            &config.cloudinary_upload_preset,
        ));
        let face_match = Arc::new(IappFaceMatch::new(
            &config.face_api_url,
            &config.face_api_key,
            config.face_timeout_secs,
        )?);
        let roles = Arc::new(SqliteRoleLookup::new(db.clone()));

        Ok(Self::new(
            db,
            uploader,
            face_match,
            roles,
            VerificationPolicy {
                require_selfie: config.require_selfie,
                eligible_role: config.eligible_role.clone(),
            },
        ))
    }

    pub fn database(&self) -> Arc<SqliteDatabase> {
        self.db.clone()
    }

    /// Accept a user's identity documents and drive them through the whole
    /// pipeline. Uploads that succeed before a later failure are not rolled
    /// back; the orphaned blobs are an accepted risk.
    pub async fn submit_documents(
        &self,
        user_id: Uuid,
        input: SubmitInput,
    ) -> Result<SubmitOutcome> {
        if user_id.is_nil() {
            return Err(AppError::ValidationError("invalid user_id".to_string()));
        }

        let role = self.roles.role_code(&user_id).await?;
        let eligible = role
            .as_deref()
            .map(|code| code.trim().eq_ignore_ascii_case(&self.policy.eligible_role))
            .unwrap_or(false);
        if !eligible {
            return Err(AppError::ValidationError(
                "user is not allowed to submit verification documents".to_string(),
            ));
        }

        Validator::validate_file("id_front", &input.id_front)?;
        match &input.selfie {
            Some(selfie) => Validator::validate_file("selfie", selfie)?,
            None if self.policy.require_selfie => {
                return Err(AppError::ValidationError("selfie is required".to_string()));
            }
            None => {}
        }
        for (i, other) in input.others.iter().enumerate() {
            Validator::validate_other_file(i, other)?;
        }

        // Best-effort duplicate guard: two racing submits can still both
        // pass, see the design notes.
        if let Some(latest) = self.db.find_latest_by_user(&user_id).await? {
            if latest.status == SubmissionStatus::Pending {
                return Err(AppError::ConflictError(
                    "verification already pending admin review".to_string(),
                ));
            }
        }

        // Normalization is CPU-bound; fan out and join everything before the
        // first upload so a bad file aborts with no side effects.
        let id_task = spawn_normalize(input.id_front.bytes);
        let selfie_task = input.selfie.map(|f| spawn_normalize(f.bytes));
        let other_tasks: Vec<_> = input
            .others
            .into_iter()
            .map(|f| spawn_normalize(f.bytes))
            .collect();

        let id_front = join_normalize(id_task, "id_front").await?;
        let selfie = match selfie_task {
            Some(task) => Some(join_normalize(task, "selfie").await?),
            None => None,
        };
        let mut others = Vec::with_capacity(other_tasks.len());
        for (i, task) in other_tasks.into_iter().enumerate() {
            others.push(join_normalize(task, &format!("others #{}", i + 1)).await?);
        }

        let id_front_url = self
            .uploader
            .upload_bytes("kyc/id-front", "id_front.jpg", id_front.clone())
            .await
            .map_err(|e| AppError::StorageError(format!("upload id_front failed: {}", e)))?;

        let mut selfie_url = None;
        if let Some(bytes) = &selfie {
            let url = self
                .uploader
                .upload_bytes("kyc/selfie", "selfie.jpg", bytes.clone())
                .await
                .map_err(|e| AppError::StorageError(format!("upload selfie failed: {}", e)))?;
            selfie_url = Some(url);
        }

        let mut other_urls = Vec::with_capacity(others.len());
        for (i, bytes) in others.into_iter().enumerate() {
            let filename = format!("other_{}.jpg", i + 1);
            let url = self
                .uploader
                .upload_bytes("kyc/other", &filename, bytes)
                .await
                .map_err(|e| AppError::StorageError(format!("upload other #{} failed: {}", i + 1, e)))?;
            other_urls.push(url);
        }

        // Provider failure never sinks the submission; it just forces manual
        // review with the reason preserved for the admin.
        let mut face_match_score = None;
        let mut face_match_passed = None;
        let mut ocr_error = None;

        match selfie {
            Some(selfie_bytes) => {
                match self
                    .face_match
                    .compare_face_and_id(id_front, "id_front.jpg", selfie_bytes, "selfie.jpg")
                    .await
                {
                    Ok(m) => {
                        face_match_score = Some(m.score);
                        face_match_passed = Some(m.is_same_person);
                    }
                    Err(e) => {
                        tracing::warn!(user_id = %user_id, error = %e, "face match call failed");
                        ocr_error = Some(e.to_string());
                    }
                }
            }
            None => {
                ocr_error = Some("selfie not provided".to_string());
            }
        }

        let (status, auto_approved, ocr_error) =
            auto_approval(face_match_score, face_match_passed, ocr_error);

        let submission_id = Uuid::new_v4();
        let now = Utc::now();
        let sub = Submission {
            id: submission_id,
            user_id,
            status,
            face_match_score,
            face_match_passed,
            ocr_provider: Some(self.face_match.provider().to_string()),
            ocr_error,
            auto_approved,
            created_at: now,
            reviewed_at: None,
            documents: Vec::new(),
            review: None,
        };

        let mut docs = Vec::with_capacity(2 + other_urls.len());
        docs.push(new_document(submission_id, DocType::IdCard, id_front_url));
        if let Some(url) = selfie_url {
            docs.push(new_document(submission_id, DocType::Selfie, url));
        }
        for url in other_urls {
            docs.push(new_document(submission_id, DocType::Other, url));
        }

        self.db.create_submission_with_documents(&sub, &docs).await?;

        tracing::info!(
            user_id = %user_id,
            submission_id = %submission_id,
            status = status.as_str(),
            auto_approved,
            "verification submission created"
        );

        Ok(SubmitOutcome {
            submission_id,
            status,
            ocr_provider: sub.ocr_provider,
            auto_approved,
        })
    }

    /// Latest submission for the user, shaped for display.
    pub async fn get_status(&self, user_id: Uuid) -> Result<Option<SubmissionStatusView>> {
        if user_id.is_nil() {
            return Err(AppError::ValidationError("invalid user_id".to_string()));
        }

        let Some(sub) = self.db.find_latest_by_user(&user_id).await? else {
            return Ok(None);
        };

        let review_note = sub
            .review
            .as_ref()
            .and_then(|r| r.note.as_deref())
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        Ok(Some(SubmissionStatusView {
            submission_id: sub.id,
            status: sub.status,
            submitted_at: sub.created_at.to_rfc3339(),
            reviewed_at: sub.reviewed_at.map(|dt| dt.to_rfc3339()),
            review_note,
            documents: sub
                .documents
                .into_iter()
                .map(|d| DocumentView {
                    id: d.id,
                    doc_type: d.doc_type,
                    file_url: d.file_url,
                })
                .collect(),
        }))
    }

    /// Admin queue, oldest first.
    pub async fn list_pending(&self, limit: i64, offset: i64) -> Result<Vec<PendingSubmission>> {
        let limit = if limit <= 0 { 20 } else { limit };
        let offset = offset.max(0);

        let subs = self.db.list_pending(limit, offset).await?;
        Ok(subs
            .into_iter()
            .map(|s| PendingSubmission {
                submission_id: s.id,
                user_id: s.user_id,
                status: s.status,
                submitted_at: s.created_at.to_rfc3339(),
            })
            .collect())
    }

    /// Finalize a pending submission with an admin decision.
    pub async fn decide(
        &self,
        submission_id: Uuid,
        admin_id: Uuid,
        decision: ReviewDecision,
        note: Option<&str>,
    ) -> Result<()> {
        if submission_id.is_nil() || admin_id.is_nil() {
            return Err(AppError::ValidationError("invalid id".to_string()));
        }
        self.db.decide(&submission_id, &admin_id, decision, note).await
    }

    /// Whether the user's latest submission counts as approved
    /// (auto-approved included).
    pub async fn is_verified(&self, user_id: Uuid) -> Result<bool> {
        let latest = self.db.find_latest_by_user(&user_id).await?;
        Ok(latest.map(|s| s.status.is_approved()).unwrap_or(false))
    }
}

fn new_document(submission_id: Uuid, doc_type: DocType, file_url: String) -> Document {
    Document {
        id: Uuid::new_v4(),
        submission_id,
        doc_type,
        file_url,
        created_at: Utc::now(),
    }
}

fn spawn_normalize(bytes: Vec<u8>) -> tokio::task::JoinHandle<Result<Vec<u8>>> {
    tokio::task::spawn_blocking(move || {
        normalize_to_jpeg(&bytes, NORMALIZED_MAX_WIDTH, NORMALIZED_JPEG_QUALITY)
    })
}

async fn join_normalize(
    task: tokio::task::JoinHandle<Result<Vec<u8>>>,
    label: &str,
) -> Result<Vec<u8>> {
    let joined = task
        .await
        .map_err(|e| AppError::ImageError(format!("normalize {} failed: {}", label, e)))?;
    joined.map_err(|e| AppError::ImageError(format!("normalize {} failed: {}", label, e)))
}

/// The accept/reject-to-manual decision. Auto-approval needs a present,
/// passing score at or above the threshold and no captured provider error;
/// every pending outcome carries a human-readable reason.
fn auto_approval(
    score: Option<f64>,
    passed: Option<bool>,
    ocr_error: Option<String>,
) -> (SubmissionStatus, bool, Option<String>) {
    let face_ok = matches!((score, passed), (Some(s), Some(true)) if s >= FACE_MATCH_THRESHOLD);

    if face_ok && ocr_error.is_none() {
        (SubmissionStatus::AutoApproved, true, None)
    } else {
        let reason = ocr_error.unwrap_or_else(|| {
            format!("face match below threshold {:.2}", FACE_MATCH_THRESHOLD)
        });
        (SubmissionStatus::Pending, false, Some(reason))
    }
}
