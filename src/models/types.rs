use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::submission::{DocType, SubmissionStatus};

/// One uploaded file as received from the caller (multipart handler, test, …).
#[derive(Debug, Clone)]
pub struct FilePayload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// A supplementary file with the caller-supplied tag. Only `DocType::Other`
/// is accepted here; the ID card and selfie travel in their own slots.
#[derive(Debug, Clone)]
pub struct TaggedFilePayload {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub doc_type: DocType,
}

#[derive(Debug, Clone)]
pub struct SubmitInput {
    pub id_front: FilePayload,
    pub selfie: Option<FilePayload>,
    pub others: Vec<TaggedFilePayload>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitOutcome {
    pub submission_id: Uuid,
    pub status: SubmissionStatus,
    pub ocr_provider: Option<String>,
    pub auto_approved: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentView {
    pub id: Uuid,
    pub doc_type: DocType,
    pub file_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionStatusView {
    pub submission_id: Uuid,
    pub status: SubmissionStatus,
    pub submitted_at: String,
    pub reviewed_at: Option<String>,
    pub review_note: Option<String>,
    pub documents: Vec<DocumentView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingSubmission {
    pub submission_id: Uuid,
    pub user_id: Uuid,
    pub status: SubmissionStatus,
    pub submitted_at: String,
}
