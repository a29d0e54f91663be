use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{AppError, Result};

/// Lifecycle of a submission. Creation enters at `Pending` or `AutoApproved`;
/// only `Pending` can still transition, to `Approved` or `Rejected`, via an
/// admin decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    AutoApproved,
    Approved,
    Rejected,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::AutoApproved => "auto_approved",
            SubmissionStatus::Approved => "approved",
            SubmissionStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(SubmissionStatus::Pending),
            "auto_approved" => Ok(SubmissionStatus::AutoApproved),
            "approved" => Ok(SubmissionStatus::Approved),
            "rejected" => Ok(SubmissionStatus::Rejected),
            other => Err(AppError::DatabaseError(format!(
                "Unknown submission status: {}",
                other
            ))),
        }
    }

    /// Auto-approved counts as approved for downstream eligibility checks.
    pub fn is_approved(&self) -> bool {
        matches!(
            self,
            SubmissionStatus::Approved | SubmissionStatus::AutoApproved
        )
    }
}

/// Closed set of document tags; nothing else can reach storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    IdCard,
    Selfie,
    Other,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::IdCard => "id_card",
            DocType::Selfie => "selfie",
            DocType::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "id_card" => Ok(DocType::IdCard),
            "selfie" => Ok(DocType::Selfie),
            "other" => Ok(DocType::Other),
            other => Err(AppError::DatabaseError(format!(
                "Unknown document type: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approved,
    Rejected,
}

impl ReviewDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewDecision::Approved => "approved",
            ReviewDecision::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "approved" => Ok(ReviewDecision::Approved),
            "rejected" => Ok(ReviewDecision::Rejected),
            other => Err(AppError::DatabaseError(format!(
                "Unknown review decision: {}",
                other
            ))),
        }
    }

    pub fn final_status(&self) -> SubmissionStatus {
        match self {
            ReviewDecision::Approved => SubmissionStatus::Approved,
            ReviewDecision::Rejected => SubmissionStatus::Rejected,
        }
    }
}

/// One verification attempt. Documents are written once, atomically, with the
/// submission row; the set never changes afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: SubmissionStatus,
    pub face_match_score: Option<f64>,
    pub face_match_passed: Option<bool>,
    pub ocr_provider: Option<String>,
    pub ocr_error: Option<String>,
    pub auto_approved: bool,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub documents: Vec<Document>,
    pub review: Option<Review>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub doc_type: DocType,
    pub file_url: String,
    pub created_at: DateTime<Utc>,
}

/// Administrative decision record; at most one per submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub reviewed_by: Uuid,
    pub decision: ReviewDecision,
    pub note: Option<String>,
    pub reviewed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            SubmissionStatus::Pending,
            SubmissionStatus::AutoApproved,
            SubmissionStatus::Approved,
            SubmissionStatus::Rejected,
        ] {
            assert_eq!(SubmissionStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(SubmissionStatus::parse("submitted").is_err());
    }

    #[test]
    fn auto_approved_counts_as_approved() {
        assert!(SubmissionStatus::AutoApproved.is_approved());
        assert!(SubmissionStatus::Approved.is_approved());
        assert!(!SubmissionStatus::Pending.is_approved());
        assert!(!SubmissionStatus::Rejected.is_approved());
    }

    #[test]
    fn decision_maps_to_final_status() {
        assert_eq!(
            ReviewDecision::Approved.final_status(),
            SubmissionStatus::Approved
        );
        assert_eq!(
            ReviewDecision::Rejected.final_status(),
            SubmissionStatus::Rejected
        );
    }
}
