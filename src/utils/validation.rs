use crate::errors::{AppError, Result};
use crate::models::submission::DocType;
use crate::models::types::{FilePayload, TaggedFilePayload};

/// Largest accepted upload, per file.
pub const MAX_FILE_SIZE: usize = 12 * 1024 * 1024;

pub struct Validator;

impl Validator {
    /// A file slot must carry a filename and non-empty bytes within the cap.
    pub fn validate_file(label: &str, file: &FilePayload) -> Result<()> {
        if file.filename.trim().is_empty() || file.bytes.is_empty() {
            return Err(AppError::ValidationError(format!("{} is required", label)));
        }
        if file.bytes.len() > MAX_FILE_SIZE {
            return Err(AppError::ValidationError(format!(
                "{} size is too large",
                label
            )));
        }
        Ok(())
    }

    /// Supplementary files must be tagged `other`; the ID card and selfie
    /// have dedicated slots and cannot be smuggled in here.
    pub fn validate_other_file(index: usize, file: &TaggedFilePayload) -> Result<()> {
        if file.filename.trim().is_empty() || file.bytes.is_empty() {
            return Err(AppError::ValidationError(format!(
                "other file #{} is invalid",
                index + 1
            )));
        }
        if file.bytes.len() > MAX_FILE_SIZE {
            return Err(AppError::ValidationError(format!(
                "other file #{} size is too large",
                index + 1
            )));
        }
        if file.doc_type != DocType::Other {
            return Err(AppError::ValidationError(
                "invalid doc_type for others (use 'other')".to_string(),
            ));
        }
        Ok(())
    }
}
