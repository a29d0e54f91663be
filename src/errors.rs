use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict error: {0}")]
    ConflictError(String),

    #[error("State conflict: {0}")]
    StateConflictError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Image error: {0}")]
    ImageError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err.to_string())
    }
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        AppError::ImageError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
