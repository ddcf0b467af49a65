use crate::places::CoordinateError;
use crate::validation::{ErrorKind, ValidationErrors};

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Validation failed: {0}")]
    Invalid(ValidationErrors),

    #[error("Not found: {entity} {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("Coordinate error: {0}")]
    Coordinate(#[from] CoordinateError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Password hashing error: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ValidationErrors> for ModelError {
    fn from(errors: ValidationErrors) -> Self {
        ModelError::Invalid(errors)
    }
}

impl ModelError {
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        ModelError::NotFound {
            entity,
            key: key.into(),
        }
    }

    /// Field-level errors, if this is a validation failure.
    pub fn validation(&self) -> Option<&ValidationErrors> {
        match self {
            ModelError::Invalid(errors) => Some(errors),
            _ => None,
        }
    }

    pub fn is_invalid_on(&self, field: &str, kind: ErrorKind) -> bool {
        self.validation().is_some_and(|e| e.has(field, kind))
    }
}

pub type ModelResult<T> = Result<T, ModelError>;
