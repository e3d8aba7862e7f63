use crate::db::StoreError;
use crate::models::analysis::AnalysisRecord;
use crate::services::dispatcher::DispatchError;

/// Malformed input rejected before any state is touched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("ID must not be null")]
    MissingId,

    #[error("ID must not be negative")]
    NegativeId,

    #[error("Unknown analysis type: {0}")]
    UnknownAnalysisKind(String),

    #[error("Unsupported image format")]
    UnsupportedImage,

    #[error("Malformed result message: {0}")]
    MalformedMessage(String),
}

/// Failure signals of the analysis lifecycle. Each kind lets the calling
/// layer (HTTP handler or queue consumer) choose between retry and a
/// user-facing error.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("You cannot access data of pets owned by other users")]
    Authorization,

    /// The record was persisted in `PENDING` but the job could not be published.
    #[error("Analysis {} persisted but dispatch failed: {source}", .record.id)]
    Dispatch {
        record: Box<AnalysisRecord>,
        #[source]
        source: DispatchError,
    },

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// Check an identifier received from a caller.
pub fn validate_id(id: Option<i64>) -> Result<i64, ValidationError> {
    match id {
        None => Err(ValidationError::MissingId),
        Some(id) if id < 0 => Err(ValidationError::NegativeId),
        Some(id) => Ok(id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_id() {
        assert_eq!(validate_id(None), Err(ValidationError::MissingId));
        assert_eq!(validate_id(Some(-1)), Err(ValidationError::NegativeId));
        assert_eq!(validate_id(Some(0)), Ok(0));
        assert_eq!(validate_id(Some(12)), Ok(12));
    }

    #[test]
    fn test_missing_and_negative_messages_differ() {
        assert_ne!(
            ValidationError::MissingId.to_string(),
            ValidationError::NegativeId.to_string()
        );
    }
}
