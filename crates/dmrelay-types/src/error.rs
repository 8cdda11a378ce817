use thiserror::Error;

/// Errors from repository operations (used by trait definitions in dmrelay-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid stored data: {0}")]
    InvalidData(String),
}

/// A timestamp that failed strict parsing at an ingestion boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimestampError {
    #[error("timestamp '{0}' is not a plain integer")]
    NotNumeric(String),

    #[error("timestamp {0} is not positive")]
    NonPositive(i64),

    #[error("timestamp is missing")]
    Missing,
}

/// Errors surfaced by the synchronization controller.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("no deliverable channel for user {0}")]
    Unreachable(String),
}

/// Errors from reading a bulk import document.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to read import file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed import document: {0}")]
    Malformed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::Query("syntax error".to_string());
        assert_eq!(err.to_string(), "query error: syntax error");
    }

    #[test]
    fn test_repository_error_every_variant_displays() {
        let all = [
            RepositoryError::Connection,
            RepositoryError::Query("q".to_string()),
            RepositoryError::Conflict("c".to_string()),
            RepositoryError::InvalidData("d".to_string()),
        ];
        for err in &all {
            // Exhaustive: a new variant must be constructed above.
            let expected = match err {
                RepositoryError::Connection => "database connection error",
                RepositoryError::Query(_) => "query error: q",
                RepositoryError::Conflict(_) => "conflict: c",
                RepositoryError::InvalidData(_) => "invalid stored data: d",
            };
            assert_eq!(err.to_string(), expected);
        }
    }

    #[test]
    fn test_timestamp_error_display() {
        let err = TimestampError::NotNumeric("abc".to_string());
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn test_sync_error_wraps_repository() {
        let err: SyncError = RepositoryError::Connection.into();
        assert_eq!(err.to_string(), "database connection error");
    }
}
