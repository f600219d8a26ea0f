//! Error types for the movie store and its remote collections.

use thiserror::Error;

/// Errors raised by a [`RemoteCollection`](crate::remote::RemoteCollection).
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The collection cannot be reached or refused the request
    #[error("Remote collection unavailable: {0}")]
    Unavailable(String),
    /// Document does not exist
    #[error("Document not found: {0}")]
    NotFound(String),
    /// Backing database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    /// Could not prepare the database location
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Migration failed while opening the database
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    /// Document data could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors returned by [`MovieStore`](crate::MovieStore) operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Local validation failed; nothing was sent to the remote collection
    #[error("{0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    /// A movie could not be converted to or from document data
    #[error("Movie serialization error: {0}")]
    Serialization(#[source] serde_json::Error),
}

pub type RemoteResult<T> = Result<T, RemoteError>;
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_argument_message() {
        let err = StoreError::InvalidArgument("Invalid Movie!".to_string());
        assert_eq!(err.to_string(), "Invalid Movie!");
    }

    #[test]
    fn test_remote_error_is_transparent() {
        let err: StoreError = RemoteError::Unavailable("offline".to_string()).into();
        assert_eq!(err.to_string(), "Remote collection unavailable: offline");
    }
}
