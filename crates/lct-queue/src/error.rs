use lct_types::CollaboratorError;

/// Errors returned by queue operations.
///
/// Drain passes only return `Database` when the component's records cannot
/// be read at all. Per-record failures are recorded on the record instead.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("invalid queue request: {0}")]
    InvalidRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Carries the authorization gate's reason.
    #[error("pairing not authorized: {0}")]
    Unauthorized(String),

    #[error("{0}")]
    Unverified(String),

    #[error("request {request_id} is {status}, only queued requests can be cancelled")]
    InvalidState { request_id: String, status: String },

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error("queue database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("queue payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
