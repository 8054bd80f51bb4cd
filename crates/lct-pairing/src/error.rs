use lct_types::{CollaboratorError, ComponentSide};

/// Errors returned by pairing operations.
///
/// Every variant except `Collaborator` and `Database` is a precondition
/// failure and leaves stored state untouched.
#[derive(Debug, thiserror::Error)]
pub enum PairingError {
    #[error("invalid pairing request: {0}")]
    InvalidRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Carries the authorization gate's reason.
    #[error("pairing not authorized: {0}")]
    Unauthorized(String),

    #[error("pairing session has expired: {0}")]
    Expired(String),

    #[error("{0} authentication failed")]
    AuthenticationFailed(ComponentSide),

    #[error("pairing session {session_id} is {status}, expected pending")]
    InvalidState { session_id: String, status: String },

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error("pairing database error: {0}")]
    Database(#[from] rusqlite::Error),
}
