//! Shared plumbing for the HTTP handlers: the error type and the blocking
//! bridge onto a pooled connection.

use crate::orchestrator::OrchestratorError;
use crate::AppState;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lct_pairing::PairingError;
use lct_queue::QueueError;
use lct_registry::RegistryError;
use lct_types::CollaboratorError;
use rusqlite::Connection;
use std::sync::Arc;
use thiserror::Error;

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// Authorization or verification refused.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// A proof did not match.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("gone: {0}")]
    Gone(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Gone(msg) => (StatusCode::GONE, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        if status.is_server_error() {
            tracing::error!(%status, "request failed: {}", message);
        }

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<CollaboratorError> for ApiError {
    fn from(e: CollaboratorError) -> Self {
        match e {
            CollaboratorError::RelationshipNotFound(_) => ApiError::NotFound(e.to_string()),
            CollaboratorError::Rejected(msg) => ApiError::Conflict(msg),
            CollaboratorError::Unavailable(_) => ApiError::InternalServerError(e.to_string()),
        }
    }
}

impl From<PairingError> for ApiError {
    fn from(e: PairingError) -> Self {
        match e {
            PairingError::InvalidRequest(_) => ApiError::BadRequest(e.to_string()),
            PairingError::NotFound(_) => ApiError::NotFound(e.to_string()),
            PairingError::Unauthorized(_) => ApiError::Forbidden(e.to_string()),
            PairingError::Expired(_) => ApiError::Gone(e.to_string()),
            PairingError::AuthenticationFailed(_) => ApiError::Unauthorized(e.to_string()),
            PairingError::InvalidState { .. } => ApiError::Conflict(e.to_string()),
            PairingError::Collaborator(inner) => inner.into(),
            PairingError::Database(_) => ApiError::InternalServerError(e.to_string()),
        }
    }
}

impl From<QueueError> for ApiError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::InvalidRequest(_) => ApiError::BadRequest(e.to_string()),
            QueueError::NotFound(_) => ApiError::NotFound(e.to_string()),
            QueueError::Unauthorized(_) | QueueError::Unverified(_) => {
                ApiError::Forbidden(e.to_string())
            }
            QueueError::InvalidState { .. } => ApiError::Conflict(e.to_string()),
            QueueError::Collaborator(inner) => inner.into(),
            QueueError::Database(_) | QueueError::Serialization(_) => {
                ApiError::InternalServerError(e.to_string())
            }
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::InvalidRequest(_) => ApiError::BadRequest(e.to_string()),
            RegistryError::NotFound(_) => ApiError::NotFound(e.to_string()),
            RegistryError::Conflict(msg) => ApiError::Conflict(msg),
            RegistryError::Database(_) => {
                ApiError::InternalServerError(e.to_string())
            }
        }
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(e: OrchestratorError) -> Self {
        match e {
            OrchestratorError::Pairing(inner) => inner.into(),
            OrchestratorError::Queue(inner) => inner.into(),
            OrchestratorError::Registry(inner) => inner.into(),
        }
    }
}

/// Runs `f` on the blocking pool with a pooled connection.
pub(crate) async fn run_blocking<T, F>(state: &Arc<AppState>, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&AppState, &Connection) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || {
        let conn = state
            .pool
            .get()
            .map_err(|e| ApiError::InternalServerError(format!("db connection failed: {}", e)))?;
        f(state.as_ref(), &*conn)
    })
    .await
    .map_err(|e| ApiError::InternalServerError(format!("task join error: {}", e)))?
}

/// Rejects a blank path or body identifier.
pub(crate) fn require(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest(format!("{field} is required")));
    }
    Ok(())
}
