/// Errors from the notification log.
#[derive(Debug, thiserror::Error)]
pub enum ObserveError {
    #[error("event log database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("event payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
