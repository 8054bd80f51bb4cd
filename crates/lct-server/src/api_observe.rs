//! Notification log handler.
//!
//! `GET /api/events` returns pairing and queue notifications oldest first,
//! filtered by the query parameters below.

use crate::api::{run_blocking, ApiError};
use crate::AppState;
use axum::extract::{Extension, Json, Query};
use lct_observe::{query_events, EventDomain, EventFilter, PublicEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Query parameters for `GET /api/events`.
#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Filter by event domain (`PAIRING` or `QUEUE`).
    pub domain: Option<String>,
    /// Filter by event type (e.g., `PAIRING_COMPLETED`).
    pub event_type: Option<String>,
    /// Filter by entity type (e.g., `pairing_request`).
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    /// Events at or after this `YYYY-MM-DD HH:MM:SS` timestamp.
    pub since: Option<String>,
    /// Events with a sequence number above this cursor.
    pub after_seq: Option<i64>,
    /// Maximum number of events to return (default: 100, max: 1000).
    pub limit: Option<i64>,
}

/// Response wrapper for event retrieval.
#[derive(Debug, Serialize, Deserialize)]
pub struct EventsResponse {
    pub events: Vec<PublicEvent>,
    pub count: usize,
}

/// Handler for `GET /api/events`.
pub async fn get_events_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<EventsQuery>,
) -> Result<Json<EventsResponse>, ApiError> {
    let domain = match &params.domain {
        Some(d) => Some(d.parse::<EventDomain>().map_err(|_| {
            ApiError::BadRequest(format!(
                "invalid domain: {}. Expected one of: PAIRING, QUEUE",
                d
            ))
        })?),
        None => None,
    };

    let filter = EventFilter {
        domain,
        event_type: params.event_type,
        entity_type: params.entity_type,
        entity_id: params.entity_id,
        since: params.since,
        after_seq: params.after_seq,
        limit: Some(params.limit.unwrap_or(100).clamp(1, 1000)),
    };

    let events = run_blocking(&state, move |_, conn| {
        query_events(conn, &filter).map_err(|e| ApiError::InternalServerError(e.to_string()))
    })
    .await?;

    let count = events.len();
    Ok(Json(EventsResponse { events, count }))
}
