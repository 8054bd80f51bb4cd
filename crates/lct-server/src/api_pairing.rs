//! Pairing session handlers.

use crate::api::{run_blocking, ApiError};
use crate::orchestrator::{route_pairing, PairingRoute};
use crate::AppState;
use axum::{
    extract::{Extension, Json, Path, Query},
    http::StatusCode,
};
use lct_pairing::{
    AuthValidation, CompletePairingRequest, CompletedPairing, InitiatePairingRequest,
    PairingSession, RevokePairingRequest,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivePairingsResponse {
    pub sessions: Vec<PairingSession>,
    pub count: usize,
}

/// Query parameters for `GET /api/pairing/auth`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthQuery {
    pub component_a: String,
    pub component_b: String,
}

/// Handler for `POST /api/pairing/initiate`.
///
/// Returns `201` with `mode: "immediate"` and the new session, or `202`
/// with `mode: "queued"` and the pairing request when a side is offline.
pub async fn initiate_pairing_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<InitiatePairingRequest>,
) -> Result<(StatusCode, Json<PairingRoute>), ApiError> {
    let route = run_blocking(&state, move |state, conn| {
        Ok(route_pairing(
            &state.pairing,
            &state.queue,
            &state.presence,
            conn,
            &payload,
        )?)
    })
    .await?;

    let status = match route {
        PairingRoute::Immediate(_) => StatusCode::CREATED,
        PairingRoute::Queued(_) => StatusCode::ACCEPTED,
    };
    Ok((status, Json(route)))
}

/// Handler for `POST /api/pairing/complete`.
pub async fn complete_pairing_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<CompletePairingRequest>,
) -> Result<Json<CompletedPairing>, ApiError> {
    let completed = run_blocking(&state, move |state, conn| {
        Ok(state.pairing.complete_pairing(conn, &payload)?)
    })
    .await?;
    Ok(Json(completed))
}

/// Handler for `POST /api/pairing/revoke`.
pub async fn revoke_pairing_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<RevokePairingRequest>,
) -> Result<StatusCode, ApiError> {
    run_blocking(&state, move |state, conn| {
        state.pairing.revoke_pairing(conn, &payload)?;
        Ok(StatusCode::NO_CONTENT)
    })
    .await
}

/// Handler for `GET /api/pairing/sessions/{sessionId}`.
pub async fn get_pairing_status_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<PairingSession>, ApiError> {
    let session = run_blocking(&state, move |state, conn| {
        Ok(state.pairing.pairing_status(conn, &session_id)?)
    })
    .await?;
    Ok(Json(session))
}

/// Handler for `GET /api/pairing/active`.
pub async fn list_active_pairings_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<ActivePairingsResponse>, ApiError> {
    let sessions = run_blocking(&state, move |state, conn| {
        Ok(state.pairing.list_active_pairings(conn)?)
    })
    .await?;
    let count = sessions.len();
    Ok(Json(ActivePairingsResponse { sessions, count }))
}

/// Handler for `GET /api/pairing/auth?componentA=..&componentB=..`.
///
/// Reports whether each side may pair with the other without creating
/// anything.
pub async fn validate_auth_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<AuthQuery>,
) -> Result<Json<AuthValidation>, ApiError> {
    let validation = run_blocking(&state, move |state, conn| {
        Ok(state
            .pairing
            .validate_bidirectional_auth(conn, &params.component_a, &params.component_b)?)
    })
    .await?;
    Ok(Json(validation))
}
