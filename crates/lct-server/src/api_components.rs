//! Component registry and presence handlers.
//!
//! These back the reference collaborators: registration, verification,
//! directional pairing grants, and heartbeats. A heartbeat also drains the
//! component's queue, which is how deferred work catches up when a
//! component comes back online.

use crate::api::{require, run_blocking, ApiError};
use crate::orchestrator::drain_component;
use crate::AppState;
use axum::{
    extract::{Extension, Json, Path},
    http::StatusCode,
};
use lct_registry::{components, presence, Component, NewComponent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Response body for a component lookup.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentView {
    #[serde(flatten)]
    pub component: Component,
    pub online: bool,
    pub last_seen_at: Option<i64>,
}

/// Request body for `POST /api/components/{componentId}/verification`.
#[derive(Debug, Deserialize)]
pub struct VerificationRequest {
    pub verified: bool,
}

/// Request body for `POST /api/components/{componentId}/grants`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantRequest {
    pub partner_id: String,
    #[serde(default)]
    pub context: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantResponse {
    pub component_id: String,
    pub partner_id: String,
    pub context: String,
}

/// Response body for a heartbeat, including the drain it triggered.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    pub component_id: String,
    pub came_online: bool,
    pub last_seen_at: i64,
    pub processed_count: usize,
    pub failed_count: usize,
}

/// Handler for `POST /api/components`.
pub async fn register_component_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<NewComponent>,
) -> Result<(StatusCode, Json<Component>), ApiError> {
    let component = run_blocking(&state, move |_, conn| {
        Ok(components::register_component(conn, &payload)?)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(component)))
}

/// Handler for `GET /api/components/{componentId}`.
pub async fn get_component_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(component_id): Path<String>,
) -> Result<Json<ComponentView>, ApiError> {
    let view = run_blocking(&state, move |state, conn| {
        let component = components::get_component(conn, &component_id)?
            .ok_or_else(|| ApiError::NotFound(format!("component {component_id}")))?;
        Ok(ComponentView {
            online: state.presence.is_online(conn, &component_id)?,
            last_seen_at: presence::last_seen(conn, &component_id)?,
            component,
        })
    })
    .await?;
    Ok(Json(view))
}

/// Handler for `POST /api/components/{componentId}/verification`.
pub async fn set_verification_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(component_id): Path<String>,
    Json(payload): Json<VerificationRequest>,
) -> Result<Json<Component>, ApiError> {
    let component = run_blocking(&state, move |_, conn| {
        components::set_verified(conn, &component_id, payload.verified)?;
        components::get_component(conn, &component_id)?
            .ok_or_else(|| ApiError::NotFound(format!("component {component_id}")))
    })
    .await?;
    Ok(Json(component))
}

/// Handler for `POST /api/components/{componentId}/grants`.
///
/// Lets the path component pair with `partnerId`. Pairing needs a grant in
/// each direction.
pub async fn grant_pairing_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(component_id): Path<String>,
    Json(payload): Json<GrantRequest>,
) -> Result<Json<GrantResponse>, ApiError> {
    let response = run_blocking(&state, move |_, conn| {
        components::grant_pairing(conn, &component_id, &payload.partner_id, &payload.context)?;
        tracing::info!(
            component_id = %component_id,
            partner_id = %payload.partner_id,
            "pairing grant recorded"
        );
        Ok(GrantResponse {
            component_id,
            partner_id: payload.partner_id,
            context: payload.context,
        })
    })
    .await?;
    Ok(Json(response))
}

/// Handler for `DELETE /api/components/{componentId}/grants/{partnerId}`.
pub async fn revoke_grant_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path((component_id, partner_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    run_blocking(&state, move |_, conn| {
        if components::revoke_grant(conn, &component_id, &partner_id)? {
            Ok(StatusCode::NO_CONTENT)
        } else {
            Err(ApiError::NotFound(format!(
                "grant from {component_id} to {partner_id}"
            )))
        }
    })
    .await
}

/// Handler for `POST /api/components/{componentId}/heartbeat`.
pub async fn heartbeat_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(component_id): Path<String>,
) -> Result<Json<HeartbeatResponse>, ApiError> {
    let response = run_blocking(&state, move |state, conn| {
        require("componentId", &component_id)?;
        if components::get_component(conn, &component_id)?.is_none() {
            return Err(ApiError::NotFound(format!("component {component_id}")));
        }

        let came_online = state.presence.heartbeat(conn, &component_id)?;
        let report = drain_component(&state.queue, conn, &component_id)?;
        let last_seen_at = presence::last_seen(conn, &component_id)?.unwrap_or_default();

        Ok(HeartbeatResponse {
            component_id,
            came_online,
            last_seen_at,
            processed_count: report.processed_count,
            failed_count: report.failed_count,
        })
    })
    .await?;
    Ok(Json(response))
}
