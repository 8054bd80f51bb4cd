//! Offline queue handlers.

use crate::api::{require, run_blocking, ApiError};
use crate::orchestrator::drain_component;
use crate::AppState;
use axum::{
    extract::{Extension, Json, Path},
    http::StatusCode,
};
use lct_queue::{
    DrainReport, NewOfflineOperation, NewPairingRequest, OfflineOperation, PairingRequest,
    QueueStatus,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Request body for `POST /api/queue/requests/{requestId}/cancel`.
#[derive(Debug, Default, Deserialize)]
pub struct CancelRequestBody {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedRequestsResponse {
    pub component_id: String,
    pub requests: Vec<PairingRequest>,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyQueueResponse {
    pub proxy_id: String,
    pub operations: Vec<OfflineOperation>,
    pub count: usize,
}

/// Handler for `POST /api/queue/requests`.
pub async fn queue_pairing_request_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<NewPairingRequest>,
) -> Result<(StatusCode, Json<PairingRequest>), ApiError> {
    let request = run_blocking(&state, move |state, conn| {
        Ok(state.queue.queue_pairing_request(conn, &payload)?)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// Handler for `GET /api/queue/requests/{requestId}`.
pub async fn get_request_status_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(request_id): Path<String>,
) -> Result<Json<PairingRequest>, ApiError> {
    let request = run_blocking(&state, move |state, conn| {
        Ok(state.queue.get_request_status(conn, &request_id)?)
    })
    .await?;
    Ok(Json(request))
}

/// Handler for `POST /api/queue/requests/{requestId}/cancel`.
pub async fn cancel_request_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(request_id): Path<String>,
    Json(payload): Json<CancelRequestBody>,
) -> Result<Json<PairingRequest>, ApiError> {
    let request = run_blocking(&state, move |state, conn| {
        Ok(state
            .queue
            .cancel_request(conn, &request_id, &payload.reason)?)
    })
    .await?;
    Ok(Json(request))
}

/// Handler for `POST /api/queue/operations`.
///
/// An `operationType` outside `pairing`, `unpairing`, `energy_transfer` is
/// rejected by the JSON extractor before reaching the queue.
pub async fn queue_offline_operation_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<NewOfflineOperation>,
) -> Result<(StatusCode, Json<OfflineOperation>), ApiError> {
    let operation = run_blocking(&state, move |state, conn| {
        Ok(state.queue.queue_offline_operation(conn, &payload)?)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(operation)))
}

/// Handler for `GET /api/queue/components/{componentId}/requests`.
pub async fn get_queued_requests_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(component_id): Path<String>,
) -> Result<Json<QueuedRequestsResponse>, ApiError> {
    let response = run_blocking(&state, move |state, conn| {
        let requests = state.queue.get_queued_requests(conn, &component_id)?;
        Ok(QueuedRequestsResponse {
            component_id,
            count: requests.len(),
            requests,
        })
    })
    .await?;
    Ok(Json(response))
}

/// Handler for `POST /api/queue/components/{componentId}/process`.
///
/// Runs the offline operation drain and then the pairing request drain.
pub async fn process_queue_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(component_id): Path<String>,
) -> Result<Json<DrainReport>, ApiError> {
    let report = run_blocking(&state, move |state, conn| {
        require("componentId", &component_id)?;
        Ok(drain_component(&state.queue, conn, &component_id)?)
    })
    .await?;
    Ok(Json(report))
}

/// Handler for `GET /api/queue/components/{componentId}/status`.
pub async fn get_queue_status_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(component_id): Path<String>,
) -> Result<Json<QueueStatus>, ApiError> {
    let status = run_blocking(&state, move |state, conn| {
        Ok(state.queue.queue_status(conn, &component_id)?)
    })
    .await?;
    Ok(Json(status))
}

/// Handler for `GET /api/queue/proxies/{proxyId}`.
pub async fn list_proxy_queue_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(proxy_id): Path<String>,
) -> Result<Json<ProxyQueueResponse>, ApiError> {
    let response = run_blocking(&state, move |state, conn| {
        let operations = state.queue.list_proxy_queue(conn, &proxy_id)?;
        Ok(ProxyQueueResponse {
            proxy_id,
            count: operations.len(),
            operations,
        })
    })
    .await?;
    Ok(Json(response))
}
