//! Routes pairing intents by presence and executes drained work.
//!
//! A pairing runs immediately when it is forced or both components are
//! online; otherwise it is queued and replayed by a later drain. The drain
//! calls back into [`LedgerOperationHandlers`] and
//! [`SessionRequestExecutor`], which use the same pairing manager as the
//! HTTP surface.

use lct_pairing::{
    InitiatePairingRequest, InitiatedPairing, PairingError, PairingManager, RevokePairingRequest,
};
use lct_queue::{
    DrainReport, HandlerError, NewPairingRequest, OfflineOperation, OfflineQueue,
    OperationHandlers, PairingRequest, PairingRequestExecutor, QueueError,
};
use lct_registry::{
    presence, relationships, trust, RegistryError, RelationshipStatus, TrustOutcome,
};
use lct_types::Clock;
use rusqlite::Connection;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Request type recorded when a queued pairing carries no context.
pub const DEFAULT_REQUEST_TYPE: &str = "pairing";

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Pairing(#[from] PairingError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Heartbeat-based presence with a fixed online window.
#[derive(Debug, Clone)]
pub struct PresenceWindow {
    clock: Arc<dyn Clock>,
    window_secs: i64,
}

impl PresenceWindow {
    pub fn new(clock: Arc<dyn Clock>, window_secs: i64) -> Self {
        Self { clock, window_secs }
    }

    pub fn window_secs(&self) -> i64 {
        self.window_secs
    }

    pub fn is_online(&self, conn: &Connection, component_id: &str) -> Result<bool, RegistryError> {
        presence::is_online(conn, component_id, self.clock.now(), self.window_secs)
    }

    /// Records a heartbeat; `true` when the component just came online.
    pub fn heartbeat(&self, conn: &Connection, component_id: &str) -> Result<bool, RegistryError> {
        presence::record_heartbeat(conn, component_id, self.clock.now(), self.window_secs)
    }

    fn require_online(&self, conn: &Connection, component_id: &str) -> Result<(), HandlerError> {
        match self.is_online(conn, component_id) {
            Ok(true) => Ok(()),
            Ok(false) => Err(HandlerError::new(format!("{component_id} is offline"))),
            Err(e) => Err(HandlerError::new(e.to_string())),
        }
    }
}

/// Where a pairing intent ended up.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PairingRoute {
    Immediate(InitiatedPairing),
    Queued(PairingRequest),
}

/// Starts the pairing now when forced or when both sides are online,
/// otherwise queues it as a pairing request from A to B.
pub fn route_pairing(
    pairing: &PairingManager,
    queue: &OfflineQueue,
    presence: &PresenceWindow,
    conn: &Connection,
    req: &InitiatePairingRequest,
) -> Result<PairingRoute, OrchestratorError> {
    let immediate = req.force_immediate
        || (presence.is_online(conn, &req.component_a)?
            && presence.is_online(conn, &req.component_b)?);

    if immediate {
        let initiated = pairing.initiate_pairing(conn, req)?;
        return Ok(PairingRoute::Immediate(initiated));
    }

    let request_type = if req.operational_context.trim().is_empty() {
        DEFAULT_REQUEST_TYPE.to_string()
    } else {
        req.operational_context.clone()
    };
    let queued = queue.queue_pairing_request(
        conn,
        &NewPairingRequest {
            initiator_id: req.component_a.clone(),
            target_id: req.component_b.clone(),
            request_type,
            proxy_id: req.proxy_id.clone(),
        },
    )?;
    tracing::info!(
        request_id = %queued.request_id,
        component_a = %req.component_a,
        component_b = %req.component_b,
        "pairing deferred until both components are online"
    );
    Ok(PairingRoute::Queued(queued))
}

/// Runs both drain passes for a component.
pub fn drain_component(
    queue: &OfflineQueue,
    conn: &Connection,
    component_id: &str,
) -> Result<DrainReport, QueueError> {
    let operations = queue.process_offline_queue(conn, component_id)?;
    let requests = queue.process_pairing_requests(conn, component_id)?;
    Ok(operations + requests)
}

fn payload_bool(op: &OfflineOperation, key: &str) -> Option<bool> {
    op.payload.as_ref()?.get(key)?.as_bool()
}

fn payload_f64(op: &OfflineOperation, key: &str) -> Option<f64> {
    op.payload.as_ref()?.get(key)?.as_f64()
}

fn required<'a>(op: &'a OfflineOperation, key: &str) -> Result<&'a str, HandlerError> {
    op.payload_str(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| HandlerError::new(format!("payload.{key} is required")))
}

/// Executes offline operations against the pairing manager and the
/// relationship ledger.
///
/// Payloads:
/// - `pairing`: `partnerId`, optional `operationalContext`
/// - `unpairing`: `relationshipId`, optional `reason`, `notifyOffline`
/// - `energy_transfer`: `relationshipId`, `amount` (> 0)
pub struct LedgerOperationHandlers {
    pairing: Arc<PairingManager>,
    presence: PresenceWindow,
}

impl LedgerOperationHandlers {
    pub fn new(pairing: Arc<PairingManager>, presence: PresenceWindow) -> Self {
        Self { pairing, presence }
    }
}

impl OperationHandlers for LedgerOperationHandlers {
    fn pairing(&self, conn: &Connection, op: &OfflineOperation) -> Result<(), HandlerError> {
        let partner = required(op, "partnerId")?;
        self.presence.require_online(conn, partner)?;

        let initiated = self
            .pairing
            .initiate_pairing(
                conn,
                &InitiatePairingRequest {
                    initiator: op.component_id.clone(),
                    component_a: op.component_id.clone(),
                    component_b: partner.to_string(),
                    operational_context: op
                        .payload_str("operationalContext")
                        .unwrap_or_default()
                        .to_string(),
                    proxy_id: op.proxy_id.clone(),
                    force_immediate: false,
                },
            )
            .map_err(|e| HandlerError::new(e.to_string()))?;

        tracing::info!(
            operation_id = %op.operation_id,
            session_id = %initiated.session_id,
            "offline pairing started a session"
        );
        Ok(())
    }

    fn unpairing(&self, conn: &Connection, op: &OfflineOperation) -> Result<(), HandlerError> {
        let relationship_id = required(op, "relationshipId")?;
        self.pairing
            .revoke_pairing(
                conn,
                &RevokePairingRequest {
                    relationship_id: relationship_id.to_string(),
                    reason: op.payload_str("reason").unwrap_or("offline unpairing").to_string(),
                    notify_offline: payload_bool(op, "notifyOffline").unwrap_or(true),
                },
            )
            .map_err(|e| HandlerError::new(e.to_string()))
    }

    fn energy_transfer(
        &self,
        conn: &Connection,
        op: &OfflineOperation,
    ) -> Result<(), HandlerError> {
        let relationship_id = required(op, "relationshipId")?;
        let amount = payload_f64(op, "amount")
            .filter(|a| a.is_finite() && *a > 0.0)
            .ok_or_else(|| HandlerError::new("payload.amount must be a positive number"))?;

        let relationship = relationships::get_relationship(conn, relationship_id)
            .map_err(|e| HandlerError::new(e.to_string()))?
            .ok_or_else(|| HandlerError::new(format!("relationship {relationship_id} not found")))?;
        if relationship.status != RelationshipStatus::Active {
            return Err(HandlerError::new(format!(
                "relationship {relationship_id} is terminated"
            )));
        }
        if !relationship.involves(&op.component_id) {
            return Err(HandlerError::new(format!(
                "{} is not part of relationship {relationship_id}",
                op.component_id
            )));
        }
        let counterpart = if relationship.component_a == op.component_id {
            &relationship.component_b
        } else {
            &relationship.component_a
        };
        self.presence.require_online(conn, counterpart)?;

        trust::record_outcome(conn, relationship_id, "energy_transfer", TrustOutcome::Positive)
            .map_err(|e| HandlerError::new(e.to_string()))?;
        tracing::info!(
            operation_id = %op.operation_id,
            relationship_id,
            amount,
            "energy transfer settled"
        );
        Ok(())
    }
}

/// Replays a queued pairing request as a pairing session once both sides
/// are online. The request type is used as the operational context.
pub struct SessionRequestExecutor {
    pairing: Arc<PairingManager>,
    presence: PresenceWindow,
}

impl SessionRequestExecutor {
    pub fn new(pairing: Arc<PairingManager>, presence: PresenceWindow) -> Self {
        Self { pairing, presence }
    }
}

impl PairingRequestExecutor for SessionRequestExecutor {
    fn execute(&self, conn: &Connection, request: &PairingRequest) -> Result<(), HandlerError> {
        self.presence.require_online(conn, &request.initiator_id)?;
        self.presence.require_online(conn, &request.target_id)?;

        let initiated = self
            .pairing
            .initiate_pairing(
                conn,
                &InitiatePairingRequest {
                    initiator: request.initiator_id.clone(),
                    component_a: request.initiator_id.clone(),
                    component_b: request.target_id.clone(),
                    operational_context: request.request_type.clone(),
                    proxy_id: request.proxy_id.clone(),
                    force_immediate: false,
                },
            )
            .map_err(|e| HandlerError::new(e.to_string()))?;

        tracing::info!(
            request_id = %request.request_id,
            session_id = %initiated.session_id,
            "queued pairing request started a session"
        );
        Ok(())
    }
}
