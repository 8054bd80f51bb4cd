use std::collections::HashMap;
use std::sync::Arc;

use lct_observe::{record_event, EventPayload};
use lct_types::{normalize_proxy_id, AuthorizationGate, Clock};
use rusqlite::Connection;

use crate::error::QueueError;
use crate::handlers::{dispatch, HandlerError, OperationHandlers, PairingRequestExecutor};
use crate::retry::RetryPolicy;
use crate::store;
use crate::types::{
    DrainReport, HealthThresholds, NewOfflineOperation, NewPairingRequest, OfflineOperation,
    PairingRequest, RequestStatus,
};
use crate::{COMPONENT_NOT_VERIFIED, MAX_RETRIES_EXCEEDED, UNKNOWN_OPERATION_TYPE};

/// The offline queue and its drain passes.
///
/// Every method takes the connection to use. Drains call back into the
/// injected handlers on the same connection.
pub struct OfflineQueue {
    gate: Arc<dyn AuthorizationGate>,
    handlers: Arc<dyn OperationHandlers>,
    executor: Option<Arc<dyn PairingRequestExecutor>>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    pub(crate) thresholds: HealthThresholds,
}

impl OfflineQueue {
    pub fn new(
        gate: Arc<dyn AuthorizationGate>,
        handlers: Arc<dyn OperationHandlers>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            gate,
            handlers,
            executor: None,
            clock,
            policy: RetryPolicy::default(),
            thresholds: HealthThresholds::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_health_thresholds(mut self, thresholds: HealthThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Enables [`OfflineQueue::process_pairing_requests`].
    pub fn with_request_executor(mut self, executor: Arc<dyn PairingRequestExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub(crate) fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Queues a pairing intent between two verified, mutually authorized
    /// components.
    pub fn queue_pairing_request(
        &self,
        conn: &Connection,
        req: &NewPairingRequest,
    ) -> Result<PairingRequest, QueueError> {
        let initiator = req.initiator_id.trim();
        let target = req.target_id.trim();
        if initiator.is_empty() || target.is_empty() {
            return Err(QueueError::InvalidRequest(
                "initiatorId and targetId are required".to_string(),
            ));
        }
        if initiator == target {
            return Err(QueueError::InvalidRequest(
                "a component cannot pair with itself".to_string(),
            ));
        }

        if !self.gate.is_verified_for_pairing(conn, initiator)? {
            return Err(QueueError::Unverified(format!(
                "initiator component {initiator} is not verified"
            )));
        }
        if !self.gate.is_verified_for_pairing(conn, target)? {
            return Err(QueueError::Unverified(format!(
                "target component {target} is not verified"
            )));
        }

        let auth = self.gate.check_bidirectional_auth(conn, initiator, target)?;
        if !auth.is_granted() {
            return Err(QueueError::Unauthorized(auth.reason));
        }

        let now = self.now();
        let request = PairingRequest {
            request_id: format!("{initiator}-{target}-{now}-{}", short_suffix()),
            initiator_id: initiator.to_string(),
            target_id: target.to_string(),
            request_type: req.request_type.clone(),
            proxy_id: normalize_proxy_id(req.proxy_id.as_deref()),
            status: RequestStatus::Queued,
            created_at: now,
            processed_at: 0,
            retry_count: 0,
            max_retries: self.policy.request_max_retries,
            last_attempt_at: 0,
            next_retry_at: 0,
            failure_reason: String::new(),
            cancel_reason: None,
        };
        store::insert_request(conn, &request)?;

        tracing::info!(
            request_id = %request.request_id,
            initiator_id = initiator,
            target_id = target,
            "pairing request queued"
        );
        record_event(
            conn,
            &EventPayload::RequestQueued {
                request_id: request.request_id.clone(),
                initiator_id: request.initiator_id.clone(),
                target_id: request.target_id.clone(),
                request_type: request.request_type.clone(),
                proxy_id: request.proxy_id.clone(),
            },
        );
        Ok(request)
    }

    /// Defers an operation for a verified component.
    pub fn queue_offline_operation(
        &self,
        conn: &Connection,
        req: &NewOfflineOperation,
    ) -> Result<OfflineOperation, QueueError> {
        let component = req.component_id.trim();
        if component.is_empty() {
            return Err(QueueError::InvalidRequest(
                "componentId is required".to_string(),
            ));
        }
        if !self.gate.is_verified_for_pairing(conn, component)? {
            return Err(QueueError::Unverified(format!(
                "component {component} is not verified"
            )));
        }

        let now = self.now();
        let operation = OfflineOperation {
            operation_id: format!("{component}-{}-{now}-{}", req.kind, short_suffix()),
            component_id: component.to_string(),
            operation_type: req.kind.as_str().to_string(),
            proxy_id: normalize_proxy_id(req.proxy_id.as_deref()),
            payload: req.payload.clone(),
            queued_at: now,
            retry_count: 0,
            max_retries: self.policy.operation_max_retries,
            last_attempt_at: 0,
            next_retry_at: 0,
            failure_reason: String::new(),
        };
        store::insert_operation(conn, &operation)?;

        tracing::info!(
            operation_id = %operation.operation_id,
            component_id = component,
            operation_type = %req.kind,
            "offline operation queued"
        );
        record_event(
            conn,
            &EventPayload::OperationQueued {
                operation_id: operation.operation_id.clone(),
                component_id: operation.component_id.clone(),
                operation_type: operation.operation_type.clone(),
                proxy_id: operation.proxy_id.clone(),
            },
        );
        Ok(operation)
    }

    /// Runs one drain pass over the component's offline operations.
    ///
    /// Every record is visited once from a snapshot taken at the start.
    /// Records not yet due are skipped. A due record is claimed before it is
    /// touched; a record claimed by a concurrent pass is skipped, and a claim
    /// left behind by a pass that died releases after the longest backoff.
    /// Exhausted records are marked and kept. If the component no longer
    /// verifies, due records are pushed back by the unverified delay.
    /// Otherwise the record is dispatched: on success it is deleted, on
    /// failure it is rescheduled with backoff.
    pub fn process_offline_queue(
        &self,
        conn: &Connection,
        component_id: &str,
    ) -> Result<DrainReport, QueueError> {
        let snapshot = store::operations_for(conn, component_id)?;
        let now = self.now();
        let mut report = DrainReport::default();
        let mut verified: Option<bool> = None;

        for mut op in snapshot {
            if !op.is_due(now) {
                continue;
            }

            if op.budget_spent() && op.failure_reason == MAX_RETRIES_EXCEEDED {
                continue;
            }
            match self.claim_operation(conn, &op, now) {
                Some(true) => {}
                Some(false) => continue,
                None => {
                    report.failed_count += 1;
                    continue;
                }
            }

            if op.budget_spent() {
                op.failure_reason = MAX_RETRIES_EXCEEDED.to_string();
                if self.persist_operation(conn, &op) {
                    tracing::warn!(
                        operation_id = %op.operation_id,
                        retry_count = op.retry_count,
                        "offline operation exhausted its retries"
                    );
                    record_event(
                        conn,
                        &EventPayload::OperationExhausted {
                            operation_id: op.operation_id.clone(),
                            component_id: op.component_id.clone(),
                            retry_count: op.retry_count,
                        },
                    );
                } else {
                    report.failed_count += 1;
                }
                continue;
            }

            let is_verified = *verified.get_or_insert_with(|| self.verify(conn, component_id));
            if !is_verified {
                op.retry_count += 1;
                op.last_attempt_at = now;
                op.next_retry_at = now + self.policy.unverified_retry_delay_secs;
                op.failure_reason = COMPONENT_NOT_VERIFIED.to_string();
                if self.persist_operation(conn, &op) {
                    self.note_operation_retry(conn, &op);
                } else {
                    report.failed_count += 1;
                }
                continue;
            }

            let outcome = match op.kind() {
                Ok(kind) => dispatch(self.handlers.as_ref(), conn, kind, &op),
                Err(_) => Err(HandlerError::new(UNKNOWN_OPERATION_TYPE)),
            };

            match outcome {
                Ok(()) => {
                    report.processed_count += 1;
                    if let Err(e) = store::delete_operation(conn, &op.operation_id) {
                        tracing::warn!(
                            operation_id = %op.operation_id,
                            error = %e,
                            "failed to remove processed operation"
                        );
                        report.failed_count += 1;
                        continue;
                    }
                    record_event(
                        conn,
                        &EventPayload::OperationProcessed {
                            operation_id: op.operation_id.clone(),
                            component_id: op.component_id.clone(),
                            operation_type: op.operation_type.clone(),
                        },
                    );
                }
                Err(e) => {
                    report.failed_count += 1;
                    op.retry_count += 1;
                    op.last_attempt_at = now;
                    op.next_retry_at = now + self.policy.backoff_delay(op.retry_count);
                    op.failure_reason = e.0;
                    if self.persist_operation(conn, &op) {
                        self.note_operation_retry(conn, &op);
                    }
                }
            }
        }

        log_drain("offline operations", component_id, report);
        Ok(report)
    }

    /// Runs one drain pass over queued pairing requests naming the component
    /// on either side.
    ///
    /// Due requests are claimed the same way as offline operations.
    /// Both sides must still be verified and mutually authorized; otherwise
    /// the request is pushed back by the unverified delay. A request that
    /// spends its last retry becomes `failed`. Without an executor the pass
    /// does nothing.
    pub fn process_pairing_requests(
        &self,
        conn: &Connection,
        component_id: &str,
    ) -> Result<DrainReport, QueueError> {
        let Some(executor) = self.executor.as_ref() else {
            return Ok(DrainReport::default());
        };

        let snapshot = store::queued_requests_for(conn, component_id)?;
        let now = self.now();
        let mut report = DrainReport::default();
        let mut verified: HashMap<String, bool> = HashMap::new();

        for mut req in snapshot {
            if !req.is_due(now) {
                continue;
            }
            match self.claim_request(conn, &req, now) {
                Some(true) => {}
                Some(false) => continue,
                None => {
                    report.failed_count += 1;
                    continue;
                }
            }

            if req.budget_spent() {
                req.failure_reason = MAX_RETRIES_EXCEEDED.to_string();
                self.fail_request(conn, &mut req, now, &mut report);
                continue;
            }

            let mut deferral = None;
            for side in [req.initiator_id.as_str(), req.target_id.as_str()] {
                let ok = *verified
                    .entry(side.to_string())
                    .or_insert_with(|| self.verify(conn, side));
                if !ok {
                    deferral = Some(COMPONENT_NOT_VERIFIED.to_string());
                    break;
                }
            }
            if deferral.is_none() {
                match self
                    .gate
                    .check_bidirectional_auth(conn, &req.initiator_id, &req.target_id)
                {
                    Ok(auth) if auth.is_granted() => {}
                    Ok(auth) => deferral = Some(format!("pairing not authorized: {}", auth.reason)),
                    Err(e) => deferral = Some(format!("authorization check failed: {e}")),
                }
            }

            if let Some(reason) = deferral {
                req.retry_count += 1;
                req.last_attempt_at = now;
                req.next_retry_at = now + self.policy.unverified_retry_delay_secs;
                req.failure_reason = reason;
                if req.budget_spent() {
                    self.fail_request(conn, &mut req, now, &mut report);
                } else if self.persist_request(conn, &req) {
                    self.note_request_retry(conn, &req);
                } else {
                    report.failed_count += 1;
                }
                continue;
            }

            match executor.execute(conn, &req) {
                Ok(()) => {
                    req.status = RequestStatus::Processed;
                    req.processed_at = now;
                    req.last_attempt_at = now;
                    req.failure_reason.clear();
                    if self.persist_request(conn, &req) {
                        report.processed_count += 1;
                        record_event(
                            conn,
                            &EventPayload::RequestProcessed {
                                request_id: req.request_id.clone(),
                                processed_at: now,
                            },
                        );
                    } else {
                        report.failed_count += 1;
                    }
                }
                Err(e) => {
                    report.failed_count += 1;
                    req.retry_count += 1;
                    req.last_attempt_at = now;
                    req.next_retry_at = now + self.policy.backoff_delay(req.retry_count);
                    req.failure_reason = e.0;
                    if req.budget_spent() {
                        let mut ignored = DrainReport::default();
                        self.fail_request(conn, &mut req, now, &mut ignored);
                    } else if self.persist_request(conn, &req) {
                        self.note_request_retry(conn, &req);
                    }
                }
            }
        }

        log_drain("pairing requests", component_id, report);
        Ok(report)
    }

    /// Cancels a queued request.
    pub fn cancel_request(
        &self,
        conn: &Connection,
        request_id: &str,
        reason: &str,
    ) -> Result<PairingRequest, QueueError> {
        let mut req = self.get_request_status(conn, request_id)?;
        if req.status != RequestStatus::Queued {
            return Err(QueueError::InvalidState {
                request_id: req.request_id,
                status: req.status.to_string(),
            });
        }

        req.status = RequestStatus::Cancelled;
        req.cancel_reason = Some(reason.to_string());
        req.processed_at = self.now();
        store::update_request(conn, &req)?;

        tracing::info!(request_id, reason, "pairing request cancelled");
        record_event(
            conn,
            &EventPayload::RequestCancelled {
                request_id: req.request_id.clone(),
                reason: reason.to_string(),
            },
        );
        Ok(req)
    }

    /// Queued requests where the component is initiator or target.
    pub fn get_queued_requests(
        &self,
        conn: &Connection,
        component_id: &str,
    ) -> Result<Vec<PairingRequest>, QueueError> {
        require("componentId", component_id)?;
        Ok(store::queued_requests_for(conn, component_id)?)
    }

    pub fn get_request_status(
        &self,
        conn: &Connection,
        request_id: &str,
    ) -> Result<PairingRequest, QueueError> {
        require("requestId", request_id)?;
        store::get_request(conn, request_id)?
            .ok_or_else(|| QueueError::NotFound(format!("pairing request {request_id}")))
    }

    /// Offline operations queued on behalf of a proxy.
    pub fn list_proxy_queue(
        &self,
        conn: &Connection,
        proxy_id: &str,
    ) -> Result<Vec<OfflineOperation>, QueueError> {
        require("proxyId", proxy_id)?;
        Ok(store::operations_for_proxy(conn, proxy_id.trim())?)
    }

    /// Components with work due now, for the host's scheduler.
    pub fn components_with_due_work(&self, conn: &Connection) -> Result<Vec<String>, QueueError> {
        Ok(store::components_with_due_work(conn, self.now())?)
    }

    /// Claims a due operation. `None` when the claim could not be written.
    fn claim_operation(
        &self,
        conn: &Connection,
        op: &OfflineOperation,
        now: i64,
    ) -> Option<bool> {
        let lease_until = now + self.policy.max_retry_delay_secs;
        match store::claim_operation(conn, op, now, lease_until) {
            Ok(won) => {
                if !won {
                    tracing::debug!(
                        operation_id = %op.operation_id,
                        "operation claimed by another drain"
                    );
                }
                Some(won)
            }
            Err(e) => {
                tracing::warn!(
                    operation_id = %op.operation_id,
                    error = %e,
                    "failed to claim offline operation"
                );
                None
            }
        }
    }

    fn claim_request(&self, conn: &Connection, req: &PairingRequest, now: i64) -> Option<bool> {
        let lease_until = now + self.policy.max_retry_delay_secs;
        match store::claim_request(conn, req, now, lease_until) {
            Ok(won) => {
                if !won {
                    tracing::debug!(
                        request_id = %req.request_id,
                        "request claimed by another drain"
                    );
                }
                Some(won)
            }
            Err(e) => {
                tracing::warn!(
                    request_id = %req.request_id,
                    error = %e,
                    "failed to claim pairing request"
                );
                None
            }
        }
    }

    fn verify(&self, conn: &Connection, component_id: &str) -> bool {
        match self.gate.is_verified_for_pairing(conn, component_id) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(component_id, error = %e, "verification check failed");
                false
            }
        }
    }

    fn persist_operation(&self, conn: &Connection, op: &OfflineOperation) -> bool {
        match store::update_operation(conn, op) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(operation_id = %op.operation_id, error = %e, "failed to update offline operation");
                false
            }
        }
    }

    fn persist_request(&self, conn: &Connection, req: &PairingRequest) -> bool {
        match store::update_request(conn, req) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(request_id = %req.request_id, error = %e, "failed to update pairing request");
                false
            }
        }
    }

    fn note_operation_retry(&self, conn: &Connection, op: &OfflineOperation) {
        tracing::debug!(
            operation_id = %op.operation_id,
            retry_count = op.retry_count,
            next_retry_at = op.next_retry_at,
            reason = %op.failure_reason,
            "offline operation rescheduled"
        );
        record_event(
            conn,
            &EventPayload::OperationRetryScheduled {
                operation_id: op.operation_id.clone(),
                retry_count: op.retry_count,
                next_retry_at: op.next_retry_at,
                reason: op.failure_reason.clone(),
            },
        );
    }

    fn note_request_retry(&self, conn: &Connection, req: &PairingRequest) {
        tracing::debug!(
            request_id = %req.request_id,
            retry_count = req.retry_count,
            next_retry_at = req.next_retry_at,
            reason = %req.failure_reason,
            "pairing request rescheduled"
        );
        record_event(
            conn,
            &EventPayload::RequestRetryScheduled {
                request_id: req.request_id.clone(),
                retry_count: req.retry_count,
                next_retry_at: req.next_retry_at,
                reason: req.failure_reason.clone(),
            },
        );
    }

    /// Moves a request to `failed`. A failed write counts against `report`.
    fn fail_request(
        &self,
        conn: &Connection,
        req: &mut PairingRequest,
        now: i64,
        report: &mut DrainReport,
    ) {
        req.status = RequestStatus::Failed;
        req.processed_at = now;
        if !self.persist_request(conn, req) {
            report.failed_count += 1;
            return;
        }
        tracing::warn!(
            request_id = %req.request_id,
            retry_count = req.retry_count,
            reason = %req.failure_reason,
            "pairing request failed permanently"
        );
        record_event(
            conn,
            &EventPayload::RequestFailed {
                request_id: req.request_id.clone(),
                retry_count: req.retry_count,
                reason: req.failure_reason.clone(),
            },
        );
    }
}

fn require(field: &str, value: &str) -> Result<(), QueueError> {
    if value.trim().is_empty() {
        return Err(QueueError::InvalidRequest(format!("{field} is required")));
    }
    Ok(())
}

fn short_suffix() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

fn log_drain(what: &str, component_id: &str, report: DrainReport) {
    if report.is_empty() {
        tracing::debug!(component_id, what, "drain pass found nothing to do");
    } else {
        tracing::info!(
            component_id,
            what,
            processed = report.processed_count,
            failed = report.failed_count,
            "drain pass finished"
        );
    }
}
