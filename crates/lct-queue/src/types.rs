//! Queue records and report types.

use lct_types::{OperationKind, ParseOperationKindError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Queued,
    Cancelled,
    Processed,
    Failed,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Cancelled => "cancelled",
            Self::Processed => "processed",
            Self::Failed => "failed",
        }
    }

    pub(crate) fn from_column(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "cancelled" => Some(Self::Cancelled),
            "processed" => Some(Self::Processed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input to [`OfflineQueue::queue_pairing_request`](crate::OfflineQueue::queue_pairing_request).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPairingRequest {
    pub initiator_id: String,
    pub target_id: String,
    #[serde(default)]
    pub request_type: String,
    #[serde(default)]
    pub proxy_id: Option<String>,
}

/// A queued pairing intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingRequest {
    pub request_id: String,
    pub initiator_id: String,
    pub target_id: String,
    pub request_type: String,
    pub proxy_id: Option<String>,
    pub status: RequestStatus,
    pub created_at: i64,
    /// When the request reached a terminal status; zero while queued.
    pub processed_at: i64,
    pub retry_count: u32,
    pub max_retries: u32,
    pub last_attempt_at: i64,
    pub next_retry_at: i64,
    pub failure_reason: String,
    pub cancel_reason: Option<String>,
}

impl PairingRequest {
    pub fn is_due(&self, now: i64) -> bool {
        self.next_retry_at <= now
    }

    pub fn budget_spent(&self) -> bool {
        self.retry_count >= self.max_retries
    }

    /// The side of the pairing that is not `component_id`.
    pub fn counterpart(&self, component_id: &str) -> &str {
        if self.initiator_id == component_id {
            &self.target_id
        } else {
            &self.initiator_id
        }
    }
}

/// Input to [`OfflineQueue::queue_offline_operation`](crate::OfflineQueue::queue_offline_operation).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOfflineOperation {
    pub component_id: String,
    #[serde(rename = "operationType")]
    pub kind: OperationKind,
    #[serde(default)]
    pub proxy_id: Option<String>,
    /// Handler arguments, passed through untouched.
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
}

/// A deferred operation for one component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineOperation {
    pub operation_id: String,
    pub component_id: String,
    /// Stored label. Rows can carry labels this build does not know; see
    /// [`OfflineOperation::kind`].
    pub operation_type: String,
    pub proxy_id: Option<String>,
    pub payload: Option<serde_json::Value>,
    pub queued_at: i64,
    pub retry_count: u32,
    pub max_retries: u32,
    pub last_attempt_at: i64,
    pub next_retry_at: i64,
    pub failure_reason: String,
}

impl OfflineOperation {
    pub fn kind(&self) -> Result<OperationKind, ParseOperationKindError> {
        self.operation_type.parse()
    }

    pub fn is_due(&self, now: i64) -> bool {
        self.next_retry_at <= now
    }

    pub fn budget_spent(&self) -> bool {
        self.retry_count >= self.max_retries
    }

    /// Reads a string field from the payload.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.as_ref()?.get(key)?.as_str()
    }
}

/// Outcome of a drain pass.
///
/// Records skipped as not yet due, deferred for verification, or already
/// exhausted are in neither count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    pub processed_count: usize,
    pub failed_count: usize,
}

impl DrainReport {
    pub fn is_empty(&self) -> bool {
        self.processed_count == 0 && self.failed_count == 0
    }
}

impl std::ops::Add for DrainReport {
    type Output = DrainReport;

    fn add(self, rhs: DrainReport) -> DrainReport {
        DrainReport {
            processed_count: self.processed_count + rhs.processed_count,
            failed_count: self.failed_count + rhs.failed_count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueHealth {
    Healthy,
    Warning,
    Critical,
}

/// Cut-offs for [`QueueHealth`]. `critical` wins over `warning`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthThresholds {
    pub critical_failures: u32,
    pub warning_retries: u32,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            critical_failures: 1,
            warning_retries: 1,
        }
    }
}

impl HealthThresholds {
    pub fn classify(&self, failed_operations: u32, total_retries: u32) -> QueueHealth {
        if failed_operations >= self.critical_failures {
            QueueHealth::Critical
        } else if total_retries >= self.warning_retries {
            QueueHealth::Warning
        } else {
            QueueHealth::Healthy
        }
    }
}

/// Read-only snapshot of one component's queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub component_id: String,
    pub timestamp: i64,
    pub queued_requests: u32,
    pub offline_operations: u32,
    /// Sum of `retry_count` over the component's offline operations.
    pub total_retries: u32,
    /// Operations whose retry budget is spent.
    pub failed_operations: u32,
    /// Mean delay, in seconds, scheduled after the latest attempt of each
    /// retried operation.
    pub average_retry_delay: i64,
    /// Latest attempt across the component's operations, zero if none.
    pub last_processed_at: i64,
    pub queue_health: QueueHealth,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_takes_precedence() {
        let t = HealthThresholds::default();
        assert_eq!(t.classify(0, 0), QueueHealth::Healthy);
        assert_eq!(t.classify(0, 3), QueueHealth::Warning);
        assert_eq!(t.classify(1, 3), QueueHealth::Critical);

        let lenient = HealthThresholds {
            critical_failures: 3,
            warning_retries: 10,
        };
        assert_eq!(lenient.classify(2, 9), QueueHealth::Healthy);
    }

    #[test]
    fn new_operation_reads_operation_type_field() {
        let op: NewOfflineOperation = serde_json::from_value(serde_json::json!({
            "componentId": "cell-1",
            "operationType": "energy_transfer",
            "payload": { "amount": 5 }
        }))
        .unwrap();
        assert_eq!(op.kind, OperationKind::EnergyTransfer);
        assert_eq!(op.proxy_id, None);

        let bad = serde_json::from_value::<NewOfflineOperation>(serde_json::json!({
            "componentId": "cell-1",
            "operationType": "teleport"
        }));
        assert!(bad.is_err());
    }

    #[test]
    fn counterpart_is_the_other_side() {
        let req = PairingRequest {
            request_id: "r".into(),
            initiator_id: "a".into(),
            target_id: "b".into(),
            request_type: String::new(),
            proxy_id: None,
            status: RequestStatus::Queued,
            created_at: 0,
            processed_at: 0,
            retry_count: 0,
            max_retries: 3,
            last_attempt_at: 0,
            next_retry_at: 0,
            failure_reason: String::new(),
            cancel_reason: None,
        };
        assert_eq!(req.counterpart("a"), "b");
        assert_eq!(req.counterpart("b"), "a");
    }
}
