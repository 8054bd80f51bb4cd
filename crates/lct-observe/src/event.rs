//! Event domains, payloads and stored records.

use serde::{Deserialize, Serialize};

/// Top-level grouping used for filtering the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventDomain {
    /// Session lifecycle and relationship revocation.
    #[serde(rename = "PAIRING")]
    Pairing,
    /// Pairing requests and offline operations.
    #[serde(rename = "QUEUE")]
    Queue,
}

impl EventDomain {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pairing => "PAIRING",
            Self::Queue => "QUEUE",
        }
    }
}

impl std::fmt::Display for EventDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventDomain {
    type Err = ParseEventDomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PAIRING" => Ok(Self::Pairing),
            "QUEUE" => Ok(Self::Queue),
            _ => Err(ParseEventDomainError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event domain: {0}")]
pub struct ParseEventDomainError(pub String);

/// Structured notification bodies, one variant per event type.
///
/// Serialised into `payload_json` with an `event` tag carrying the
/// SCREAMING_SNAKE_CASE event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPayload {
    // ── Pairing domain ───────────────────────────────────────────────
    PairingInitiated {
        session_id: String,
        relationship_id: String,
        component_a: String,
        component_b: String,
        initiator: String,
        operational_context: String,
        status: String,
        force_immediate: bool,
    },

    PairingCompleted {
        session_id: String,
        relationship_id: String,
        established_at: i64,
    },

    PairingRevoked {
        relationship_id: String,
        reason: String,
        notify_offline: bool,
    },

    // ── Queue domain: pairing requests ───────────────────────────────
    RequestQueued {
        request_id: String,
        initiator_id: String,
        target_id: String,
        request_type: String,
        proxy_id: Option<String>,
    },

    RequestCancelled {
        request_id: String,
        reason: String,
    },

    RequestProcessed {
        request_id: String,
        processed_at: i64,
    },

    RequestRetryScheduled {
        request_id: String,
        retry_count: u32,
        next_retry_at: i64,
        reason: String,
    },

    /// The request spent its retry budget and will not be attempted again.
    RequestFailed {
        request_id: String,
        retry_count: u32,
        reason: String,
    },

    // ── Queue domain: offline operations ─────────────────────────────
    OperationQueued {
        operation_id: String,
        component_id: String,
        operation_type: String,
        proxy_id: Option<String>,
    },

    OperationProcessed {
        operation_id: String,
        component_id: String,
        operation_type: String,
    },

    OperationRetryScheduled {
        operation_id: String,
        retry_count: u32,
        next_retry_at: i64,
        reason: String,
    },

    /// Emitted once, the first time a drain pass finds the budget spent.
    OperationExhausted {
        operation_id: String,
        component_id: String,
        retry_count: u32,
    },
}

impl EventPayload {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PairingInitiated { .. } => "PAIRING_INITIATED",
            Self::PairingCompleted { .. } => "PAIRING_COMPLETED",
            Self::PairingRevoked { .. } => "PAIRING_REVOKED",
            Self::RequestQueued { .. } => "REQUEST_QUEUED",
            Self::RequestCancelled { .. } => "REQUEST_CANCELLED",
            Self::RequestProcessed { .. } => "REQUEST_PROCESSED",
            Self::RequestRetryScheduled { .. } => "REQUEST_RETRY_SCHEDULED",
            Self::RequestFailed { .. } => "REQUEST_FAILED",
            Self::OperationQueued { .. } => "OPERATION_QUEUED",
            Self::OperationProcessed { .. } => "OPERATION_PROCESSED",
            Self::OperationRetryScheduled { .. } => "OPERATION_RETRY_SCHEDULED",
            Self::OperationExhausted { .. } => "OPERATION_EXHAUSTED",
        }
    }

    pub fn entity_type(&self) -> &'static str {
        match self {
            Self::PairingInitiated { .. } | Self::PairingCompleted { .. } => "pairing_session",
            Self::PairingRevoked { .. } => "relationship",
            Self::RequestQueued { .. }
            | Self::RequestCancelled { .. }
            | Self::RequestProcessed { .. }
            | Self::RequestRetryScheduled { .. }
            | Self::RequestFailed { .. } => "pairing_request",
            Self::OperationQueued { .. }
            | Self::OperationProcessed { .. }
            | Self::OperationRetryScheduled { .. }
            | Self::OperationExhausted { .. } => "offline_operation",
        }
    }

    /// The identifier stored in the `entity_id` column.
    pub fn entity_id(&self) -> &str {
        match self {
            Self::PairingInitiated { session_id, .. }
            | Self::PairingCompleted { session_id, .. } => session_id.as_str(),
            Self::PairingRevoked {
                relationship_id, ..
            } => relationship_id.as_str(),
            Self::RequestQueued { request_id, .. }
            | Self::RequestCancelled { request_id, .. }
            | Self::RequestProcessed { request_id, .. }
            | Self::RequestRetryScheduled { request_id, .. }
            | Self::RequestFailed { request_id, .. } => request_id.as_str(),
            Self::OperationQueued { operation_id, .. }
            | Self::OperationProcessed { operation_id, .. }
            | Self::OperationRetryScheduled { operation_id, .. }
            | Self::OperationExhausted { operation_id, .. } => operation_id.as_str(),
        }
    }

    pub fn domain(&self) -> EventDomain {
        match self {
            Self::PairingInitiated { .. }
            | Self::PairingCompleted { .. }
            | Self::PairingRevoked { .. } => EventDomain::Pairing,
            _ => EventDomain::Queue,
        }
    }
}

/// A row of `public_event_log`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicEvent {
    pub id: i64,
    pub domain: String,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    /// Position in the log; strictly increasing.
    pub seq: i64,
    pub payload_json: String,
    /// `YYYY-MM-DD HH:MM:SS` in UTC, as written by SQLite.
    pub occurred_at: String,
}

impl PublicEvent {
    /// Decodes the stored payload back into its typed form.
    pub fn payload(&self) -> Result<EventPayload, serde_json::Error> {
        serde_json::from_str(&self.payload_json)
    }
}
