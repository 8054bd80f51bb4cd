//! Offline operation queue, retry engine and queue introspection.
//!
//! Two kinds of deferred work live here:
//!
//! - **Pairing requests**: a pairing intent between two verified, mutually
//!   authorized components that could not run immediately. Requests move
//!   `queued → processed | cancelled | failed` and are kept afterwards.
//! - **Offline operations**: a `pairing`, `unpairing` or `energy_transfer`
//!   for one component. Operations are deleted when they succeed and are
//!   otherwise rescheduled with exponential backoff until their retry
//!   budget is spent.
//!
//! Nothing here runs on its own. A drain pass
//! ([`OfflineQueue::process_offline_queue`],
//! [`OfflineQueue::process_pairing_requests`]) is triggered by a caller or by
//! the host's scheduler, visits each of the component's records once, and
//! never fails because of an individual record.

mod error;
mod handlers;
mod introspection;
mod queue;
pub mod retry;
mod store;
mod types;

pub use error::QueueError;
pub use handlers::{HandlerError, OperationHandlers, PairingRequestExecutor};
pub use queue::OfflineQueue;
pub use retry::RetryPolicy;
pub use types::{
    DrainReport, HealthThresholds, NewOfflineOperation, NewPairingRequest, OfflineOperation,
    PairingRequest, QueueHealth, QueueStatus, RequestStatus,
};

/// Failure reason recorded on records whose retry budget is spent.
pub const MAX_RETRIES_EXCEEDED: &str = "max retries exceeded";

/// Failure reason recorded when a component fails re-verification.
pub const COMPONENT_NOT_VERIFIED: &str = "component not verified";

/// Failure reason recorded for a stored operation type outside the closed set.
pub const UNKNOWN_OPERATION_TYPE: &str = "unknown operation type";
