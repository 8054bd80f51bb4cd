//! Seams through which drained work is executed.

use lct_types::OperationKind;
use rusqlite::Connection;

use crate::types::{OfflineOperation, PairingRequest};

/// A failed attempt. The message becomes the record's `failure_reason`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// One handler per [`OperationKind`].
///
/// Handlers get the connection the drain pass is using and must not open a
/// transaction that outlives the call.
pub trait OperationHandlers: Send + Sync {
    fn pairing(&self, conn: &Connection, op: &OfflineOperation) -> Result<(), HandlerError>;

    fn unpairing(&self, conn: &Connection, op: &OfflineOperation) -> Result<(), HandlerError>;

    fn energy_transfer(&self, conn: &Connection, op: &OfflineOperation)
        -> Result<(), HandlerError>;
}

pub(crate) fn dispatch(
    handlers: &dyn OperationHandlers,
    conn: &Connection,
    kind: OperationKind,
    op: &OfflineOperation,
) -> Result<(), HandlerError> {
    match kind {
        OperationKind::Pairing => handlers.pairing(conn, op),
        OperationKind::Unpairing => handlers.unpairing(conn, op),
        OperationKind::EnergyTransfer => handlers.energy_transfer(conn, op),
    }
}

/// Runs a queued pairing request once both sides are reachable.
pub trait PairingRequestExecutor: Send + Sync {
    fn execute(&self, conn: &Connection, request: &PairingRequest) -> Result<(), HandlerError>;
}
