//! Notification log for pairing and queue activity.
//!
//! Every state change in the core is written as a structured record to the
//! append-only `public_event_log` table. Records carry a monotonically
//! increasing `seq`, so consumers can page through the log with a cursor.
//!
//! | Domain | Event types |
//! |--------|-------------|
//! | `PAIRING` | `PAIRING_INITIATED`, `PAIRING_COMPLETED`, `PAIRING_REVOKED` |
//! | `QUEUE` | `REQUEST_QUEUED`, `REQUEST_CANCELLED`, `REQUEST_PROCESSED`, `REQUEST_RETRY_SCHEDULED`, `REQUEST_FAILED`, `OPERATION_QUEUED`, `OPERATION_PROCESSED`, `OPERATION_RETRY_SCHEDULED`, `OPERATION_EXHAUSTED` |
//!
//! Core operations call [`record_event`], which logs and swallows write
//! failures. A notification that cannot be stored never undoes the state
//! change it describes.
//!
//! ```rust,ignore
//! use lct_observe::{record_event, EventPayload};
//!
//! record_event(
//!     &conn,
//!     &EventPayload::PairingRevoked {
//!         relationship_id: "lct-7".into(),
//!         reason: "battery replaced".into(),
//!         notify_offline: true,
//!     },
//! );
//! ```

mod error;
mod event;
mod store;

pub use error::ObserveError;
pub use event::{EventDomain, EventPayload, ParseEventDomainError, PublicEvent};
pub use store::{emit_event, next_seq, query_events, record_event, EventFilter};

#[cfg(test)]
mod tests;
