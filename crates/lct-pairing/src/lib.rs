//! Pairing session manager.
//!
//! A pairing binds two registered components through a persistent
//! relationship (the LCT). It runs as a two-step challenge/response:
//!
//! 1. [`PairingManager::initiate_pairing`] checks both components exist and
//!    are mutually authorized, asks the relationship store for a
//!    relationship, and stores a `pending` session with a short TTL.
//! 2. [`PairingManager::complete_pairing`] accepts one proof per side,
//!    `hex(sha256(session_id ‖ label))`, and moves the session to
//!    `completed` with fresh session keys.
//!
//! Sessions are never deleted. Expiry is evaluated lazily against the
//! injected [`Clock`](lct_types::Clock): a pending session past its TTL
//! reports `expired` and rejects completion, but its row is not rewritten.
//!
//! The offline branch (queueing a request when a side is unreachable) is
//! not handled here; callers route to `lct-queue` instead.

mod error;
mod manager;
pub mod proof;
mod session;

pub use error::PairingError;
pub use manager::{
    AuthValidation, CompletePairingRequest, CompletedPairing, InitiatePairingRequest, InitiatedPairing,
    PairingManager, RevokePairingRequest,
};
pub use session::{PairingSession, SessionStatus};
