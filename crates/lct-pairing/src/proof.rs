//! Per-side authentication proofs.
//!
//! A side proves possession of the session id by presenting
//! `hex(sha256(session_id ‖ label))`, where the label is `component_a` or
//! `component_b`. This is the whole contract: no key material is involved.

use lct_types::ComponentSide;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// The proof a side must present to complete `session_id`.
pub fn expected_proof(session_id: &str, side: ComponentSide) -> String {
    let mut hasher = Sha256::new();
    hasher.update(session_id.as_bytes());
    hasher.update(side.label().as_bytes());
    hex::encode(hasher.finalize())
}

/// Compares a presented proof against the expected one in constant time.
///
/// Hex case is significant; the expected form is lowercase.
pub fn verify_proof(session_id: &str, side: ComponentSide, presented: &str) -> bool {
    let expected = expected_proof(session_id, side);
    expected.as_bytes().ct_eq(presented.as_bytes()).into()
}
