//! Contracts for the collaborators the core consumes but does not own.
//!
//! The core only reads through these traits. Calls are synchronous and
//! fail-fast: retrying a collaborator is the collaborator's business.
//!
//! Every call receives the connection of the unit of work that makes it, so
//! a collaborator backed by the same database reads and writes inside that
//! unit instead of checking out a connection of its own.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

/// Errors surfaced by a collaborator.
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    /// The collaborator could not be reached or its backing store failed.
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    /// The referenced relationship does not exist.
    #[error("relationship not found: {0}")]
    RelationshipNotFound(String),

    /// The collaborator refused the call.
    #[error("{0}")]
    Rejected(String),
}

/// Result of checking whether two components may pair with each other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidirectionalAuth {
    /// Whether component A is allowed to initiate pairing with B.
    pub a_can_pair_b: bool,
    /// Whether component B is allowed to initiate pairing with A.
    pub b_can_pair_a: bool,
    /// Human-readable reason from the gate.
    pub reason: String,
}

impl BidirectionalAuth {
    /// True only when both directions are allowed.
    pub fn is_granted(&self) -> bool {
        self.a_can_pair_b && self.b_can_pair_a
    }
}

/// The component-identity registry's view of pairing admission.
pub trait AuthorizationGate: Send + Sync {
    /// Whether the identifier resolves to a registered component.
    fn component_exists(
        &self,
        conn: &Connection,
        component_id: &str,
    ) -> Result<bool, CollaboratorError>;

    /// Whether the component is verified for pairing.
    fn is_verified_for_pairing(
        &self,
        conn: &Connection,
        component_id: &str,
    ) -> Result<bool, CollaboratorError>;

    /// Checks authorization in both directions.
    fn check_bidirectional_auth(
        &self,
        conn: &Connection,
        component_a: &str,
        component_b: &str,
    ) -> Result<BidirectionalAuth, CollaboratorError>;
}

/// A relationship record created by the [`RelationshipStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedRelationship {
    /// Identifier of the persistent relationship (the LCT).
    pub relationship_id: String,
    /// Opaque reference to the key material bound to the relationship.
    pub key_reference: String,
}

/// Persistent store of relationships between paired components.
pub trait RelationshipStore: Send + Sync {
    /// Creates (or returns) the relationship binding two components.
    fn create_relationship(
        &self,
        conn: &Connection,
        component_a: &str,
        component_b: &str,
        operational_context: &str,
        proxy_id: Option<&str>,
    ) -> Result<CreatedRelationship, CollaboratorError>;

    /// Marks a relationship inactive.
    fn terminate_relationship(
        &self,
        conn: &Connection,
        relationship_id: &str,
        reason: &str,
        notify_offline: bool,
    ) -> Result<(), CollaboratorError>;
}

/// A trust value for a relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustReading {
    /// Score in `[0.0, 1.0]`.
    pub score: f64,
    /// Coarse label for the score.
    pub label: String,
}

/// Source of trust scores. Informational only inside the core.
pub trait TrustEngine: Send + Sync {
    /// Returns the trust reading for a relationship under a context.
    fn trust_score(
        &self,
        conn: &Connection,
        relationship_id: &str,
        context: &str,
    ) -> Result<TrustReading, CollaboratorError>;
}
