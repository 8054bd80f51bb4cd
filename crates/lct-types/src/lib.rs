//! Shared types, constants, and collaborator contracts for the LCT pairing core.
//!
//! Every crate in the workspace depends on `lct-types` for cross-cutting
//! definitions: the closed set of offline operation kinds, the clock
//! abstraction used for all expiry and backoff arithmetic, and the traits
//! through which the core talks to the component registry, the relationship
//! store, and the trust engine.
//!
//! Collaborators are always injected explicitly through constructors. Nothing
//! in the core looks them up from ambient state.

mod clock;
mod collaborators;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use collaborators::{
    AuthorizationGate, BidirectionalAuth, CollaboratorError, CreatedRelationship,
    RelationshipStore, TrustEngine, TrustReading,
};

use serde::{Deserialize, Serialize};

/// Lifetime of a pairing session, in seconds, before it is considered expired.
pub const DEFAULT_SESSION_TTL_SECS: i64 = 5 * 60;

/// Retry budget for queued pairing requests.
pub const DEFAULT_REQUEST_MAX_RETRIES: u32 = 3;

/// Retry budget for queued offline operations.
pub const DEFAULT_OPERATION_MAX_RETRIES: u32 = 5;

/// First backoff step after a failed attempt.
pub const DEFAULT_BASE_RETRY_DELAY_SECS: i64 = 300;

/// Upper bound on the backoff delay.
pub const DEFAULT_MAX_RETRY_DELAY_SECS: i64 = 4_800;

/// Delay applied when a component fails re-verification during a drain pass.
pub const DEFAULT_UNVERIFIED_RETRY_DELAY_SECS: i64 = 300;

/// The closed set of operations that can be deferred on the offline queue.
///
/// Stored as its snake_case label. A stored label that does not parse into
/// one of these variants is treated as an unknown operation by the drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Establish a relationship with a partner component.
    Pairing,
    /// Terminate an existing relationship.
    Unpairing,
    /// Move energy across an active relationship.
    EnergyTransfer,
}

impl OperationKind {
    /// Every operation kind, in declaration order.
    pub const ALL: [OperationKind; 3] = [Self::Pairing, Self::Unpairing, Self::EnergyTransfer];

    /// Returns the canonical storage label for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pairing => "pairing",
            Self::Unpairing => "unpairing",
            Self::EnergyTransfer => "energy_transfer",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OperationKind {
    type Err = ParseOperationKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pairing" => Ok(Self::Pairing),
            "unpairing" => Ok(Self::Unpairing),
            "energy_transfer" => Ok(Self::EnergyTransfer),
            _ => Err(ParseOperationKindError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unknown operation kind string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown operation type: {0}")]
pub struct ParseOperationKindError(pub String);

/// Which side of a pairing a value refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentSide {
    /// The first component named in the pairing.
    #[serde(rename = "component_a")]
    A,
    /// The second component named in the pairing.
    #[serde(rename = "component_b")]
    B,
}

impl ComponentSide {
    /// Label mixed into the per-side authentication hash.
    pub fn label(self) -> &'static str {
        match self {
            Self::A => "component_a",
            Self::B => "component_b",
        }
    }
}

impl std::fmt::Display for ComponentSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::A => f.write_str("component A"),
            Self::B => f.write_str("component B"),
        }
    }
}

/// Normalises an optional proxy id: blank strings mean "no proxy".
pub fn normalize_proxy_id(proxy_id: Option<&str>) -> Option<String> {
    proxy_id
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
}
