//! Reference collaborators backed by the shared SQLite database.
//!
//! The pairing core only sees the traits in `lct-types`. This crate provides
//! one implementation of each so the host can run end to end:
//!
//! - [`components`]: component identities, verification flags and
//!   directional pairing grants (the authorization gate).
//! - [`relationships`]: the relationship store issuing LCT ids.
//! - [`trust`]: an outcome-history trust score.
//! - [`presence`]: heartbeats used to decide whether a component is online.
//!
//! [`SqliteRegistry`] implements the collaborator traits against whatever
//! connection the calling unit of work hands it.

pub mod components;
pub mod presence;
pub mod relationships;
pub mod trust;

use lct_types::{
    AuthorizationGate, BidirectionalAuth, CollaboratorError, CreatedRelationship,
    RelationshipStore, TrustEngine, TrustReading,
};
use rusqlite::Connection;
use thiserror::Error;

pub use components::{Component, NewComponent};
pub use relationships::{Relationship, RelationshipStatus};
pub use trust::TrustOutcome;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid registry request: {0}")]
    InvalidRequest(String),

    #[error("{0}")]
    Conflict(String),
}

impl From<RegistryError> for CollaboratorError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound(msg) => CollaboratorError::RelationshipNotFound(msg),
            RegistryError::InvalidRequest(msg) | RegistryError::Conflict(msg) => {
                CollaboratorError::Rejected(msg)
            }
            other => CollaboratorError::Unavailable(other.to_string()),
        }
    }
}

/// SQLite implementation of every collaborator trait.
///
/// Stateless: the tables live in the database behind the connection passed
/// to each call.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteRegistry;

impl AuthorizationGate for SqliteRegistry {
    fn component_exists(
        &self,
        conn: &Connection,
        component_id: &str,
    ) -> Result<bool, CollaboratorError> {
        Ok(components::get_component(conn, component_id)?.is_some())
    }

    fn is_verified_for_pairing(
        &self,
        conn: &Connection,
        component_id: &str,
    ) -> Result<bool, CollaboratorError> {
        Ok(components::get_component(conn, component_id)?
            .map(|c| c.verified)
            .unwrap_or(false))
    }

    fn check_bidirectional_auth(
        &self,
        conn: &Connection,
        component_a: &str,
        component_b: &str,
    ) -> Result<BidirectionalAuth, CollaboratorError> {
        Ok(components::check_bidirectional_auth(
            conn,
            component_a,
            component_b,
        )?)
    }
}

impl RelationshipStore for SqliteRegistry {
    fn create_relationship(
        &self,
        conn: &Connection,
        component_a: &str,
        component_b: &str,
        operational_context: &str,
        proxy_id: Option<&str>,
    ) -> Result<CreatedRelationship, CollaboratorError> {
        let rel = relationships::create_relationship(
            conn,
            component_a,
            component_b,
            operational_context,
            proxy_id,
        )?;
        Ok(CreatedRelationship {
            relationship_id: rel.relationship_id,
            key_reference: rel.key_reference,
        })
    }

    fn terminate_relationship(
        &self,
        conn: &Connection,
        relationship_id: &str,
        reason: &str,
        notify_offline: bool,
    ) -> Result<(), CollaboratorError> {
        Ok(relationships::terminate_relationship(
            conn,
            relationship_id,
            reason,
            notify_offline,
        )?)
    }
}

impl TrustEngine for SqliteRegistry {
    fn trust_score(
        &self,
        conn: &Connection,
        relationship_id: &str,
        context: &str,
    ) -> Result<TrustReading, CollaboratorError> {
        let score = trust::trust_score(conn, relationship_id)?;
        tracing::debug!(relationship_id, context, score, "trust score computed");
        Ok(TrustReading {
            score,
            label: trust::label_for(score).to_string(),
        })
    }
}
