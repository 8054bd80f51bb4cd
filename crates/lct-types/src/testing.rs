//! In-memory collaborator fakes for tests.
//!
//! Enabled for downstream crates through the `testing` feature.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use rusqlite::Connection;

use crate::{
    AuthorizationGate, BidirectionalAuth, CollaboratorError, CreatedRelationship,
    RelationshipStore, TrustEngine, TrustReading,
};

/// A gate backed by in-memory sets. Mutations are visible to every holder.
#[derive(Debug, Default)]
pub struct StaticGate {
    components: Mutex<HashMap<String, bool>>,
    grants: Mutex<HashSet<(String, String)>>,
}

impl StaticGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a component with the given verification flag.
    pub fn with_component(self, component_id: &str, verified: bool) -> Self {
        self.set_verified(component_id, verified);
        self
    }

    /// Grants pairing in both directions.
    pub fn with_mutual_grant(self, a: &str, b: &str) -> Self {
        self.grant(a, b);
        self.grant(b, a);
        self
    }

    pub fn set_verified(&self, component_id: &str, verified: bool) {
        self.components
            .lock()
            .unwrap()
            .insert(component_id.to_string(), verified);
    }

    pub fn grant(&self, from: &str, to: &str) {
        self.grants
            .lock()
            .unwrap()
            .insert((from.to_string(), to.to_string()));
    }

    pub fn revoke(&self, from: &str, to: &str) {
        self.grants
            .lock()
            .unwrap()
            .remove(&(from.to_string(), to.to_string()));
    }
}

impl AuthorizationGate for StaticGate {
    fn component_exists(
        &self,
        _conn: &Connection,
        component_id: &str,
    ) -> Result<bool, CollaboratorError> {
        Ok(self.components.lock().unwrap().contains_key(component_id))
    }

    fn is_verified_for_pairing(
        &self,
        _conn: &Connection,
        component_id: &str,
    ) -> Result<bool, CollaboratorError> {
        Ok(self
            .components
            .lock()
            .unwrap()
            .get(component_id)
            .copied()
            .unwrap_or(false))
    }

    fn check_bidirectional_auth(
        &self,
        _conn: &Connection,
        component_a: &str,
        component_b: &str,
    ) -> Result<BidirectionalAuth, CollaboratorError> {
        let grants = self.grants.lock().unwrap();
        let a_can_pair_b = grants.contains(&(component_a.to_string(), component_b.to_string()));
        let b_can_pair_a = grants.contains(&(component_b.to_string(), component_a.to_string()));
        let reason = match (a_can_pair_b, b_can_pair_a) {
            (true, true) => "pairing_authorized".to_string(),
            (false, _) => format!("{component_a} may not pair with {component_b}"),
            (_, false) => format!("{component_b} may not pair with {component_a}"),
        };
        Ok(BidirectionalAuth {
            a_can_pair_b,
            b_can_pair_a,
            reason,
        })
    }
}

/// A relationship store that records calls and can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingRelationships {
    next_id: AtomicUsize,
    created: Mutex<Vec<(String, String, String)>>,
    terminated: Mutex<Vec<(String, String, bool)>>,
    fail_with: Mutex<Option<String>>,
}

impl RecordingRelationships {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with `Rejected(message)`.
    pub fn fail_with(&self, message: &str) {
        *self.fail_with.lock().unwrap() = Some(message.to_string());
    }

    pub fn created(&self) -> Vec<(String, String, String)> {
        self.created.lock().unwrap().clone()
    }

    pub fn terminated(&self) -> Vec<(String, String, bool)> {
        self.terminated.lock().unwrap().clone()
    }

    fn check_failure(&self) -> Result<(), CollaboratorError> {
        match self.fail_with.lock().unwrap().as_ref() {
            Some(msg) => Err(CollaboratorError::Rejected(msg.clone())),
            None => Ok(()),
        }
    }
}

impl RelationshipStore for RecordingRelationships {
    fn create_relationship(
        &self,
        _conn: &Connection,
        component_a: &str,
        component_b: &str,
        operational_context: &str,
        _proxy_id: Option<&str>,
    ) -> Result<CreatedRelationship, CollaboratorError> {
        self.check_failure()?;
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.created.lock().unwrap().push((
            component_a.to_string(),
            component_b.to_string(),
            operational_context.to_string(),
        ));
        Ok(CreatedRelationship {
            relationship_id: format!("lct-{n}"),
            key_reference: format!("key-{n}"),
        })
    }

    fn terminate_relationship(
        &self,
        _conn: &Connection,
        relationship_id: &str,
        reason: &str,
        notify_offline: bool,
    ) -> Result<(), CollaboratorError> {
        self.check_failure()?;
        self.terminated.lock().unwrap().push((
            relationship_id.to_string(),
            reason.to_string(),
            notify_offline,
        ));
        Ok(())
    }
}

/// A trust engine returning a fixed reading, or failing when `None`.
#[derive(Debug, Clone)]
pub struct FixedTrust(pub Option<TrustReading>);

impl TrustEngine for FixedTrust {
    fn trust_score(
        &self,
        _conn: &Connection,
        _relationship_id: &str,
        _context: &str,
    ) -> Result<TrustReading, CollaboratorError> {
        self.0
            .clone()
            .ok_or_else(|| CollaboratorError::Unavailable("trust engine offline".to_string()))
    }
}
