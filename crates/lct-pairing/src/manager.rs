use std::sync::Arc;

use lct_observe::{record_event, EventPayload};
use lct_types::{
    normalize_proxy_id, AuthorizationGate, Clock, ComponentSide, RelationshipStore, TrustEngine,
    DEFAULT_SESSION_TTL_SECS,
};
use rand::RngCore;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::error::PairingError;
use crate::proof::verify_proof;
use crate::session::{self, PairingSession, SessionStatus};

const TRUST_CONTEXT: &str = "pairing_completed";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePairingRequest {
    pub initiator: String,
    pub component_a: String,
    pub component_b: String,
    #[serde(default)]
    pub operational_context: String,
    #[serde(default)]
    pub proxy_id: Option<String>,
    /// Recorded on the session event. Routing on this flag belongs to the
    /// caller.
    #[serde(default)]
    pub force_immediate: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatedPairing {
    pub session_id: String,
    pub relationship_id: String,
    pub status: SessionStatus,
    pub expires_at: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletePairingRequest {
    pub session_id: String,
    pub proof_a: String,
    pub proof_b: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedPairing {
    pub relationship_id: String,
    pub session_keys: String,
    pub trust_summary: String,
}

/// Answer to [`PairingManager::validate_bidirectional_auth`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthValidation {
    pub component_a: String,
    pub component_b: String,
    pub a_can_pair_b: bool,
    pub b_can_pair_a: bool,
    /// The gate's explanation of the outcome.
    pub required_conditions: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokePairingRequest {
    pub relationship_id: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub notify_offline: bool,
}

/// Drives pairing sessions against the store and the injected collaborators.
///
/// Every method takes the connection it should use, so the caller decides
/// pooling and threading.
pub struct PairingManager {
    gate: Arc<dyn AuthorizationGate>,
    relationships: Arc<dyn RelationshipStore>,
    trust: Option<Arc<dyn TrustEngine>>,
    clock: Arc<dyn Clock>,
    session_ttl_secs: i64,
}

impl PairingManager {
    pub fn new(
        gate: Arc<dyn AuthorizationGate>,
        relationships: Arc<dyn RelationshipStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            gate,
            relationships,
            trust: None,
            clock,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
        }
    }

    /// Attaches a trust engine used for the completion summary.
    pub fn with_trust_engine(mut self, trust: Arc<dyn TrustEngine>) -> Self {
        self.trust = Some(trust);
        self
    }

    pub fn with_session_ttl(mut self, secs: i64) -> Self {
        self.session_ttl_secs = secs;
        self
    }

    pub fn session_ttl_secs(&self) -> i64 {
        self.session_ttl_secs
    }

    /// Opens a pending session between two mutually authorized components.
    ///
    /// The relationship is created first and the session row is written only
    /// once that call succeeds. Both happen in one transaction on `conn`, so
    /// a store writing through the same connection is rolled back when the
    /// session cannot be stored. `conn` must not already be inside a
    /// transaction.
    pub fn initiate_pairing(
        &self,
        conn: &Connection,
        req: &InitiatePairingRequest,
    ) -> Result<InitiatedPairing, PairingError> {
        let initiator = req.initiator.trim();
        let a = req.component_a.trim();
        let b = req.component_b.trim();
        if initiator.is_empty() || a.is_empty() || b.is_empty() {
            return Err(PairingError::InvalidRequest(
                "initiator, componentA and componentB are required".to_string(),
            ));
        }
        if a == b {
            return Err(PairingError::InvalidRequest(
                "a component cannot pair with itself".to_string(),
            ));
        }

        for component in [a, b] {
            if !self.gate.component_exists(conn, component)? {
                return Err(PairingError::NotFound(format!("component {component}")));
            }
        }

        let auth = self.gate.check_bidirectional_auth(conn, a, b)?;
        if !auth.is_granted() {
            tracing::info!(component_a = a, component_b = b, reason = %auth.reason, "pairing refused");
            return Err(PairingError::Unauthorized(auth.reason));
        }

        let proxy_id = normalize_proxy_id(req.proxy_id.as_deref());
        let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
        let relationship = self.relationships.create_relationship(
            &tx,
            a,
            b,
            &req.operational_context,
            proxy_id.as_deref(),
        )?;

        let now = self.clock.now();
        let session = PairingSession {
            session_id: format!("challenge-{}", uuid::Uuid::new_v4().simple()),
            relationship_id: relationship.relationship_id,
            initiator: initiator.to_string(),
            component_a: a.to_string(),
            component_b: b.to_string(),
            operational_context: req.operational_context.clone(),
            proxy_id,
            status: SessionStatus::Pending,
            session_keys: String::new(),
            created_at: now,
            established_at: 0,
            expires_at: now + self.session_ttl_secs,
        };
        if let Err(e) = session::insert_session(&tx, &session) {
            tracing::warn!(
                relationship_id = %session.relationship_id,
                error = %e,
                "failed to store pairing session, rolling back relationship"
            );
            return Err(e.into());
        }
        tx.commit()?;

        tracing::info!(
            session_id = %session.session_id,
            relationship_id = %session.relationship_id,
            component_a = a,
            component_b = b,
            expires_at = session.expires_at,
            "pairing session opened"
        );
        record_event(
            conn,
            &EventPayload::PairingInitiated {
                session_id: session.session_id.clone(),
                relationship_id: session.relationship_id.clone(),
                component_a: session.component_a.clone(),
                component_b: session.component_b.clone(),
                initiator: session.initiator.clone(),
                operational_context: session.operational_context.clone(),
                status: session.status.to_string(),
                force_immediate: req.force_immediate,
            },
        );

        Ok(InitiatedPairing {
            session_id: session.session_id,
            relationship_id: session.relationship_id,
            status: session.status,
            expires_at: session.expires_at,
        })
    }

    /// Verifies both proofs and completes a pending, unexpired session.
    pub fn complete_pairing(
        &self,
        conn: &Connection,
        req: &CompletePairingRequest,
    ) -> Result<CompletedPairing, PairingError> {
        if req.session_id.is_empty() || req.proof_a.is_empty() || req.proof_b.is_empty() {
            return Err(PairingError::InvalidRequest(
                "sessionId, proofA and proofB are required".to_string(),
            ));
        }

        let session = session::get_session(conn, &req.session_id)?
            .ok_or_else(|| PairingError::NotFound(format!("pairing session {}", req.session_id)))?;

        let now = self.clock.now();
        if session.is_expired(now) {
            return Err(PairingError::Expired(session.session_id));
        }
        if session.status != SessionStatus::Pending {
            return Err(PairingError::InvalidState {
                session_id: session.session_id,
                status: session.status.to_string(),
            });
        }

        if !verify_proof(&session.session_id, ComponentSide::A, &req.proof_a) {
            return Err(PairingError::AuthenticationFailed(ComponentSide::A));
        }
        if !verify_proof(&session.session_id, ComponentSide::B, &req.proof_b) {
            return Err(PairingError::AuthenticationFailed(ComponentSide::B));
        }

        let session_keys = generate_session_keys();
        if !session::mark_completed(conn, &session.session_id, &session_keys, now)? {
            // lost a race with another completion
            let status = session::get_session(conn, &session.session_id)?
                .map(|s| s.status)
                .unwrap_or(SessionStatus::Failed);
            return Err(PairingError::InvalidState {
                session_id: session.session_id,
                status: status.to_string(),
            });
        }

        let trust_summary = self.trust_summary(conn, &session.relationship_id);
        tracing::info!(
            session_id = %session.session_id,
            relationship_id = %session.relationship_id,
            "pairing completed"
        );
        record_event(
            conn,
            &EventPayload::PairingCompleted {
                session_id: session.session_id.clone(),
                relationship_id: session.relationship_id.clone(),
                established_at: now,
            },
        );

        Ok(CompletedPairing {
            relationship_id: session.relationship_id,
            session_keys,
            trust_summary,
        })
    }

    /// Terminates a relationship through the relationship store.
    pub fn revoke_pairing(
        &self,
        conn: &Connection,
        req: &RevokePairingRequest,
    ) -> Result<(), PairingError> {
        if req.relationship_id.trim().is_empty() {
            return Err(PairingError::InvalidRequest(
                "relationshipId is required".to_string(),
            ));
        }

        self.relationships.terminate_relationship(
            conn,
            &req.relationship_id,
            &req.reason,
            req.notify_offline,
        )?;

        tracing::info!(
            relationship_id = %req.relationship_id,
            reason = %req.reason,
            notify_offline = req.notify_offline,
            "pairing revoked"
        );
        record_event(
            conn,
            &EventPayload::PairingRevoked {
                relationship_id: req.relationship_id.clone(),
                reason: req.reason.clone(),
                notify_offline: req.notify_offline,
            },
        );
        Ok(())
    }

    /// Reports whether each component may pair with the other.
    ///
    /// A read-only view of the gate check that admission runs. Both
    /// components must be registered.
    pub fn validate_bidirectional_auth(
        &self,
        conn: &Connection,
        component_a: &str,
        component_b: &str,
    ) -> Result<AuthValidation, PairingError> {
        let a = component_a.trim();
        let b = component_b.trim();
        if a.is_empty() || b.is_empty() {
            return Err(PairingError::InvalidRequest(
                "componentA and componentB are required".to_string(),
            ));
        }
        for component in [a, b] {
            if !self.gate.component_exists(conn, component)? {
                return Err(PairingError::NotFound(format!("component {component}")));
            }
        }

        let auth = self.gate.check_bidirectional_auth(conn, a, b)?;
        Ok(AuthValidation {
            component_a: a.to_string(),
            component_b: b.to_string(),
            a_can_pair_b: auth.a_can_pair_b,
            b_can_pair_a: auth.b_can_pair_a,
            required_conditions: auth.reason,
        })
    }

    /// Returns a session with its effective status.
    pub fn pairing_status(
        &self,
        conn: &Connection,
        session_id: &str,
    ) -> Result<PairingSession, PairingError> {
        let mut session = session::get_session(conn, session_id)?
            .ok_or_else(|| PairingError::NotFound(format!("pairing session {session_id}")))?;
        session.status = session.effective_status(self.clock.now());
        Ok(session)
    }

    /// All completed sessions, oldest first.
    pub fn list_active_pairings(
        &self,
        conn: &Connection,
    ) -> Result<Vec<PairingSession>, PairingError> {
        Ok(session::list_completed(conn)?)
    }

    fn trust_summary(&self, conn: &Connection, relationship_id: &str) -> String {
        let reading = self
            .trust
            .as_ref()
            .map(|trust| trust.trust_score(conn, relationship_id, TRUST_CONTEXT));

        match reading {
            Some(Ok(r)) => format!(
                "trust_score:{:.2},label:{},context:{TRUST_CONTEXT}",
                r.score, r.label
            ),
            Some(Err(e)) => {
                tracing::warn!(relationship_id, error = %e, "trust engine unavailable");
                format!("trust_score:unavailable,context:{TRUST_CONTEXT}")
            }
            None => format!("trust_score:unavailable,context:{TRUST_CONTEXT}"),
        }
    }
}

fn generate_session_keys() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    format!("sk-{}", hex::encode(bytes))
}
