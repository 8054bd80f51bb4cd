//! Session records and their storage.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// Lifecycle of a pairing session.
///
/// `pending → completed` on valid proofs, `pending → expired` lazily once the
/// TTL passes. `completed`, `expired` and `failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Completed,
    Expired,
    Failed,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Expired => "expired",
            Self::Failed => "failed",
        }
    }

    fn from_column(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "expired" => Some(Self::Expired),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored pairing session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingSession {
    pub session_id: String,
    pub relationship_id: String,
    pub initiator: String,
    pub component_a: String,
    pub component_b: String,
    pub operational_context: String,
    pub proxy_id: Option<String>,
    /// Stored status. See [`PairingSession::effective_status`] for what
    /// callers should see.
    pub status: SessionStatus,
    /// Empty until the session completes. Only handed out by completion.
    #[serde(skip_serializing, default)]
    pub session_keys: String,
    pub created_at: i64,
    /// Zero until the session completes.
    pub established_at: i64,
    pub expires_at: i64,
}

impl PairingSession {
    /// Expired sessions stay stored but are rejected by every later call.
    pub fn is_expired(&self, now: i64) -> bool {
        now > self.expires_at
    }

    /// The stored status, with a pending session past its TTL reported as
    /// expired.
    pub fn effective_status(&self, now: i64) -> SessionStatus {
        if self.status == SessionStatus::Pending && self.is_expired(now) {
            SessionStatus::Expired
        } else {
            self.status
        }
    }
}

const SESSION_COLUMNS: &str = "session_id, relationship_id, initiator, component_a, component_b,
     operational_context, proxy_id, status, session_keys, created_at, established_at, expires_at";

fn map_row(row: &Row<'_>) -> rusqlite::Result<PairingSession> {
    let status: String = row.get(7)?;
    let status = SessionStatus::from_column(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            7,
            rusqlite::types::Type::Text,
            format!("unknown session status: {status}").into(),
        )
    })?;
    Ok(PairingSession {
        session_id: row.get(0)?,
        relationship_id: row.get(1)?,
        initiator: row.get(2)?,
        component_a: row.get(3)?,
        component_b: row.get(4)?,
        operational_context: row.get(5)?,
        proxy_id: row.get(6)?,
        status,
        session_keys: row.get(8)?,
        created_at: row.get(9)?,
        established_at: row.get(10)?,
        expires_at: row.get(11)?,
    })
}

pub(crate) fn insert_session(conn: &Connection, s: &PairingSession) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO pairing_sessions (
            session_id, relationship_id, initiator, component_a, component_b,
            operational_context, proxy_id, status, session_keys, created_at,
            established_at, expires_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            s.session_id,
            s.relationship_id,
            s.initiator,
            s.component_a,
            s.component_b,
            s.operational_context,
            s.proxy_id,
            s.status.as_str(),
            s.session_keys,
            s.created_at,
            s.established_at,
            s.expires_at,
        ],
    )?;
    Ok(())
}

pub(crate) fn get_session(
    conn: &Connection,
    session_id: &str,
) -> rusqlite::Result<Option<PairingSession>> {
    conn.query_row(
        &format!("SELECT {SESSION_COLUMNS} FROM pairing_sessions WHERE session_id = ?1"),
        [session_id],
        map_row,
    )
    .optional()
}

/// Moves a pending session to completed. Returns false if the row was no
/// longer pending, so a concurrent completion cannot be applied twice.
pub(crate) fn mark_completed(
    conn: &Connection,
    session_id: &str,
    session_keys: &str,
    established_at: i64,
) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "UPDATE pairing_sessions
         SET status = 'completed', session_keys = ?2, established_at = ?3
         WHERE session_id = ?1 AND status = 'pending'",
        params![session_id, session_keys, established_at],
    )?;
    Ok(changed == 1)
}

pub(crate) fn list_completed(conn: &Connection) -> rusqlite::Result<Vec<PairingSession>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SESSION_COLUMNS} FROM pairing_sessions
         WHERE status = 'completed'
         ORDER BY established_at ASC, session_id ASC"
    ))?;
    let rows = stmt.query_map([], map_row)?;
    rows.collect()
}
