//! Relationship store.
//!
//! At most one active relationship exists per unordered component pair;
//! creating it again returns the existing record.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::RegistryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipStatus {
    Active,
    Terminated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub relationship_id: String,
    pub component_a: String,
    pub component_b: String,
    pub operational_context: String,
    pub proxy_id: Option<String>,
    pub key_reference: String,
    pub status: RelationshipStatus,
    pub termination_reason: Option<String>,
    pub notify_offline: bool,
    pub created_at: String,
    pub terminated_at: Option<String>,
}

impl Relationship {
    pub fn involves(&self, component_id: &str) -> bool {
        self.component_a == component_id || self.component_b == component_id
    }
}

const COLUMNS: &str = "relationship_id, component_a, component_b, operational_context, proxy_id,
     key_reference, status, termination_reason, notify_offline, created_at, terminated_at";

fn map_row(row: &Row<'_>) -> rusqlite::Result<Relationship> {
    let status: String = row.get(6)?;
    Ok(Relationship {
        relationship_id: row.get(0)?,
        component_a: row.get(1)?,
        component_b: row.get(2)?,
        operational_context: row.get(3)?,
        proxy_id: row.get(4)?,
        key_reference: row.get(5)?,
        status: if status == "terminated" {
            RelationshipStatus::Terminated
        } else {
            RelationshipStatus::Active
        },
        termination_reason: row.get(7)?,
        notify_offline: row.get(8)?,
        created_at: row.get(9)?,
        terminated_at: row.get(10)?,
    })
}

/// Opaque reference to the key material bound to a relationship.
fn key_reference(relationship_id: &str, a: &str, b: &str) -> String {
    let mut hasher = Sha256::new();
    for part in [relationship_id, a, b] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    format!("keyref-{}", hex::encode(&hasher.finalize()[..16]))
}

pub fn get_relationship(
    conn: &Connection,
    relationship_id: &str,
) -> Result<Option<Relationship>, RegistryError> {
    Ok(conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM relationships WHERE relationship_id = ?1"),
            [relationship_id],
            map_row,
        )
        .optional()?)
}

/// The active relationship between two components, in either order.
pub fn find_active(
    conn: &Connection,
    a: &str,
    b: &str,
) -> Result<Option<Relationship>, RegistryError> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {COLUMNS} FROM relationships
                 WHERE status = 'active'
                   AND ((component_a = ?1 AND component_b = ?2)
                     OR (component_a = ?2 AND component_b = ?1))
                 ORDER BY created_at ASC LIMIT 1"
            ),
            params![a, b],
            map_row,
        )
        .optional()?)
}

pub fn create_relationship(
    conn: &Connection,
    a: &str,
    b: &str,
    operational_context: &str,
    proxy_id: Option<&str>,
) -> Result<Relationship, RegistryError> {
    if a.is_empty() || b.is_empty() || a == b {
        return Err(RegistryError::InvalidRequest(
            "a relationship needs two distinct components".to_string(),
        ));
    }
    if let Some(existing) = find_active(conn, a, b)? {
        tracing::debug!(relationship_id = %existing.relationship_id, "reusing active relationship");
        return Ok(existing);
    }

    let relationship_id = format!("lct-{}", uuid::Uuid::new_v4().simple());
    conn.execute(
        "INSERT INTO relationships
            (relationship_id, component_a, component_b, operational_context, proxy_id, key_reference)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            relationship_id,
            a,
            b,
            operational_context,
            proxy_id,
            key_reference(&relationship_id, a, b),
        ],
    )?;
    tracing::info!(%relationship_id, component_a = a, component_b = b, "relationship created");

    get_relationship(conn, &relationship_id)?
        .ok_or_else(|| RegistryError::NotFound(format!("relationship {relationship_id}")))
}

pub fn terminate_relationship(
    conn: &Connection,
    relationship_id: &str,
    reason: &str,
    notify_offline: bool,
) -> Result<(), RegistryError> {
    let Some(existing) = get_relationship(conn, relationship_id)? else {
        return Err(RegistryError::NotFound(format!("relationship {relationship_id}")));
    };
    if existing.status == RelationshipStatus::Terminated {
        return Err(RegistryError::Conflict(format!(
            "relationship {relationship_id} is already terminated"
        )));
    }

    conn.execute(
        "UPDATE relationships
         SET status = 'terminated', termination_reason = ?2, notify_offline = ?3,
             terminated_at = datetime('now')
         WHERE relationship_id = ?1",
        params![relationship_id, reason, notify_offline],
    )?;
    tracing::info!(relationship_id, reason, notify_offline, "relationship terminated");
    Ok(())
}

/// Active relationships involving a component.
pub fn list_active_for(conn: &Connection, component_id: &str) -> Result<Vec<Relationship>, RegistryError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM relationships
         WHERE status = 'active' AND (component_a = ?1 OR component_b = ?1)
         ORDER BY created_at ASC"
    ))?;
    let rows = stmt.query_map([component_id], map_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
