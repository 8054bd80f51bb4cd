//! Component identities, verification and pairing grants.
//!
//! A grant is directional: `grant_pairing(a, b)` lets `a` pair with `b`.
//! Pairing needs grants in both directions.

use lct_types::BidirectionalAuth;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::RegistryError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub component_id: String,
    pub component_type: String,
    pub owner: String,
    pub verified: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComponent {
    pub component_id: String,
    pub component_type: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub verified: bool,
}

pub fn register_component(conn: &Connection, c: &NewComponent) -> Result<Component, RegistryError> {
    if c.component_id.trim().is_empty() || c.component_type.trim().is_empty() {
        return Err(RegistryError::InvalidRequest(
            "componentId and componentType are required".to_string(),
        ));
    }
    if get_component(conn, &c.component_id)?.is_some() {
        return Err(RegistryError::Conflict(format!(
            "component {} is already registered",
            c.component_id
        )));
    }

    conn.execute(
        "INSERT INTO components (component_id, component_type, owner, verified)
         VALUES (?1, ?2, ?3, ?4)",
        params![c.component_id, c.component_type, c.owner, c.verified],
    )?;
    tracing::info!(component_id = %c.component_id, verified = c.verified, "component registered");

    get_component(conn, &c.component_id)?
        .ok_or_else(|| RegistryError::NotFound(format!("component {}", c.component_id)))
}

pub fn get_component(conn: &Connection, component_id: &str) -> Result<Option<Component>, RegistryError> {
    Ok(conn
        .query_row(
            "SELECT component_id, component_type, owner, verified, created_at
             FROM components WHERE component_id = ?1",
            [component_id],
            |row| {
                Ok(Component {
                    component_id: row.get(0)?,
                    component_type: row.get(1)?,
                    owner: row.get(2)?,
                    verified: row.get(3)?,
                    created_at: row.get(4)?,
                })
            },
        )
        .optional()?)
}

pub fn set_verified(conn: &Connection, component_id: &str, verified: bool) -> Result<(), RegistryError> {
    let changed = conn.execute(
        "UPDATE components SET verified = ?2, updated_at = datetime('now') WHERE component_id = ?1",
        params![component_id, verified],
    )?;
    if changed == 0 {
        return Err(RegistryError::NotFound(format!("component {component_id}")));
    }
    tracing::info!(component_id, verified, "component verification changed");
    Ok(())
}

/// Allows `component_id` to pair with `partner_id`. Idempotent.
pub fn grant_pairing(
    conn: &Connection,
    component_id: &str,
    partner_id: &str,
    context: &str,
) -> Result<(), RegistryError> {
    if partner_id.trim().is_empty() || partner_id == component_id {
        return Err(RegistryError::InvalidRequest(
            "partnerId must name another component".to_string(),
        ));
    }
    if get_component(conn, component_id)?.is_none() {
        return Err(RegistryError::NotFound(format!("component {component_id}")));
    }
    conn.execute(
        "INSERT INTO pairing_grants (component_id, partner_id, context)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(component_id, partner_id) DO UPDATE SET context = excluded.context",
        params![component_id, partner_id, context],
    )?;
    Ok(())
}

pub fn revoke_grant(conn: &Connection, component_id: &str, partner_id: &str) -> Result<bool, RegistryError> {
    let removed = conn.execute(
        "DELETE FROM pairing_grants WHERE component_id = ?1 AND partner_id = ?2",
        params![component_id, partner_id],
    )?;
    Ok(removed > 0)
}

fn has_grant(conn: &Connection, from: &str, to: &str) -> Result<bool, RegistryError> {
    Ok(conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM pairing_grants g
            JOIN components c ON c.component_id = g.component_id
            WHERE g.component_id = ?1 AND g.partner_id = ?2
        )",
        params![from, to],
        |row| row.get(0),
    )?)
}

pub fn check_bidirectional_auth(
    conn: &Connection,
    component_a: &str,
    component_b: &str,
) -> Result<BidirectionalAuth, RegistryError> {
    let a_can_pair_b = has_grant(conn, component_a, component_b)?;
    let b_can_pair_a = has_grant(conn, component_b, component_a)?;
    let reason = match (a_can_pair_b, b_can_pair_a) {
        (true, true) => "mutual pairing grants present".to_string(),
        (false, false) => format!("no pairing grants between {component_a} and {component_b}"),
        (false, true) => format!("{component_a} has not granted pairing to {component_b}"),
        (true, false) => format!("{component_b} has not granted pairing to {component_a}"),
    };
    Ok(BidirectionalAuth {
        a_can_pair_b,
        b_can_pair_a,
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        lct_db::run_migrations(&conn).unwrap();
        conn
    }

    fn register(conn: &Connection, id: &str, verified: bool) {
        register_component(
            conn,
            &NewComponent {
                component_id: id.into(),
                component_type: "battery_module".into(),
                owner: "team-7".into(),
                verified,
            },
        )
        .unwrap();
    }

    #[test]
    fn duplicate_registration_conflicts() {
        let conn = db();
        register(&conn, "cell-1", false);
        let err = register_component(
            &conn,
            &NewComponent {
                component_id: "cell-1".into(),
                component_type: "battery_module".into(),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, RegistryError::Conflict(_)));
    }

    #[test]
    fn verification_toggles() {
        let conn = db();
        register(&conn, "cell-1", false);
        set_verified(&conn, "cell-1", true).unwrap();
        assert!(get_component(&conn, "cell-1").unwrap().unwrap().verified);
        assert!(matches!(
            set_verified(&conn, "ghost", true),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn authorization_needs_both_directions() {
        let conn = db();
        register(&conn, "cell-1", true);
        register(&conn, "pack-1", true);

        let auth = check_bidirectional_auth(&conn, "cell-1", "pack-1").unwrap();
        assert!(!auth.is_granted());
        assert_eq!(auth.reason, "no pairing grants between cell-1 and pack-1");

        grant_pairing(&conn, "cell-1", "pack-1", "assembly").unwrap();
        let auth = check_bidirectional_auth(&conn, "cell-1", "pack-1").unwrap();
        assert!(auth.a_can_pair_b && !auth.b_can_pair_a);
        assert_eq!(auth.reason, "pack-1 has not granted pairing to cell-1");

        grant_pairing(&conn, "pack-1", "cell-1", "assembly").unwrap();
        grant_pairing(&conn, "pack-1", "cell-1", "race").unwrap();
        assert!(check_bidirectional_auth(&conn, "pack-1", "cell-1")
            .unwrap()
            .is_granted());

        assert!(revoke_grant(&conn, "pack-1", "cell-1").unwrap());
        assert!(!revoke_grant(&conn, "pack-1", "cell-1").unwrap());
        assert!(!check_bidirectional_auth(&conn, "pack-1", "cell-1")
            .unwrap()
            .is_granted());
    }

    #[test]
    fn grant_requires_registered_grantor() {
        let conn = db();
        assert!(matches!(
            grant_pairing(&conn, "ghost", "cell-1", ""),
            Err(RegistryError::NotFound(_))
        ));
        register(&conn, "cell-1", true);
        assert!(matches!(
            grant_pairing(&conn, "cell-1", "cell-1", ""),
            Err(RegistryError::InvalidRequest(_))
        ));
    }
}
