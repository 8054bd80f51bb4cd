//! Component presence from heartbeats.
//!
//! A component is online while its last heartbeat is within the online
//! window. Times are unix seconds supplied by the caller's clock.

use rusqlite::{params, Connection, OptionalExtension};

use crate::RegistryError;

/// Records a heartbeat. Returns `true` when the component was offline
/// (never seen, or silent for longer than `window_secs`) before this call.
pub fn record_heartbeat(
    conn: &Connection,
    component_id: &str,
    now: i64,
    window_secs: i64,
) -> Result<bool, RegistryError> {
    if component_id.trim().is_empty() {
        return Err(RegistryError::InvalidRequest("componentId is required".to_string()));
    }
    let was_online = is_online(conn, component_id, now, window_secs)?;
    conn.execute(
        "INSERT INTO component_heartbeats (component_id, last_seen_at) VALUES (?1, ?2)
         ON CONFLICT(component_id) DO UPDATE SET last_seen_at = MAX(last_seen_at, excluded.last_seen_at)",
        params![component_id, now],
    )?;
    if !was_online {
        tracing::info!(component_id, "component came online");
    }
    Ok(!was_online)
}

pub fn last_seen(conn: &Connection, component_id: &str) -> Result<Option<i64>, RegistryError> {
    Ok(conn
        .query_row(
            "SELECT last_seen_at FROM component_heartbeats WHERE component_id = ?1",
            [component_id],
            |row| row.get(0),
        )
        .optional()?)
}

pub fn is_online(
    conn: &Connection,
    component_id: &str,
    now: i64,
    window_secs: i64,
) -> Result<bool, RegistryError> {
    Ok(last_seen(conn, component_id)?
        .map(|seen| now.saturating_sub(seen) <= window_secs)
        .unwrap_or(false))
}

/// Components whose last heartbeat falls inside the window.
pub fn online_components(
    conn: &Connection,
    now: i64,
    window_secs: i64,
) -> Result<Vec<String>, RegistryError> {
    let mut stmt = conn.prepare(
        "SELECT component_id FROM component_heartbeats
         WHERE last_seen_at >= ?1 ORDER BY component_id ASC",
    )?;
    let rows = stmt.query_map([now.saturating_sub(window_secs)], |row| row.get(0))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
