//! Reads and writes against `public_event_log`.

use rusqlite::{params, Connection};

use crate::error::ObserveError;
use crate::event::{EventDomain, EventPayload, PublicEvent};

/// Appends a notification and returns the stored row.
///
/// Domain, event type and entity are derived from the payload. The sequence
/// number is assigned inside the same `INSERT`, so two writers cannot
/// observe the same `MAX(seq)`.
pub fn emit_event(conn: &Connection, payload: &EventPayload) -> Result<PublicEvent, ObserveError> {
    let payload_json = serde_json::to_string(payload)?;
    let domain = payload.domain();

    let (id, seq, occurred_at) = conn.query_row(
        "INSERT INTO public_event_log
            (domain, event_type, entity_type, entity_id, seq, payload_json, occurred_at)
         VALUES (
            ?1, ?2, ?3, ?4,
            (SELECT COALESCE(MAX(seq), 0) + 1 FROM public_event_log),
            ?5,
            datetime('now')
         )
         RETURNING id, seq, occurred_at",
        params![
            domain.as_str(),
            payload.event_type(),
            payload.entity_type(),
            payload.entity_id(),
            payload_json,
        ],
        |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
            ))
        },
    )?;

    Ok(PublicEvent {
        id,
        domain: domain.as_str().to_string(),
        event_type: payload.event_type().to_string(),
        entity_type: payload.entity_type().to_string(),
        entity_id: payload.entity_id().to_string(),
        seq,
        payload_json,
        occurred_at,
    })
}

/// Fire-and-forget wrapper around [`emit_event`].
///
/// Failures are logged at `warn` and reported as `None`; the caller's own
/// state change stands either way.
pub fn record_event(conn: &Connection, payload: &EventPayload) -> Option<PublicEvent> {
    match emit_event(conn, payload) {
        Ok(event) => {
            tracing::debug!(
                event_type = event.event_type.as_str(),
                entity_id = event.entity_id.as_str(),
                seq = event.seq,
                "event recorded"
            );
            Some(event)
        }
        Err(e) => {
            tracing::warn!(
                event_type = payload.event_type(),
                entity_id = payload.entity_id(),
                error = %e,
                "failed to record event"
            );
            None
        }
    }
}

/// The sequence number the next event will receive.
pub fn next_seq(conn: &Connection) -> Result<i64, ObserveError> {
    let max_seq: Option<i64> =
        conn.query_row("SELECT MAX(seq) FROM public_event_log", [], |row| row.get(0))?;
    Ok(max_seq.unwrap_or(0) + 1)
}

/// Query filter for [`query_events`]. Unset fields do not constrain.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub domain: Option<EventDomain>,
    pub event_type: Option<String>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    /// Only events at or after this `YYYY-MM-DD HH:MM:SS` timestamp.
    pub since: Option<String>,
    /// Only events with `seq` strictly greater than this cursor.
    pub after_seq: Option<i64>,
    /// Defaults to 100, capped at 1000.
    pub limit: Option<i64>,
}

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 1_000;

/// Returns matching events oldest first.
pub fn query_events(
    conn: &Connection,
    filter: &EventFilter,
) -> Result<Vec<PublicEvent>, ObserveError> {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    let mut push = |clause: &str, value: Box<dyn rusqlite::types::ToSql>| {
        values.push(value);
        clauses.push(format!("{clause} ?{}", values.len()));
    };

    if let Some(domain) = filter.domain {
        push("domain =", Box::new(domain.as_str()));
    }
    if let Some(ref event_type) = filter.event_type {
        push("event_type =", Box::new(event_type.clone()));
    }
    if let Some(ref entity_type) = filter.entity_type {
        push("entity_type =", Box::new(entity_type.clone()));
    }
    if let Some(ref entity_id) = filter.entity_id {
        push("entity_id =", Box::new(entity_id.clone()));
    }
    if let Some(ref since) = filter.since {
        push("occurred_at >=", Box::new(since.clone()));
    }
    if let Some(after_seq) = filter.after_seq {
        push("seq >", Box::new(after_seq));
    }

    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    let limit = filter.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    values.push(Box::new(limit));

    let sql = format!(
        "SELECT id, domain, event_type, entity_type, entity_id, seq, payload_json, occurred_at
         FROM public_event_log
         {where_clause}
         ORDER BY seq ASC
         LIMIT ?{}",
        values.len()
    );

    let refs: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(|v| &**v).collect();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(refs.as_slice(), |row| {
        Ok(PublicEvent {
            id: row.get(0)?,
            domain: row.get(1)?,
            event_type: row.get(2)?,
            entity_type: row.get(3)?,
            entity_id: row.get(4)?,
            seq: row.get(5)?,
            payload_json: row.get(6)?,
            occurred_at: row.get(7)?,
        })
    })?;

    let mut events = Vec::new();
    for row in rows {
        events.push(row?);
    }
    Ok(events)
}
