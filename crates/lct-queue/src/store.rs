//! SQL for `pairing_requests` and `offline_operations`.

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::types::{OfflineOperation, PairingRequest, RequestStatus};

const REQUEST_COLUMNS: &str = "request_id, initiator_id, target_id, request_type, proxy_id, status,
     created_at, processed_at, retry_count, max_retries, last_attempt_at, next_retry_at,
     failure_reason, cancel_reason";

const OPERATION_COLUMNS: &str = "operation_id, component_id, operation_type, proxy_id, payload_json,
     queued_at, retry_count, max_retries, last_attempt_at, next_retry_at, failure_reason";

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, message.into())
}

fn map_request(row: &Row<'_>) -> rusqlite::Result<PairingRequest> {
    let status: String = row.get(5)?;
    let status = RequestStatus::from_column(&status)
        .ok_or_else(|| conversion_error(5, format!("unknown request status: {status}")))?;
    Ok(PairingRequest {
        request_id: row.get(0)?,
        initiator_id: row.get(1)?,
        target_id: row.get(2)?,
        request_type: row.get(3)?,
        proxy_id: row.get(4)?,
        status,
        created_at: row.get(6)?,
        processed_at: row.get(7)?,
        retry_count: row.get(8)?,
        max_retries: row.get(9)?,
        last_attempt_at: row.get(10)?,
        next_retry_at: row.get(11)?,
        failure_reason: row.get(12)?,
        cancel_reason: row.get(13)?,
    })
}

fn map_operation(row: &Row<'_>) -> rusqlite::Result<OfflineOperation> {
    let payload_json: Option<String> = row.get(4)?;
    let payload = payload_json
        .map(|json| serde_json::from_str(&json))
        .transpose()
        .map_err(|e| conversion_error(4, format!("invalid operation payload: {e}")))?;
    Ok(OfflineOperation {
        operation_id: row.get(0)?,
        component_id: row.get(1)?,
        operation_type: row.get(2)?,
        proxy_id: row.get(3)?,
        payload,
        queued_at: row.get(5)?,
        retry_count: row.get(6)?,
        max_retries: row.get(7)?,
        last_attempt_at: row.get(8)?,
        next_retry_at: row.get(9)?,
        failure_reason: row.get(10)?,
    })
}

// ── pairing requests ────────────────────────────────────────────────

pub(crate) fn insert_request(conn: &Connection, r: &PairingRequest) -> rusqlite::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO pairing_requests ({REQUEST_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
        ),
        params![
            r.request_id,
            r.initiator_id,
            r.target_id,
            r.request_type,
            r.proxy_id,
            r.status.as_str(),
            r.created_at,
            r.processed_at,
            r.retry_count,
            r.max_retries,
            r.last_attempt_at,
            r.next_retry_at,
            r.failure_reason,
            r.cancel_reason,
        ],
    )?;
    Ok(())
}

pub(crate) fn get_request(
    conn: &Connection,
    request_id: &str,
) -> rusqlite::Result<Option<PairingRequest>> {
    conn.query_row(
        &format!("SELECT {REQUEST_COLUMNS} FROM pairing_requests WHERE request_id = ?1"),
        [request_id],
        map_request,
    )
    .optional()
}

/// Persists the mutable fields of a request.
pub(crate) fn update_request(conn: &Connection, r: &PairingRequest) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE pairing_requests
         SET status = ?2, processed_at = ?3, retry_count = ?4, last_attempt_at = ?5,
             next_retry_at = ?6, failure_reason = ?7, cancel_reason = ?8
         WHERE request_id = ?1",
        params![
            r.request_id,
            r.status.as_str(),
            r.processed_at,
            r.retry_count,
            r.last_attempt_at,
            r.next_retry_at,
            r.failure_reason,
            r.cancel_reason,
        ],
    )?;
    Ok(())
}

/// Takes a due request for one drain pass by pushing its retry time to
/// `lease_until`.
///
/// Matches on the retry bookkeeping read in the snapshot, so only one of
/// several concurrent passes wins. Returns whether this call won.
pub(crate) fn claim_request(
    conn: &Connection,
    r: &PairingRequest,
    now: i64,
    lease_until: i64,
) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "UPDATE pairing_requests SET next_retry_at = ?5
         WHERE request_id = ?1 AND status = 'queued' AND retry_count = ?2
           AND next_retry_at = ?3 AND next_retry_at <= ?4",
        params![r.request_id, r.retry_count, r.next_retry_at, now, lease_until],
    )?;
    Ok(changed == 1)
}

/// Queued requests naming the component on either side, oldest first.
pub(crate) fn queued_requests_for(
    conn: &Connection,
    component_id: &str,
) -> rusqlite::Result<Vec<PairingRequest>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REQUEST_COLUMNS} FROM pairing_requests
         WHERE (initiator_id = ?1 OR target_id = ?1) AND status = 'queued'
         ORDER BY created_at ASC, request_id ASC"
    ))?;
    let rows = stmt.query_map([component_id], map_request)?;
    rows.collect()
}

// ── offline operations ──────────────────────────────────────────────

pub(crate) fn insert_operation(
    conn: &Connection,
    op: &OfflineOperation,
) -> Result<(), crate::QueueError> {
    let payload_json = op.payload.as_ref().map(serde_json::to_string).transpose()?;
    conn.execute(
        &format!(
            "INSERT INTO offline_operations ({OPERATION_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        ),
        params![
            op.operation_id,
            op.component_id,
            op.operation_type,
            op.proxy_id,
            payload_json,
            op.queued_at,
            op.retry_count,
            op.max_retries,
            op.last_attempt_at,
            op.next_retry_at,
            op.failure_reason,
        ],
    )?;
    Ok(())
}

/// Persists the retry bookkeeping of an operation.
pub(crate) fn update_operation(conn: &Connection, op: &OfflineOperation) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE offline_operations
         SET retry_count = ?2, last_attempt_at = ?3, next_retry_at = ?4, failure_reason = ?5
         WHERE operation_id = ?1",
        params![
            op.operation_id,
            op.retry_count,
            op.last_attempt_at,
            op.next_retry_at,
            op.failure_reason,
        ],
    )?;
    Ok(())
}

/// Operation counterpart of [`claim_request`].
pub(crate) fn claim_operation(
    conn: &Connection,
    op: &OfflineOperation,
    now: i64,
    lease_until: i64,
) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "UPDATE offline_operations SET next_retry_at = ?5
         WHERE operation_id = ?1 AND retry_count = ?2
           AND next_retry_at = ?3 AND next_retry_at <= ?4",
        params![op.operation_id, op.retry_count, op.next_retry_at, now, lease_until],
    )?;
    Ok(changed == 1)
}

pub(crate) fn delete_operation(conn: &Connection, operation_id: &str) -> rusqlite::Result<()> {
    conn.execute(
        "DELETE FROM offline_operations WHERE operation_id = ?1",
        [operation_id],
    )?;
    Ok(())
}

pub(crate) fn operations_for(
    conn: &Connection,
    component_id: &str,
) -> rusqlite::Result<Vec<OfflineOperation>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {OPERATION_COLUMNS} FROM offline_operations
         WHERE component_id = ?1
         ORDER BY queued_at ASC, operation_id ASC"
    ))?;
    let rows = stmt.query_map([component_id], map_operation)?;
    rows.collect()
}

pub(crate) fn operations_for_proxy(
    conn: &Connection,
    proxy_id: &str,
) -> rusqlite::Result<Vec<OfflineOperation>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {OPERATION_COLUMNS} FROM offline_operations
         WHERE proxy_id = ?1
         ORDER BY queued_at ASC, operation_id ASC"
    ))?;
    let rows = stmt.query_map([proxy_id], map_operation)?;
    rows.collect()
}

/// Components with an operation or queued request whose retry time has come.
///
/// Operations already marked exhausted are left out. A request is reported
/// under its initiator, whose drain covers both sides.
pub(crate) fn components_with_due_work(
    conn: &Connection,
    now: i64,
) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT component_id FROM offline_operations
             WHERE next_retry_at <= ?1 AND failure_reason != 'max retries exceeded'
         UNION
         SELECT initiator_id FROM pairing_requests
             WHERE status = 'queued' AND next_retry_at <= ?1
         ORDER BY 1",
    )?;
    let rows = stmt.query_map([now], |row| row.get(0))?;
    rows.collect()
}
