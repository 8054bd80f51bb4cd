//! Read-only queue status.

use rusqlite::Connection;

use crate::error::QueueError;
use crate::queue::OfflineQueue;
use crate::store;
use crate::types::QueueStatus;

impl OfflineQueue {
    /// Summarises a component's queue. Reads only; may be stale relative to
    /// a drain running on another connection.
    pub fn queue_status(
        &self,
        conn: &Connection,
        component_id: &str,
    ) -> Result<QueueStatus, QueueError> {
        if component_id.trim().is_empty() {
            return Err(QueueError::InvalidRequest(
                "componentId is required".to_string(),
            ));
        }

        let requests = store::queued_requests_for(conn, component_id)?;
        let operations = store::operations_for(conn, component_id)?;

        let total_retries: u32 = operations.iter().map(|op| op.retry_count).sum();
        let failed_operations = operations.iter().filter(|op| op.budget_spent()).count() as u32;
        let last_processed_at = operations
            .iter()
            .map(|op| op.last_attempt_at)
            .max()
            .unwrap_or(0);

        let delays: Vec<i64> = operations
            .iter()
            .filter(|op| op.retry_count > 0 && op.last_attempt_at > 0)
            .map(|op| op.next_retry_at - op.last_attempt_at)
            .collect();
        let average_retry_delay = if delays.is_empty() {
            0
        } else {
            delays.iter().sum::<i64>() / delays.len() as i64
        };

        Ok(QueueStatus {
            component_id: component_id.to_string(),
            timestamp: self.now(),
            queued_requests: requests.len() as u32,
            offline_operations: operations.len() as u32,
            total_retries,
            failed_operations,
            average_retry_delay,
            last_processed_at,
            queue_health: self.thresholds.classify(failed_operations, total_retries),
        })
    }
}
