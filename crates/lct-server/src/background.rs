//! Background tasks for the LCT host.
//!
//! Includes:
//! - Draining every component with due queue work.

use crate::orchestrator::drain_component;
use crate::AppState;
use lct_queue::DrainReport;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

/// Outcome of one scheduled pass over all components with due work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub components: usize,
    pub report: DrainReport,
}

/// Drains every component that has due operations or requests.
///
/// A component whose drain fails is logged and skipped; the rest of the
/// sweep continues.
pub fn drain_due_work(state: &AppState) -> Result<SweepSummary, String> {
    let conn = state.pool.get().map_err(|e| e.to_string())?;
    let due = state
        .queue
        .components_with_due_work(&conn)
        .map_err(|e| e.to_string())?;

    let mut summary = SweepSummary::default();
    for component_id in due {
        match drain_component(&state.queue, &conn, &component_id) {
            Ok(report) => {
                summary.components += 1;
                summary.report = summary.report + report;
            }
            Err(e) => {
                tracing::error!(component_id = %component_id, "scheduled drain failed: {}", e);
            }
        }
    }
    Ok(summary)
}

/// Starts the scheduled drain task.
///
/// This task runs indefinitely, sweeping components with due queue work
/// every `interval_seconds`.
pub async fn start_drain_task(state: Arc<AppState>, interval_seconds: u64) {
    if interval_seconds == 0 {
        tracing::warn!("drain task disabled (interval=0)");
        return;
    }

    let interval = Duration::from_secs(interval_seconds);
    tracing::info!(interval_seconds, "starting queue drain task");

    loop {
        sleep(interval).await;

        let state = state.clone();
        let res = tokio::task::spawn_blocking(move || drain_due_work(&state)).await;

        match res {
            Ok(Ok(summary)) => {
                if summary.report.is_empty() {
                    tracing::debug!(components = summary.components, "queue drain found no work");
                } else {
                    tracing::info!(
                        components = summary.components,
                        processed = summary.report.processed_count,
                        failed = summary.report.failed_count,
                        "queue drain pass complete"
                    );
                }
            }
            Ok(Err(e)) => {
                tracing::error!("failed to drain queues: {}", e);
            }
            Err(e) => {
                tracing::error!("drain task join error: {}", e);
            }
        }
    }
}
