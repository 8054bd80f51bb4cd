use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use lct_queue::{
    DrainReport, HandlerError, NewOfflineOperation, NewPairingRequest, OfflineOperation,
    OfflineQueue, OperationHandlers, QueueError, QueueHealth, RequestStatus,
};
use lct_types::testing::StaticGate;
use lct_types::{ManualClock, OperationKind};
use rusqlite::Connection;

const START: i64 = 1_700_000_000;

/// Handlers that fail while `failing` is set and count every call.
#[derive(Default)]
struct ScriptedHandlers {
    failing: Mutex<Option<String>>,
    calls: AtomicUsize,
}

impl ScriptedHandlers {
    fn fail_with(&self, message: &str) {
        *self.failing.lock().unwrap() = Some(message.to_string());
    }

    fn succeed(&self) {
        *self.failing.lock().unwrap() = None;
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn run(&self) -> Result<(), HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.failing.lock().unwrap().as_ref() {
            Some(msg) => Err(HandlerError::new(msg.clone())),
            None => Ok(()),
        }
    }
}

impl OperationHandlers for ScriptedHandlers {
    fn pairing(&self, _: &Connection, _: &OfflineOperation) -> Result<(), HandlerError> {
        self.run()
    }

    fn unpairing(&self, _: &Connection, _: &OfflineOperation) -> Result<(), HandlerError> {
        self.run()
    }

    fn energy_transfer(&self, _: &Connection, _: &OfflineOperation) -> Result<(), HandlerError> {
        self.run()
    }
}

struct Harness {
    conn: Connection,
    clock: ManualClock,
    gate: Arc<StaticGate>,
    handlers: Arc<ScriptedHandlers>,
    queue: OfflineQueue,
}

fn harness() -> Harness {
    let conn = Connection::open_in_memory().expect("in-memory db");
    lct_db::run_migrations(&conn).expect("migrations");

    let clock = ManualClock::new(START);
    let gate = Arc::new(
        StaticGate::new()
            .with_component("cell-c", true)
            .with_component("pack-a", true)
            .with_component("motor-b", true)
            .with_component("rogue-x", false)
            .with_mutual_grant("pack-a", "motor-b")
            .with_mutual_grant("pack-a", "rogue-x"),
    );
    let handlers = Arc::new(ScriptedHandlers::default());
    let queue = OfflineQueue::new(gate.clone(), handlers.clone(), Arc::new(clock.clone()));

    Harness {
        conn,
        clock,
        gate,
        handlers,
        queue,
    }
}

fn operation(component: &str, kind: OperationKind) -> NewOfflineOperation {
    NewOfflineOperation {
        component_id: component.to_string(),
        kind,
        proxy_id: None,
        payload: None,
    }
}

fn stored_operation(conn: &Connection, id: &str) -> (u32, i64, i64, String) {
    conn.query_row(
        "SELECT retry_count, last_attempt_at, next_retry_at, failure_reason
         FROM offline_operations WHERE operation_id = ?1",
        [id],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
    )
    .expect("operation should still be stored")
}

fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        .unwrap()
}

#[test]
fn successful_operation_is_removed() {
    let h = harness();
    let op = h
        .queue
        .queue_offline_operation(&h.conn, &operation("cell-c", OperationKind::Pairing))
        .unwrap();
    assert!(op.operation_id.starts_with("cell-c-pairing-1700000000-"));
    assert_eq!(op.max_retries, 5);

    let report = h.queue.process_offline_queue(&h.conn, "cell-c").unwrap();
    assert_eq!(
        report,
        DrainReport {
            processed_count: 1,
            failed_count: 0
        }
    );
    assert_eq!(count(&h.conn, "offline_operations"), 0);
}

#[test]
fn five_failures_exhaust_an_energy_transfer() {
    let h = harness();
    h.handlers.fail_with("energy ledger unreachable");
    let op = h
        .queue
        .queue_offline_operation(&h.conn, &operation("cell-c", OperationKind::EnergyTransfer))
        .unwrap();

    let expected_delays = [300, 600, 1200, 2400, 4800];
    for (attempt, delay) in expected_delays.iter().enumerate() {
        let report = h.queue.process_offline_queue(&h.conn, "cell-c").unwrap();
        assert_eq!(report.failed_count, 1, "attempt {}", attempt + 1);
        assert_eq!(report.processed_count, 0);

        let (retries, last, next, reason) = stored_operation(&h.conn, &op.operation_id);
        let now = START + expected_delays[..attempt].iter().sum::<i64>();
        assert_eq!(retries as usize, attempt + 1);
        assert_eq!(last, now);
        assert_eq!(next, now + delay);
        assert_eq!(reason, "energy ledger unreachable");

        h.clock.advance(*delay);
    }
    assert_eq!(h.handlers.calls(), 5);

    let sixth = h.queue.process_offline_queue(&h.conn, "cell-c").unwrap();
    assert_eq!(sixth, DrainReport::default());
    assert_eq!(h.handlers.calls(), 5, "exhausted operations are never dispatched");

    let (retries, _, _, reason) = stored_operation(&h.conn, &op.operation_id);
    assert_eq!(retries, 5);
    assert_eq!(reason, "max retries exceeded");

    let exhausted = lct_observe::query_events(
        &h.conn,
        &lct_observe::EventFilter {
            event_type: Some("OPERATION_EXHAUSTED".into()),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(exhausted.len(), 1);

    // a later pass neither re-dispatches nor re-announces
    h.clock.advance(10_000);
    assert_eq!(
        h.queue.process_offline_queue(&h.conn, "cell-c").unwrap(),
        DrainReport::default()
    );
    let again = lct_observe::query_events(
        &h.conn,
        &lct_observe::EventFilter {
            event_type: Some("OPERATION_EXHAUSTED".into()),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(again.len(), 1);
}

#[test]
fn operations_are_not_retried_before_their_time() {
    let h = harness();
    h.handlers.fail_with("partner offline");
    h.queue
        .queue_offline_operation(&h.conn, &operation("cell-c", OperationKind::Unpairing))
        .unwrap();

    h.queue.process_offline_queue(&h.conn, "cell-c").unwrap();
    h.handlers.succeed();

    h.clock.advance(299);
    let early = h.queue.process_offline_queue(&h.conn, "cell-c").unwrap();
    assert_eq!(early, DrainReport::default());
    assert_eq!(h.handlers.calls(), 1);

    h.clock.advance(1);
    let due = h.queue.process_offline_queue(&h.conn, "cell-c").unwrap();
    assert_eq!(due.processed_count, 1);
    assert_eq!(h.handlers.calls(), 2);
}

#[test]
fn unverified_component_defers_without_counting() {
    let h = harness();
    let op = h
        .queue
        .queue_offline_operation(&h.conn, &operation("cell-c", OperationKind::Pairing))
        .unwrap();
    h.gate.set_verified("cell-c", false);

    let report = h.queue.process_offline_queue(&h.conn, "cell-c").unwrap();
    assert_eq!(report, DrainReport::default());
    assert_eq!(h.handlers.calls(), 0);

    let (retries, last, next, reason) = stored_operation(&h.conn, &op.operation_id);
    assert_eq!(retries, 1);
    assert_eq!(last, START);
    assert_eq!(next, START + 300);
    assert_eq!(reason, "component not verified");
}

#[test]
fn unknown_stored_type_is_a_failed_attempt() {
    let h = harness();
    h.conn
        .execute(
            "INSERT INTO offline_operations
                (operation_id, component_id, operation_type, queued_at, max_retries)
             VALUES ('legacy-1', 'cell-c', 'firmware_update', ?1, 5)",
            [START - 10],
        )
        .unwrap();

    let report = h.queue.process_offline_queue(&h.conn, "cell-c").unwrap();
    assert_eq!(report.failed_count, 1);
    assert_eq!(h.handlers.calls(), 0);

    let (retries, _, next, reason) = stored_operation(&h.conn, "legacy-1");
    assert_eq!(retries, 1);
    assert_eq!(next, START + 300);
    assert_eq!(reason, "unknown operation type");
}

#[test]
fn drain_only_touches_the_named_component() {
    let h = harness();
    h.queue
        .queue_offline_operation(&h.conn, &operation("cell-c", OperationKind::Pairing))
        .unwrap();
    h.queue
        .queue_offline_operation(&h.conn, &operation("pack-a", OperationKind::Pairing))
        .unwrap();

    let report = h.queue.process_offline_queue(&h.conn, "pack-a").unwrap();
    assert_eq!(report.processed_count, 1);
    assert_eq!(count(&h.conn, "offline_operations"), 1);
}

#[test]
fn queue_operation_requires_verified_component() {
    let h = harness();
    let err = h
        .queue
        .queue_offline_operation(&h.conn, &operation("rogue-x", OperationKind::Pairing))
        .unwrap_err();
    assert!(matches!(err, QueueError::Unverified(_)));
    assert_eq!(count(&h.conn, "offline_operations"), 0);
}

#[test]
fn unverified_initiator_creates_no_request() {
    let h = harness();
    let err = h
        .queue
        .queue_pairing_request(
            &h.conn,
            &NewPairingRequest {
                initiator_id: "rogue-x".into(),
                target_id: "pack-a".into(),
                request_type: "pairing".into(),
                proxy_id: None,
            },
        )
        .unwrap_err();
    match err {
        QueueError::Unverified(msg) => assert!(msg.contains("initiator"), "{msg}"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(count(&h.conn, "pairing_requests"), 0);
}

#[test]
fn unverified_target_is_named() {
    let h = harness();
    let err = h
        .queue
        .queue_pairing_request(
            &h.conn,
            &NewPairingRequest {
                initiator_id: "pack-a".into(),
                target_id: "rogue-x".into(),
                ..Default::default()
            },
        )
        .unwrap_err();
    match err {
        QueueError::Unverified(msg) => assert!(msg.contains("target"), "{msg}"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn unauthorized_pair_surfaces_gate_reason() {
    let h = harness();
    let err = h
        .queue
        .queue_pairing_request(
            &h.conn,
            &NewPairingRequest {
                initiator_id: "cell-c".into(),
                target_id: "motor-b".into(),
                ..Default::default()
            },
        )
        .unwrap_err();
    match err {
        QueueError::Unauthorized(reason) => {
            assert_eq!(reason, "cell-c may not pair with motor-b")
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn cancel_only_from_queued() {
    let h = harness();
    let req = h
        .queue
        .queue_pairing_request(
            &h.conn,
            &NewPairingRequest {
                initiator_id: "pack-a".into(),
                target_id: "motor-b".into(),
                request_type: "pairing".into(),
                proxy_id: Some("proxy-7".into()),
            },
        )
        .unwrap();
    assert_eq!(req.status, RequestStatus::Queued);
    assert_eq!(req.max_retries, 3);
    assert!(req.request_id.starts_with("pack-a-motor-b-1700000000-"));

    h.clock.advance(5);
    let cancelled = h
        .queue
        .cancel_request(&h.conn, &req.request_id, "owner changed their mind")
        .unwrap();
    assert_eq!(cancelled.status, RequestStatus::Cancelled);
    assert_eq!(cancelled.processed_at, START + 5);

    let stored = h.queue.get_request_status(&h.conn, &req.request_id).unwrap();
    assert_eq!(stored.cancel_reason.as_deref(), Some("owner changed their mind"));

    let err = h
        .queue
        .cancel_request(&h.conn, &req.request_id, "again")
        .unwrap_err();
    match err {
        QueueError::InvalidState { status, .. } => assert_eq!(status, "cancelled"),
        other => panic!("unexpected error: {other:?}"),
    }

    let err = h.queue.cancel_request(&h.conn, "nope", "x").unwrap_err();
    assert!(matches!(err, QueueError::NotFound(_)));
    assert!(h.queue.get_queued_requests(&h.conn, "pack-a").unwrap().is_empty());
}

#[test]
fn queued_requests_match_either_side() {
    let h = harness();
    h.queue
        .queue_pairing_request(
            &h.conn,
            &NewPairingRequest {
                initiator_id: "pack-a".into(),
                target_id: "motor-b".into(),
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(h.queue.get_queued_requests(&h.conn, "pack-a").unwrap().len(), 1);
    assert_eq!(h.queue.get_queued_requests(&h.conn, "motor-b").unwrap().len(), 1);
    assert!(h.queue.get_queued_requests(&h.conn, "cell-c").unwrap().is_empty());
    assert!(matches!(
        h.queue.get_queued_requests(&h.conn, " ").unwrap_err(),
        QueueError::InvalidRequest(_)
    ));
}

#[test]
fn proxy_queue_filters_by_proxy() {
    let h = harness();
    for (component, proxy) in [
        ("cell-c", Some("proxy-1")),
        ("pack-a", Some("proxy-1")),
        ("motor-b", Some("proxy-2")),
        ("cell-c", None),
    ] {
        h.queue
            .queue_offline_operation(
                &h.conn,
                &NewOfflineOperation {
                    component_id: component.into(),
                    kind: OperationKind::EnergyTransfer,
                    proxy_id: proxy.map(str::to_string),
                    payload: Some(serde_json::json!({ "amount": 3 })),
                },
            )
            .unwrap();
    }

    let proxied = h.queue.list_proxy_queue(&h.conn, "proxy-1").unwrap();
    assert_eq!(proxied.len(), 2);
    assert!(proxied.iter().all(|op| op.proxy_id.as_deref() == Some("proxy-1")));
    assert_eq!(proxied[0].payload, Some(serde_json::json!({ "amount": 3 })));
    assert!(h.queue.list_proxy_queue(&h.conn, "proxy-9").unwrap().is_empty());
}

#[test]
fn status_reports_retries_and_health() {
    let h = harness();
    let status = h.queue.queue_status(&h.conn, "cell-c").unwrap();
    assert_eq!(status.queue_health, QueueHealth::Healthy);
    assert_eq!(status.offline_operations, 0);

    h.handlers.fail_with("nope");
    h.queue
        .queue_offline_operation(&h.conn, &operation("cell-c", OperationKind::Pairing))
        .unwrap();
    h.queue.process_offline_queue(&h.conn, "cell-c").unwrap();

    let status = h.queue.queue_status(&h.conn, "cell-c").unwrap();
    assert_eq!(status.offline_operations, 1);
    assert_eq!(status.total_retries, 1);
    assert_eq!(status.failed_operations, 0);
    assert_eq!(status.average_retry_delay, 300);
    assert_eq!(status.last_processed_at, START);
    assert_eq!(status.queue_health, QueueHealth::Warning);

    h.conn
        .execute(
            "UPDATE offline_operations SET retry_count = max_retries WHERE component_id = 'cell-c'",
            [],
        )
        .unwrap();
    let status = h.queue.queue_status(&h.conn, "cell-c").unwrap();
    assert_eq!(status.failed_operations, 1);
    assert_eq!(status.queue_health, QueueHealth::Critical);
}

#[test]
fn due_work_lists_components_once() {
    let h = harness();
    h.queue
        .queue_offline_operation(&h.conn, &operation("cell-c", OperationKind::Pairing))
        .unwrap();
    h.queue
        .queue_offline_operation(&h.conn, &operation("cell-c", OperationKind::Unpairing))
        .unwrap();
    h.queue
        .queue_pairing_request(
            &h.conn,
            &NewPairingRequest {
                initiator_id: "pack-a".into(),
                target_id: "motor-b".into(),
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(
        h.queue.components_with_due_work(&h.conn).unwrap(),
        vec!["cell-c".to_string(), "pack-a".to_string()]
    );

    h.handlers.fail_with("later");
    h.queue.process_offline_queue(&h.conn, "cell-c").unwrap();
    assert_eq!(
        h.queue.components_with_due_work(&h.conn).unwrap(),
        vec!["pack-a".to_string()]
    );
}
