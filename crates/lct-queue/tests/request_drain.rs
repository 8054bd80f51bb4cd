use std::sync::{Arc, Mutex};

use lct_queue::{
    DrainReport, HandlerError, NewPairingRequest, OfflineOperation, OfflineQueue,
    OperationHandlers, PairingRequest, PairingRequestExecutor, RequestStatus,
};
use lct_types::testing::StaticGate;
use lct_types::ManualClock;
use rusqlite::Connection;

const START: i64 = 1_700_000_000;

struct NoopHandlers;

impl OperationHandlers for NoopHandlers {
    fn pairing(&self, _: &Connection, _: &OfflineOperation) -> Result<(), HandlerError> {
        Ok(())
    }

    fn unpairing(&self, _: &Connection, _: &OfflineOperation) -> Result<(), HandlerError> {
        Ok(())
    }

    fn energy_transfer(&self, _: &Connection, _: &OfflineOperation) -> Result<(), HandlerError> {
        Ok(())
    }
}

#[derive(Default)]
struct RecordingExecutor {
    failing: Mutex<Option<String>>,
    executed: Mutex<Vec<String>>,
}

impl PairingRequestExecutor for RecordingExecutor {
    fn execute(&self, _: &Connection, request: &PairingRequest) -> Result<(), HandlerError> {
        self.executed.lock().unwrap().push(request.request_id.clone());
        match self.failing.lock().unwrap().as_ref() {
            Some(msg) => Err(HandlerError::new(msg.clone())),
            None => Ok(()),
        }
    }
}

struct Harness {
    conn: Connection,
    clock: ManualClock,
    gate: Arc<StaticGate>,
    executor: Arc<RecordingExecutor>,
    queue: OfflineQueue,
}

fn harness() -> Harness {
    let conn = Connection::open_in_memory().expect("in-memory db");
    lct_db::run_migrations(&conn).expect("migrations");

    let clock = ManualClock::new(START);
    let gate = Arc::new(
        StaticGate::new()
            .with_component("pack-a", true)
            .with_component("motor-b", true)
            .with_mutual_grant("pack-a", "motor-b"),
    );
    let executor = Arc::new(RecordingExecutor::default());
    let queue = OfflineQueue::new(gate.clone(), Arc::new(NoopHandlers), Arc::new(clock.clone()))
        .with_request_executor(executor.clone());

    Harness {
        conn,
        clock,
        gate,
        executor,
        queue,
    }
}

fn queue_request(h: &Harness) -> PairingRequest {
    h.queue
        .queue_pairing_request(
            &h.conn,
            &NewPairingRequest {
                initiator_id: "pack-a".into(),
                target_id: "motor-b".into(),
                request_type: "pairing".into(),
                proxy_id: None,
            },
        )
        .unwrap()
}

#[test]
fn drain_from_target_side_processes_request() {
    let h = harness();
    let req = queue_request(&h);
    h.clock.advance(30);

    let report = h.queue.process_pairing_requests(&h.conn, "motor-b").unwrap();
    assert_eq!(report.processed_count, 1);
    assert_eq!(*h.executor.executed.lock().unwrap(), vec![req.request_id.clone()]);

    let stored = h.queue.get_request_status(&h.conn, &req.request_id).unwrap();
    assert_eq!(stored.status, RequestStatus::Processed);
    assert_eq!(stored.processed_at, START + 30);
    assert!(h.queue.get_queued_requests(&h.conn, "pack-a").unwrap().is_empty());
}

#[test]
fn failing_request_backs_off_then_fails() {
    let h = harness();
    *h.executor.failing.lock().unwrap() = Some("target offline".into());
    let req = queue_request(&h);

    for (attempt, delay) in [300, 600].into_iter().enumerate() {
        let report = h.queue.process_pairing_requests(&h.conn, "pack-a").unwrap();
        assert_eq!(report.failed_count, 1);
        let stored = h.queue.get_request_status(&h.conn, &req.request_id).unwrap();
        assert_eq!(stored.status, RequestStatus::Queued);
        assert_eq!(stored.retry_count as usize, attempt + 1);
        assert_eq!(stored.failure_reason, "target offline");
        assert_eq!(stored.next_retry_at, stored.last_attempt_at + delay);
        h.clock.advance(delay);
    }

    let report = h.queue.process_pairing_requests(&h.conn, "pack-a").unwrap();
    assert_eq!(report.failed_count, 1);
    let stored = h.queue.get_request_status(&h.conn, &req.request_id).unwrap();
    assert_eq!(stored.status, RequestStatus::Failed);
    assert_eq!(stored.retry_count, 3);

    h.clock.advance(10_000);
    let report = h.queue.process_pairing_requests(&h.conn, "pack-a").unwrap();
    assert_eq!(report, DrainReport::default());
    assert_eq!(h.executor.executed.lock().unwrap().len(), 3);
}

#[test]
fn revoked_authorization_defers_request() {
    let h = harness();
    let req = queue_request(&h);
    h.gate.revoke("motor-b", "pack-a");

    let report = h.queue.process_pairing_requests(&h.conn, "pack-a").unwrap();
    assert_eq!(report, DrainReport::default());
    assert!(h.executor.executed.lock().unwrap().is_empty());

    let stored = h.queue.get_request_status(&h.conn, &req.request_id).unwrap();
    assert_eq!(stored.retry_count, 1);
    assert_eq!(stored.next_retry_at, START + 300);
    assert_eq!(
        stored.failure_reason,
        "pairing not authorized: motor-b may not pair with pack-a"
    );
}

#[test]
fn unverified_side_defers_request() {
    let h = harness();
    let req = queue_request(&h);
    h.gate.set_verified("motor-b", false);

    h.queue.process_pairing_requests(&h.conn, "pack-a").unwrap();
    let stored = h.queue.get_request_status(&h.conn, &req.request_id).unwrap();
    assert_eq!(stored.failure_reason, "component not verified");
    assert_eq!(stored.status, RequestStatus::Queued);
}

#[test]
fn no_executor_means_no_request_drain() {
    let conn = Connection::open_in_memory().unwrap();
    lct_db::run_migrations(&conn).unwrap();
    let gate = Arc::new(
        StaticGate::new()
            .with_component("pack-a", true)
            .with_component("motor-b", true)
            .with_mutual_grant("pack-a", "motor-b"),
    );
    let queue = OfflineQueue::new(gate, Arc::new(NoopHandlers), Arc::new(ManualClock::new(START)));
    queue
        .queue_pairing_request(
            &conn,
            &NewPairingRequest {
                initiator_id: "pack-a".into(),
                target_id: "motor-b".into(),
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(
        queue.process_pairing_requests(&conn, "pack-a").unwrap(),
        DrainReport::default()
    );
    assert_eq!(queue.get_queued_requests(&conn, "pack-a").unwrap().len(), 1);
}
