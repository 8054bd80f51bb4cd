use rusqlite::Connection;

use crate::event::{EventDomain, EventPayload};
use crate::store::{emit_event, next_seq, query_events, record_event, EventFilter};

fn test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("should open in-memory db");
    lct_db::run_migrations(&conn).expect("migrations should succeed");
    conn
}

fn revoked(relationship_id: &str) -> EventPayload {
    EventPayload::PairingRevoked {
        relationship_id: relationship_id.to_string(),
        reason: "module swapped".to_string(),
        notify_offline: false,
    }
}

fn queued(operation_id: &str) -> EventPayload {
    EventPayload::OperationQueued {
        operation_id: operation_id.to_string(),
        component_id: "cell-7".to_string(),
        operation_type: "energy_transfer".to_string(),
        proxy_id: Some("proxy-1".to_string()),
    }
}

#[test]
fn emit_derives_columns_from_payload() {
    let conn = test_db();
    let event = emit_event(&conn, &revoked("lct-1")).expect("emit should succeed");

    assert_eq!(event.domain, "PAIRING");
    assert_eq!(event.event_type, "PAIRING_REVOKED");
    assert_eq!(event.entity_type, "relationship");
    assert_eq!(event.entity_id, "lct-1");
    assert_eq!(event.seq, 1);

    let stored: (String, String) = conn
        .query_row(
            "SELECT event_type, entity_id FROM public_event_log WHERE id = ?1",
            [event.id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(stored, ("PAIRING_REVOKED".to_string(), "lct-1".to_string()));
}

#[test]
fn stored_payload_decodes_to_the_same_variant() {
    let conn = test_db();
    let payload = queued("op-1");
    let event = emit_event(&conn, &payload).unwrap();

    assert!(event.payload_json.contains("\"event\":\"OPERATION_QUEUED\""));
    assert_eq!(event.payload().unwrap(), payload);
}

#[test]
fn sequence_numbers_increase() {
    let conn = test_db();
    assert_eq!(next_seq(&conn).unwrap(), 1);

    let first = emit_event(&conn, &revoked("lct-1")).unwrap();
    let second = emit_event(&conn, &queued("op-1")).unwrap();
    let third = emit_event(&conn, &revoked("lct-2")).unwrap();

    assert_eq!((first.seq, second.seq, third.seq), (1, 2, 3));
    assert_eq!(next_seq(&conn).unwrap(), 4);
}

#[test]
fn record_event_swallows_write_failures() {
    let conn = Connection::open_in_memory().unwrap();
    // no migrations: the table does not exist
    assert!(record_event(&conn, &revoked("lct-1")).is_none());

    let conn = test_db();
    assert!(record_event(&conn, &revoked("lct-1")).is_some());
}

#[test]
fn query_filters_by_domain_and_entity() {
    let conn = test_db();
    emit_event(&conn, &revoked("lct-1")).unwrap();
    emit_event(&conn, &queued("op-1")).unwrap();
    emit_event(&conn, &queued("op-2")).unwrap();

    let queue = query_events(
        &conn,
        &EventFilter {
            domain: Some(EventDomain::Queue),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(queue.len(), 2);
    assert!(queue.iter().all(|e| e.domain == "QUEUE"));

    let one = query_events(
        &conn,
        &EventFilter {
            entity_type: Some("offline_operation".to_string()),
            entity_id: Some("op-2".to_string()),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(one.len(), 1);
    assert_eq!(one[0].seq, 3);
}

#[test]
fn query_pages_with_cursor_and_limit() {
    let conn = test_db();
    for i in 0..5 {
        emit_event(&conn, &queued(&format!("op-{i}"))).unwrap();
    }

    let page = query_events(
        &conn,
        &EventFilter {
            after_seq: Some(2),
            limit: Some(2),
            ..Default::default()
        },
    )
    .unwrap();
    let seqs: Vec<i64> = page.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![3, 4]);
}

#[test]
fn query_since_excludes_older_rows() {
    let conn = test_db();
    let old = emit_event(&conn, &revoked("lct-old")).unwrap();
    conn.execute(
        "UPDATE public_event_log SET occurred_at = '2020-01-01 00:00:00' WHERE id = ?1",
        [old.id],
    )
    .unwrap();
    emit_event(&conn, &revoked("lct-new")).unwrap();

    let recent = query_events(
        &conn,
        &EventFilter {
            since: Some("2024-01-01 00:00:00".to_string()),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].entity_id, "lct-new");
}

#[test]
fn domain_parses_case_insensitively() {
    assert_eq!("pairing".parse::<EventDomain>().unwrap(), EventDomain::Pairing);
    assert_eq!("QUEUE".parse::<EventDomain>().unwrap(), EventDomain::Queue);
    assert!("IDENTITY".parse::<EventDomain>().is_err());
}
