use lct_registry::components::{grant_pairing, register_component};
use lct_registry::trust::record_outcome;
use lct_registry::{NewComponent, SqliteRegistry, TrustOutcome};
use lct_types::{AuthorizationGate, CollaboratorError, RelationshipStore, TrustEngine};
use rusqlite::Connection;

fn registry_db() -> Connection {
    let conn = Connection::open_in_memory().expect("in-memory db");
    lct_db::run_migrations(&conn).unwrap();
    for (id, verified) in [("cell-1", true), ("pack-1", false)] {
        register_component(
            &conn,
            &NewComponent {
                component_id: id.into(),
                component_type: "battery_module".into(),
                owner: String::new(),
                verified,
            },
        )
        .unwrap();
    }
    grant_pairing(&conn, "cell-1", "pack-1", "").unwrap();
    grant_pairing(&conn, "pack-1", "cell-1", "").unwrap();
    conn
}

#[test]
fn gate_reads_components_and_grants() {
    let conn = registry_db();
    let reg = SqliteRegistry;
    assert!(reg.component_exists(&conn, "cell-1").unwrap());
    assert!(!reg.component_exists(&conn, "ghost").unwrap());
    assert!(reg.is_verified_for_pairing(&conn, "cell-1").unwrap());
    assert!(!reg.is_verified_for_pairing(&conn, "pack-1").unwrap());
    assert!(!reg.is_verified_for_pairing(&conn, "ghost").unwrap());
    assert!(reg
        .check_bidirectional_auth(&conn, "cell-1", "pack-1")
        .unwrap()
        .is_granted());
}

#[test]
fn relationship_lifecycle_through_store() {
    let conn = registry_db();
    let reg = SqliteRegistry;
    let created = reg
        .create_relationship(&conn, "cell-1", "pack-1", "assembly", None)
        .unwrap();
    assert!(created.relationship_id.starts_with("lct-"));

    reg.terminate_relationship(&conn, &created.relationship_id, "decommissioned", false)
        .unwrap();
    let err = reg
        .terminate_relationship(&conn, &created.relationship_id, "again", false)
        .unwrap_err();
    assert!(matches!(err, CollaboratorError::Rejected(_)));

    let err = reg
        .terminate_relationship(&conn, "lct-ghost", "x", false)
        .unwrap_err();
    assert!(matches!(err, CollaboratorError::RelationshipNotFound(_)));
}

#[test]
fn writes_land_in_the_callers_transaction() {
    let mut conn = registry_db();
    let reg = SqliteRegistry;
    {
        let tx = conn.transaction().unwrap();
        reg.create_relationship(&tx, "cell-1", "pack-1", "", None)
            .unwrap();
        // dropped without commit
    }
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM relationships", [], |r| r.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn trust_engine_scores_recorded_outcomes() {
    let conn = registry_db();
    let reg = SqliteRegistry;
    let created = reg
        .create_relationship(&conn, "cell-1", "pack-1", "", None)
        .unwrap();
    for _ in 0..10 {
        record_outcome(&conn, &created.relationship_id, "", TrustOutcome::Positive).unwrap();
    }

    let reading = reg
        .trust_score(&conn, &created.relationship_id, "assembly")
        .unwrap();
    assert!(reading.score > 0.75);
    assert_eq!(reading.label, "high");

    assert!(matches!(
        reg.trust_score(&conn, "lct-ghost", ""),
        Err(CollaboratorError::RelationshipNotFound(_))
    ));
}
