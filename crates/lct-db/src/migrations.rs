//! Embedded schema migrations.
//!
//! SQL files are compiled in with `include_str!` and applied in order. Each
//! applied name is recorded in `_lct_migrations`; a migration and its
//! tracking row commit in the same transaction.

use rusqlite::Connection;
use thiserror::Error;

struct Migration {
    name: &'static str,
    sql: &'static str,
}

/// Append-only. Never reorder or edit a shipped entry.
const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "001_pairing_sessions",
        sql: include_str!("migrations/001_pairing_sessions.sql"),
    },
    Migration {
        name: "002_pairing_requests",
        sql: include_str!("migrations/002_pairing_requests.sql"),
    },
    Migration {
        name: "003_offline_operations",
        sql: include_str!("migrations/003_offline_operations.sql"),
    },
    Migration {
        name: "004_public_event_log",
        sql: include_str!("migrations/004_public_event_log.sql"),
    },
    Migration {
        name: "005_components",
        sql: include_str!("migrations/005_components.sql"),
    },
    Migration {
        name: "006_relationships",
        sql: include_str!("migrations/006_relationships.sql"),
    },
    Migration {
        name: "007_trust_observations",
        sql: include_str!("migrations/007_trust_observations.sql"),
    },
    Migration {
        name: "008_component_heartbeats",
        sql: include_str!("migrations/008_component_heartbeats.sql"),
    },
];

#[derive(Debug, Error)]
pub enum MigrationError {
    /// A statement inside the named migration failed; nothing from it was kept.
    #[error("migration '{name}' failed: {source}")]
    ExecutionFailed {
        name: String,
        source: rusqlite::Error,
    },

    #[error("failed to check migration state: {0}")]
    StateQuery(rusqlite::Error),
}

/// Applies every embedded migration not yet recorded. Returns how many ran.
pub fn run_migrations(conn: &Connection) -> Result<usize, MigrationError> {
    run_migrations_from_list(conn, MIGRATIONS)
}

fn run_migrations_from_list(
    conn: &Connection,
    migrations: &[Migration],
) -> Result<usize, MigrationError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _lct_migrations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(|source| MigrationError::ExecutionFailed {
        name: "_lct_migrations".to_string(),
        source,
    })?;

    let mut applied = 0;
    for migration in migrations {
        let done: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM _lct_migrations WHERE name = ?1)",
                [migration.name],
                |row| row.get(0),
            )
            .map_err(MigrationError::StateQuery)?;
        if done {
            tracing::debug!(migration = migration.name, "already applied");
            continue;
        }

        apply(conn, migration).map_err(|source| MigrationError::ExecutionFailed {
            name: migration.name.to_string(),
            source,
        })?;
        tracing::info!(migration = migration.name, "applied migration");
        applied += 1;
    }

    Ok(applied)
}

fn apply(conn: &Connection, migration: &Migration) -> Result<(), rusqlite::Error> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(migration.sql)?;
    tx.execute(
        "INSERT INTO _lct_migrations (name) VALUES (?1)",
        [migration.name],
    )?;
    tx.commit()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            [name],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn fresh_database_gets_every_migration() {
        let conn = Connection::open_in_memory().unwrap();
        let applied = run_migrations(&conn).expect("migrations");
        assert_eq!(applied, MIGRATIONS.len());

        for table in [
            "pairing_sessions",
            "pairing_requests",
            "offline_operations",
            "public_event_log",
            "components",
            "pairing_grants",
            "relationships",
            "trust_observations",
            "component_heartbeats",
        ] {
            assert!(table_exists(&conn, table), "missing table {table}");
        }
    }

    #[test]
    fn second_run_is_a_no_op() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(run_migrations(&conn).unwrap(), 0);

        let recorded: i64 = conn
            .query_row("SELECT COUNT(*) FROM _lct_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(recorded as usize, MIGRATIONS.len());
    }

    #[test]
    fn failed_migration_leaves_no_schema_behind() {
        let conn = Connection::open_in_memory().unwrap();
        let broken = [Migration {
            name: "900_half_applied",
            sql: "CREATE TABLE half_applied (id INTEGER PRIMARY KEY);
                  INSERT INTO no_such_table VALUES (1);",
        }];

        match run_migrations_from_list(&conn, &broken) {
            Err(MigrationError::ExecutionFailed { name, .. }) => {
                assert_eq!(name, "900_half_applied")
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(!table_exists(&conn, "half_applied"));
    }

    #[test]
    fn retry_count_cannot_exceed_budget() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO offline_operations
                (operation_id, component_id, operation_type, queued_at, retry_count, max_retries)
             VALUES ('op-1', 'c-1', 'pairing', 0, 6, 5)",
            [],
        );
        assert!(result.is_err());
    }
}
