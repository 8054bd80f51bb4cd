//! SQLite storage for the LCT pairing core.
//!
//! Owns the connection pool and the embedded schema. Pairing sessions, the
//! pairing request queue, the offline operation queue, the event log and the
//! reference registry tables are all created by the migrations in this crate.
//!
//! Connections are opened in WAL mode with foreign keys on, so one writer and
//! many readers can share a file-backed database across the blocking worker
//! threads the server uses.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, is_unshared_path, DbPool, DbRuntimeSettings, PoolError};
