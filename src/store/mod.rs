//! Persistence layer: libSQL-backed storage for request records and
//! per-user settings slots.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{Database, GuardedInsert, NewRequest, RequestRecord, RequestStatus};
