//! Database module for PostgreSQL connection and operations
//!
//! Pool setup, ad-hoc query execution and the Postgres audit log.

pub mod connection;
pub mod executor;
pub mod query_history;

pub use connection::{init_pool, DbPool};
pub use executor::{execute_query, QueryRow};
pub use query_history::PgAuditSink;
