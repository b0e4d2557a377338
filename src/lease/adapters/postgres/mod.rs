//! `PostgreSQL` adapters for lease persistence.

mod models;
mod repository;
mod schema;

pub use repository::{LeasePgPool, PostgresLeaseStore};
