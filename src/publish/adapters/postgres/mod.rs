//! `PostgreSQL` adapter for publish storage.

mod models;
mod repository;
mod schema;

pub use repository::{PostgresPublishStore, PublishPgPool};
