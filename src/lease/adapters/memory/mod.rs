//! In-memory adapter for lease storage.

mod store;

pub use store::InMemoryLeaseStore;
