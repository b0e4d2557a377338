//! In-memory adapter for publish storage.

mod store;

pub use store::InMemoryPublishStore;
