//! Infrastructure adapters for publish storage.

pub mod memory;
pub mod postgres;
