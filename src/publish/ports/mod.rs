//! Port contracts for scheduled publishing.

pub mod repository;

pub use repository::{
    PublishStore, PublishStoreError, PublishStoreResult, TaskAcquisition, TaskStatusWrite,
};
