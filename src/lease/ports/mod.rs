//! Port contracts for lease management.
//!
//! Ports define infrastructure-agnostic interfaces used by lease services.

pub mod repository;

pub use repository::{
    JobStatusChange, JobStatusChangeOutcome, LeaseStore, LeaseStoreError, LeaseStoreResult,
    StaleLeaseQuery,
};
