//! Project locks and job leases.
//!
//! Daemons claim queued jobs, which locks the owning project to them until
//! they report a terminal or paused status. A sweeper fails leases that stop
//! making progress. The module follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
