//! Scheduled publishing of finished videos to external channels.
//!
//! The scheduler spaces a user's publications on a channel by a fixed
//! cadence and never books two blocking tasks into the same slot. Workers
//! then drive each task through publishing and, when requested, provider
//! cleanup.
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
