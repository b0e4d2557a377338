//! Reelqueue: work distribution for a video-generation pipeline.
//!
//! Rendering daemons pull pipeline jobs from a shared backlog. Each job
//! belongs to a project that only one daemon may work on at a time, leases
//! left behind by dead daemons are swept, and finished videos are scheduled
//! for publication on external channels without slot collisions.
//!
//! # Architecture
//!
//! Each bounded context follows hexagonal architecture:
//!
//! - **Domain**: Pure rules with no infrastructure dependencies
//! - **Ports**: Store traits the services depend on
//! - **Adapters**: In-memory and `PostgreSQL` implementations of the ports
//! - **Services**: Orchestration over a store and a clock
//!
//! # Modules
//!
//! - [`lease`]: Project locks, job claims, status reports, stale lease sweeps
//! - [`publish`]: Publish channels, slot scheduling, publish task lifecycle
//! - [`worker`]: Polling loops for daemons and the sweeper
//! - [`config`]: Environment configuration

pub mod config;
pub mod lease;
pub mod publish;
pub mod worker;

#[cfg(test)]
mod test_support;
