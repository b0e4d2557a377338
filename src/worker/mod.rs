//! Polling loops that drive the lease services.
//!
//! The loops own no scheduling state of their own: every pass goes back to
//! the store, so any number of processes can run them side by side.

mod backoff;
mod job_loop;
mod sweep_loop;

pub use backoff::Backoff;
pub use job_loop::{
    JobHandler, JobHandlerOutcome, JobLoopSettings, JobWorkerLoop, PollSummary,
};
pub use sweep_loop::SweepLoop;

#[cfg(test)]
pub use job_loop::MockJobHandler;
