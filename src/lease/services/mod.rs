//! Application services for job leasing and stale lease recovery.

mod lease_manager;
mod sweeper;

pub use lease_manager::{JobLeaseError, JobLeaseResult, JobLeaseService, ReportReceipt};
pub use sweeper::{StaleLeaseSweeper, SweepError, SweepReport};
