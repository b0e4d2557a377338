//! Shared world state for lease hand-off BDD scenarios.

use std::sync::Arc;

use crate::test_helpers::ManualClock;
use reelqueue::lease::{
    adapters::memory::InMemoryLeaseStore,
    domain::{ClaimOutcome, Job, Project},
    services::{JobLeaseError, JobLeaseService, ReportReceipt, StaleLeaseSweeper},
};
use rstest::fixture;

/// Service type used by the BDD world.
pub type TestLeaseService = JobLeaseService<InMemoryLeaseStore, ManualClock>;

/// Scenario world for lease hand-off behaviour tests.
pub struct LeaseWorld {
    pub clock: ManualClock,
    pub service: TestLeaseService,
    pub sweeper: StaleLeaseSweeper<InMemoryLeaseStore, ManualClock>,
    pub project: Option<Project>,
    pub job: Option<Job>,
    pub last_claim: Option<ClaimOutcome>,
    pub last_report: Option<Result<ReportReceipt, JobLeaseError>>,
}

impl LeaseWorld {
    /// Creates a world with an empty store and a frozen clock.
    #[must_use]
    pub fn new() -> Self {
        let store = Arc::new(InMemoryLeaseStore::new());
        let clock = ManualClock::fixed();
        Self {
            service: JobLeaseService::new(Arc::clone(&store), Arc::new(clock.clone())),
            sweeper: StaleLeaseSweeper::new(store, Arc::new(clock.clone())),
            clock,
            project: None,
            job: None,
            last_claim: None,
            last_report: None,
        }
    }

    /// Returns the scenario's job.
    ///
    /// # Errors
    ///
    /// Returns an error when no job was set up.
    pub fn job(&self) -> Result<&Job, eyre::Report> {
        self.job
            .as_ref()
            .ok_or_else(|| eyre::eyre!("missing job in scenario world"))
    }

    /// Returns the scenario's project.
    ///
    /// # Errors
    ///
    /// Returns an error when no project was set up.
    pub fn project(&self) -> Result<&Project, eyre::Report> {
        self.project
            .as_ref()
            .ok_or_else(|| eyre::eyre!("missing project in scenario world"))
    }
}

impl Default for LeaseWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> LeaseWorld {
    LeaseWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
