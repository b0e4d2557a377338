//! Shared world state for publish booking BDD scenarios.

use std::sync::Arc;

use crate::test_helpers::ManualClock;
use reelqueue::lease::domain::ProjectId;
use reelqueue::publish::{
    adapters::memory::InMemoryPublishStore,
    domain::{Cadence, LanguageCode, PublishChannel, PublishTask, ScheduleRequest, TimeOfDay, UserId},
    services::{PublishScheduler, PublishTaskError, PublishTaskService},
};
use rstest::fixture;

/// Scenario world for publish booking behaviour tests.
pub struct PublishWorld {
    pub clock: ManualClock,
    pub scheduler: PublishScheduler<InMemoryPublishStore, ManualClock>,
    pub tasks: PublishTaskService<InMemoryPublishStore, ManualClock>,
    pub user_id: UserId,
    pub channel: Option<PublishChannel>,
    pub booked: Vec<PublishTask>,
    pub last_transition: Option<Result<PublishTask, PublishTaskError>>,
}

impl PublishWorld {
    /// Creates a world with an empty store and a frozen clock.
    #[must_use]
    pub fn new() -> Self {
        let store = Arc::new(InMemoryPublishStore::new());
        let clock = ManualClock::fixed();
        Self {
            scheduler: PublishScheduler::new(Arc::clone(&store), Arc::new(clock.clone())),
            tasks: PublishTaskService::new(store, Arc::new(clock.clone())),
            clock,
            user_id: UserId::new(),
            channel: None,
            booked: Vec::new(),
            last_transition: None,
        }
    }

    /// Builds a booking request on the scenario channel.
    ///
    /// # Errors
    ///
    /// Returns an error when the channel is missing or an input is invalid.
    pub fn request(
        &self,
        language: &str,
        base_time: &str,
        cadence_days: u32,
    ) -> Result<ScheduleRequest, eyre::Report> {
        let channel = self
            .channel
            .as_ref()
            .ok_or_else(|| eyre::eyre!("missing channel in scenario world"))?;
        Ok(ScheduleRequest {
            user_id: self.user_id,
            channel_id: channel.id(),
            project_id: ProjectId::new(),
            language_code: LanguageCode::new(language)?,
            base_time: base_time.parse::<TimeOfDay>()?,
            cadence: Cadence::days(cadence_days)?,
        })
    }

    /// Returns the most recent booking.
    ///
    /// # Errors
    ///
    /// Returns an error when nothing was booked.
    pub fn last_booked(&self) -> Result<&PublishTask, eyre::Report> {
        self.booked
            .last()
            .ok_or_else(|| eyre::eyre!("no booking in scenario world"))
    }
}

impl Default for PublishWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> PublishWorld {
    PublishWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
