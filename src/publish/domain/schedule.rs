//! Publication slot arithmetic.

use super::{ChannelId, LanguageCode, PublishDomainError, UserId};
use crate::lease::domain::ProjectId;
use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use std::fmt;
use std::str::FromStr;

/// UTC time of day a user's videos go live at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(NaiveTime);

impl TimeOfDay {
    /// Builds a time of day from hour and minute.
    ///
    /// # Errors
    ///
    /// Returns [`PublishDomainError::InvalidTimeOfDay`] when either component
    /// is out of range.
    pub fn from_hm(hour: u32, minute: u32) -> Result<Self, PublishDomainError> {
        NaiveTime::from_hms_opt(hour, minute, 0)
            .map(Self)
            .ok_or_else(|| PublishDomainError::InvalidTimeOfDay(format!("{hour:02}:{minute:02}")))
    }

    /// Returns the wrapped time.
    #[must_use]
    pub const fn as_naive(self) -> NaiveTime {
        self.0
    }
}

impl FromStr for TimeOfDay {
    type Err = PublishDomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let invalid = || PublishDomainError::InvalidTimeOfDay(value.to_owned());
        let (hour, minute) = trimmed.split_once(':').ok_or_else(invalid)?;
        if hour.len() != 2 || minute.len() != 2 {
            return Err(invalid());
        }
        let parsed_hour = hour.parse::<u32>().map_err(|_| invalid())?;
        let parsed_minute = minute.parse::<u32>().map_err(|_| invalid())?;
        NaiveTime::from_hms_opt(parsed_hour, parsed_minute, 0)
            .map(Self)
            .ok_or_else(invalid)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

/// Number of days between consecutive publications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cadence(u32);

impl Cadence {
    /// Validates a cadence in days.
    ///
    /// # Errors
    ///
    /// Returns [`PublishDomainError::InvalidCadence`] when `days` is zero.
    pub const fn days(days: u32) -> Result<Self, PublishDomainError> {
        if days == 0 {
            return Err(PublishDomainError::InvalidCadence(days));
        }
        Ok(Self(days))
    }

    /// Returns the cadence in days.
    #[must_use]
    pub const fn as_days(self) -> u32 {
        self.0
    }

    /// Returns the cadence as a duration.
    #[must_use]
    pub fn as_delta(self) -> TimeDelta {
        TimeDelta::days(i64::from(self.0))
    }
}

/// Input for computing and booking a publication slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleRequest {
    /// Owning user.
    pub user_id: UserId,
    /// Destination channel.
    pub channel_id: ChannelId,
    /// Project to publish.
    pub project_id: ProjectId,
    /// Publication language.
    pub language_code: LanguageCode,
    /// Time of day slots fall on.
    pub base_time: TimeOfDay,
    /// Days between publications.
    pub cadence: Cadence,
}

/// Tuning for the slot search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulePolicy {
    /// A blocking task within this distance of a candidate occupies it.
    pub conflict_window: TimeDelta,
    /// Candidates examined before giving up.
    pub max_probe: u32,
    /// Insert attempts before reporting contention.
    pub max_insert_attempts: u32,
}

impl SchedulePolicy {
    /// Default number of candidates examined.
    pub const DEFAULT_MAX_PROBE: u32 = 366;
    /// Default number of insert attempts.
    pub const DEFAULT_MAX_INSERT_ATTEMPTS: u32 = 3;

    /// Checks the policy bounds.
    ///
    /// # Errors
    ///
    /// Returns [`PublishDomainError::NegativeConflictWindow`] or
    /// [`PublishDomainError::ZeroSchedulingBound`].
    pub fn validate(&self) -> Result<(), PublishDomainError> {
        if self.conflict_window < TimeDelta::zero() {
            return Err(PublishDomainError::NegativeConflictWindow);
        }
        if self.max_probe == 0 {
            return Err(PublishDomainError::ZeroSchedulingBound("max_probe"));
        }
        if self.max_insert_attempts == 0 {
            return Err(PublishDomainError::ZeroSchedulingBound("max_insert_attempts"));
        }
        Ok(())
    }
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self {
            conflict_window: TimeDelta::zero(),
            max_probe: Self::DEFAULT_MAX_PROBE,
            max_insert_attempts: Self::DEFAULT_MAX_INSERT_ATTEMPTS,
        }
    }
}

/// Returns the first slot strictly after `now` following the cadence.
///
/// Slots continue from the date of `latest` when the series already has a
/// publication and start today otherwise. Returns `None` on calendar
/// overflow.
#[must_use]
pub fn first_candidate(
    latest: Option<DateTime<Utc>>,
    base_time: TimeOfDay,
    cadence: Cadence,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let step = cadence.as_delta();
    let today = now.date_naive().and_time(base_time.as_naive()).and_utc();
    let start = latest.map_or(Some(today), |previous| {
        previous
            .date_naive()
            .and_time(base_time.as_naive())
            .and_utc()
            .checked_add_signed(step)
    })?;
    if start > now {
        return Some(start);
    }
    let behind_days = (now - start).num_days();
    let skipped = behind_days.checked_div(i64::from(cadence.as_days()))?;
    let mut candidate = start.checked_add_signed(step.checked_mul(i32::try_from(skipped).ok()?)?)?;
    while candidate <= now {
        candidate = candidate.checked_add_signed(step)?;
    }
    Some(candidate)
}
