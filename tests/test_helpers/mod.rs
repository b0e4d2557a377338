//! Shared helpers for integration tests.

use chrono::{DateTime, Local, TimeDelta, TimeZone, Utc};
use mockable::Clock;
use reelqueue::lease::domain::DaemonId;
use std::sync::{Arc, Mutex, PoisonError};

/// Clock that only moves when a test tells it to.
///
/// Clones share the same instant, so a test can hold one handle while the
/// services under test hold others.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    /// Creates a clock frozen at 2026-03-02 08:00:00 UTC.
    #[must_use]
    pub fn fixed() -> Self {
        Self {
            now: Arc::new(Mutex::new(
                Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0)
                    .single()
                    .unwrap_or_default(),
            )),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, delta: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += delta;
    }
}

impl Clock for ManualClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Builds a daemon identity, panicking on invalid test input.
#[must_use]
pub fn daemon(name: &str) -> DaemonId {
    DaemonId::new(name).unwrap_or_else(|err| panic!("invalid daemon id {name}: {err}"))
}
