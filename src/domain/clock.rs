//! Time sources and the reference calendar.
//!
//! Every processor asks a [`Clock`] for "now" instead of reading wall-clock
//! time, and maps instants onto calendar days through a [`ReferenceCalendar`]
//! pinned to one fixed UTC offset.

use crate::error::{EngineError, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, Offset, TimeDelta, Utc};
use std::sync::Mutex;

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Reads the system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A manually driven clock.
///
/// Used by `packledger run --now` and by tests that need to cross maturation
/// boundaries and day rollovers deterministically.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = now;
    }

    pub fn advance(&self, by: TimeDelta) {
        let mut guard = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Maps instants to calendar days in a fixed reference timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceCalendar {
    offset: FixedOffset,
}

impl Default for ReferenceCalendar {
    fn default() -> Self {
        Self::utc()
    }
}

impl ReferenceCalendar {
    const MAX_OFFSET_MINUTES: i32 = 14 * 60;

    pub fn utc() -> Self {
        Self {
            offset: Utc.fix(),
        }
    }

    pub fn from_offset_minutes(minutes: i32) -> Result<Self> {
        if minutes.abs() > Self::MAX_OFFSET_MINUTES {
            return Err(EngineError::ValidationError(format!(
                "reference UTC offset {minutes}min is outside +-14h"
            )));
        }
        FixedOffset::east_opt(minutes * 60)
            .map(|offset| Self { offset })
            .ok_or_else(|| {
                EngineError::ValidationError(format!("invalid reference UTC offset {minutes}min"))
            })
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn day_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }
}
