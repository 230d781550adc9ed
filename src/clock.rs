#[cfg(test)]
use std::sync::Mutex;

use chrono::{DateTime, Local, NaiveDate, Utc};
#[cfg(test)]
use chrono::{NaiveTime, TimeZone};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Calendar day used for rollover checks.
    fn today(&self) -> NaiveDate;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Real wall-clock time pinned to a chosen calendar day (`--today`).
#[derive(Clone, Copy, Debug)]
pub struct FixedClock {
    day: NaiveDate,
}

impl FixedClock {
    pub fn new(day: NaiveDate) -> Self {
        Self { day }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        self.day
    }
}

#[cfg(test)]
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

#[cfg(test)]
impl ManualClock {
    pub fn at_day(day: NaiveDate) -> Self {
        let start = Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN));
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance_ms(&self, ms: i64) {
        if let Ok(mut now) = self.now.lock() {
            *now += chrono::Duration::milliseconds(ms);
        }
    }

    pub fn set_day(&self, day: NaiveDate) {
        if let Ok(mut now) = self.now.lock() {
            *now = Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN));
        }
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}
