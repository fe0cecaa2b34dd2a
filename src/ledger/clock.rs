// Calendar clock used by the ledger
// Author: kelexine (https://github.com/kelexine)

use chrono::{Local, NaiveDate};
use parking_lot::Mutex;

/// Source of "today". Queried on every ledger operation, never cached, so a
/// session that crosses midnight or a month boundary aggregates correctly.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// The local calendar day of the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// A manually driven clock.
#[derive(Debug)]
pub struct FixedClock(Mutex<NaiveDate>);

impl FixedClock {
    pub fn new(today: NaiveDate) -> Self {
        Self(Mutex::new(today))
    }

    pub fn set(&self, today: NaiveDate) {
        *self.0.lock() = today;
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        *self.0.lock()
    }
}
