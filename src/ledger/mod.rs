//! Usage and cost accounting.
//!
//! The [`CostLedger`] turns token counts reported by providers into a running
//! cost record aggregated per calendar day, and answers the "spent today" and
//! "spent this month" questions used to warn about or cap usage.
//!
//! The ledger is only ever fed successful, non-cached calls; see
//! `client::MeteredClient`.
//!
//! Author: kelexine (<https://github.com/kelexine>)

mod clock;
mod pricing;

pub use clock::{Clock, FixedClock, LocalClock};
pub use pricing::PricingTable;

use chrono::{Datelike, NaiveDate};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Token counts for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }
}

/// Aggregated usage for one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub date: NaiveDate,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost_usd: Decimal,
}

impl UsageRecord {
    fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            prompt_tokens: 0,
            completion_tokens: 0,
            cost_usd: Decimal::ZERO,
        }
    }
}

/// Daily aggregates keyed by date. This is what the host persists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CostLedgerState {
    days: BTreeMap<NaiveDate, UsageRecord>,
}

impl CostLedgerState {
    pub fn days(&self) -> impl Iterator<Item = &UsageRecord> {
        self.days.values()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Adds `delta` to the aggregate for `delta.date`.
    pub fn merge(&mut self, delta: &UsageRecord) {
        let day = self
            .days
            .entry(delta.date)
            .or_insert_with(|| UsageRecord::empty(delta.date));
        day.prompt_tokens += delta.prompt_tokens;
        day.completion_tokens += delta.completion_tokens;
        day.cost_usd += delta.cost_usd;
    }
}

/// Running cost record.
pub struct CostLedger {
    state: RwLock<CostLedgerState>,
    clock: Arc<dyn Clock>,
}

impl Default for CostLedger {
    fn default() -> Self {
        Self::new(Arc::new(LocalClock))
    }
}

impl CostLedger {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::from_state(CostLedgerState::default(), clock)
    }

    /// Resume from previously persisted state.
    pub fn from_state(state: CostLedgerState, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(state),
            clock,
        }
    }

    /// Records one completed call and returns its incremental cost.
    pub fn record(&self, usage: TokenUsage, pricing: &PricingTable) -> Decimal {
        let cost = pricing.cost(&usage);
        let delta = UsageRecord {
            date: self.clock.today(),
            prompt_tokens: u64::from(usage.prompt_tokens),
            completion_tokens: u64::from(usage.completion_tokens),
            cost_usd: cost,
        };

        self.state.write().merge(&delta);
        debug!(
            date = %delta.date,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            %cost,
            "Recorded usage"
        );
        cost
    }

    pub fn total_for_today(&self) -> Decimal {
        let today = self.clock.today();
        self.sum_where(|date| date == today)
    }

    pub fn total_for_this_month(&self) -> Decimal {
        let today = self.clock.today();
        self.sum_where(|date| date.year() == today.year() && date.month() == today.month())
    }

    fn sum_where<F>(&self, include: F) -> Decimal
    where
        F: Fn(NaiveDate) -> bool,
    {
        self.state
            .read()
            .days()
            .filter(|record| include(record.date))
            .map(|record| record.cost_usd)
            .sum()
    }

    /// Today's aggregate, if anything was recorded.
    pub fn usage_for_today(&self) -> Option<UsageRecord> {
        let today = self.clock.today();
        self.state.read().days.get(&today).cloned()
    }

    /// Drops history older than `cutoff`. Returns how many days were removed.
    pub fn prune_before(&self, cutoff: NaiveDate) -> usize {
        let mut state = self.state.write();
        let before = state.days.len();
        state.days.retain(|date, _| *date >= cutoff);
        before - state.days.len()
    }

    /// Copy of the aggregates for persistence.
    pub fn snapshot(&self) -> CostLedgerState {
        self.state.read().clone()
    }
}
