use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use itertools::Itertools;

use crate::plan::{PeriodAction, Plan, PlanSlot, PriceSlot};

/// Plan under construction.
///
/// Decisions replace whole actions, a slot's action is never patched field by field.
#[must_use]
pub struct Draft {
    prices: Vec<PriceSlot>,
    actions: BTreeMap<DateTime<Utc>, PeriodAction>,
}

impl Draft {
    pub fn new(prices: &[PriceSlot]) -> Self {
        let prices = prices.iter().copied().sorted_by_key(|price| price.start).collect();
        Self { prices, actions: BTreeMap::new() }
    }

    #[must_use]
    pub fn prices(&self) -> &[PriceSlot] {
        &self.prices
    }

    #[must_use]
    pub fn action(&self, start: DateTime<Utc>) -> Option<PeriodAction> {
        self.actions.get(&start).copied()
    }

    #[must_use]
    pub fn is_free(&self, start: DateTime<Utc>) -> bool {
        !self.actions.contains_key(&start)
    }

    pub fn assign(&mut self, start: DateTime<Utc>, action: PeriodAction) {
        self.actions.insert(start, action);
    }

    pub fn finish(self) -> Plan {
        let Self { prices, mut actions } = self;
        Plan::new(prices.into_iter().map(|price| match actions.remove(&price.start) {
            Some(action) => PlanSlot::with_action(price, action),
            None => PlanSlot::idle(price),
        }))
    }
}
