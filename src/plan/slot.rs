use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::{plan::PeriodAction, quantity::rate::KilowattHourRate};

pub const SLOT_DURATION: TimeDelta = TimeDelta::minutes(30);

/// Import and export prices for `[start, start + 30 min)`.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceSlot {
    pub start: DateTime<Utc>,

    #[serde(rename = "buyPrice")]
    pub buy: KilowattHourRate,

    #[serde(rename = "sellPrice")]
    pub sell: KilowattHourRate,
}

impl PriceSlot {
    #[must_use]
    pub fn end(&self) -> DateTime<Utc> {
        self.start + SLOT_DURATION
    }
}

/// Price slot with an optional battery directive.
///
/// No action means the device is left at its default behaviour.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanSlot {
    pub start: DateTime<Utc>,

    #[serde(rename = "buyPrice")]
    pub buy: KilowattHourRate,

    #[serde(rename = "sellPrice")]
    pub sell: KilowattHourRate,

    #[serde(default)]
    pub action: Option<PeriodAction>,
}

impl PlanSlot {
    pub const fn idle(price: PriceSlot) -> Self {
        Self { start: price.start, buy: price.buy, sell: price.sell, action: None }
    }

    pub const fn with_action(price: PriceSlot, action: PeriodAction) -> Self {
        Self { start: price.start, buy: price.buy, sell: price.sell, action: Some(action) }
    }

    #[must_use]
    pub fn end(&self) -> DateTime<Utc> {
        self.start + SLOT_DURATION
    }

    pub const fn price(&self) -> PriceSlot {
        PriceSlot { start: self.start, buy: self.buy, sell: self.sell }
    }

    /// Effective action: the default action is inert.
    pub fn action_or_default(&self) -> PeriodAction {
        self.action.unwrap_or_default()
    }
}
