//! Strategies turning a price forecast into a plan.

mod agile;
mod flux;
mod outgoing;
mod period;
mod runner;
pub mod select;
mod stats;

use chrono::{DateTime, Utc};

pub use self::{
    agile::Agile,
    flux::Flux,
    outgoing::Outgoing,
    period::Period,
    runner::run,
    stats::Stats,
};
use crate::{
    plan::{Plan, PriceSlot},
    prelude::*,
    settings::{Settings, StrategyKind},
    telemetry::Point,
};

#[must_use]
pub struct Input<'a> {
    /// Upcoming prices, ordered by start.
    pub prices: &'a [PriceSlot],

    /// Live state of charge.
    pub battery_level: u8,

    pub now: DateTime<Utc>,

    /// Only provided to the strategies that ask for it.
    pub history: Option<&'a History>,
}

/// What happened over the previous discharge cycle.
#[must_use]
pub struct History {
    /// Plan covering yesterday's peak.
    pub plan: Plan,

    /// State of charge samples from yesterday's peak until this morning's cheap band.
    pub battery_levels: Vec<Point>,
}

pub trait Strategy: Send + Sync {
    fn plan(&self, input: &Input<'_>) -> Result<Plan>;

    /// Whether [`Input::history`] should be gathered.
    fn needs_history(&self) -> bool {
        false
    }
}

pub fn from_settings(settings: &Settings) -> Box<dyn Strategy> {
    match settings.strategy {
        StrategyKind::Agile => Box::new(Agile::from_settings(settings)),
        StrategyKind::Outgoing => Box::new(Outgoing::from_settings(settings)),
        StrategyKind::Flux => Box::new(Flux::from_settings(settings)),
    }
}
