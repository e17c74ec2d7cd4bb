//! Half-hour plan data model.

mod action;
mod draft;
mod slot;

use std::fmt::{Debug, Formatter};

use chrono::{DateTime, TimeDelta, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

pub use self::{
    action::PeriodAction,
    draft::Draft,
    slot::{PlanSlot, PriceSlot, SLOT_DURATION},
};
use crate::ops::Interval;

/// Battery actions for a contiguous run of half-hour slots.
///
/// Slots are kept ordered by start time and unique by start time.
#[must_use]
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    slots: Vec<PlanSlot>,
}

impl Debug for Plan {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.interval() {
            Some(interval) => write!(f, "Plan({interval:?}, {} slots)", self.slots.len()),
            None => write!(f, "Plan(empty)"),
        }
    }
}

impl Plan {
    /// Build the plan from slots in any order.
    ///
    /// Duplicate starts keep the last occurrence.
    pub fn new(slots: impl IntoIterator<Item = PlanSlot>) -> Self {
        let mut slots = slots.into_iter().collect_vec();
        slots.reverse();
        slots.sort_by_key(|slot| slot.start);
        slots.dedup_by_key(|slot| slot.start);
        Self { slots }
    }

    #[must_use]
    pub fn slots(&self) -> &[PlanSlot] {
        &self.slots
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Time span from the first slot start until the last slot end.
    #[must_use]
    pub fn interval(&self) -> Option<Interval> {
        let first = self.slots.first()?;
        let last = self.slots.last()?;
        Some(Interval::from_std(first.start..last.end()))
    }

    #[must_use]
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        self.interval().is_some_and(|interval| interval.contains(at))
    }

    /// Slot with the greatest start before the given time.
    #[must_use]
    pub fn current(&self, now: DateTime<Utc>) -> Option<&PlanSlot> {
        let index = self.slots.partition_point(|slot| slot.start < now);
        index.checked_sub(1).map(|index| &self.slots[index])
    }

    /// Slot right before the current one.
    #[must_use]
    pub fn previous(&self, now: DateTime<Utc>) -> Option<&PlanSlot> {
        self.get_previous(self.current(now)?)
    }

    /// Slot with the smallest start at or after the given time.
    #[must_use]
    pub fn next(&self, now: DateTime<Utc>) -> Option<&PlanSlot> {
        self.slots.get(self.slots.partition_point(|slot| slot.start < now))
    }

    #[must_use]
    pub fn get_previous(&self, slot: &PlanSlot) -> Option<&PlanSlot> {
        let index = self.slots.partition_point(|other| other.start < slot.start);
        index.checked_sub(1).map(|index| &self.slots[index])
    }

    #[must_use]
    pub fn get_next(&self, slot: &PlanSlot) -> Option<&PlanSlot> {
        self.slots.get(self.slots.partition_point(|other| other.start <= slot.start))
    }

    /// Slots starting within the interval.
    pub fn within(&self, interval: Interval) -> impl Iterator<Item = &PlanSlot> {
        self.slots.iter().filter(move |slot| interval.contains(slot.start))
    }

    /// Extend the slot forward over the immediately following slots that match the predicate.
    ///
    /// Returns the end of the run: the end of the last matching contiguous slot.
    #[must_use]
    pub fn run_end(
        &self,
        slot: &PlanSlot,
        mut matches: impl FnMut(Option<&PeriodAction>) -> bool,
    ) -> DateTime<Utc> {
        let mut last = slot;
        while let Some(next) = self.get_next(last) {
            if next.start != last.end() || !matches(next.action.as_ref()) {
                break;
            }
            last = next;
        }
        last.end()
    }

    /// Move every slot by the same offset.
    pub fn shifted(self, offset: TimeDelta) -> Self {
        Self {
            slots: self
                .slots
                .into_iter()
                .map(|slot| PlanSlot { start: slot.start + offset, ..slot })
                .collect(),
        }
    }
}
