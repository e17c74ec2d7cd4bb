use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;

use crate::{
    device::GridWindow,
    plan::{PeriodAction, Plan, PlanSlot},
};

/// Latest wall-clock time the device accepts as a stop time.
pub const LAST_MINUTE: NaiveTime = NaiveTime::from_hms_opt(23, 59, 0).unwrap();

/// Grid window covering the slot and every immediately following slot with the same directive.
///
/// A run crossing local midnight is cut at 23:59, the next day is picked up by a later reconciliation.
pub fn coalesce(
    plan: &Plan,
    slot: &PlanSlot,
    timezone: Tz,
    limit: u8,
    matches: impl Fn(&PeriodAction) -> bool,
) -> GridWindow {
    let end = plan.run_end(slot, |action| action.is_some_and(&matches));
    GridWindow { is_enabled: true, start: local(slot.start, timezone), stop: stop_time(slot.start, end, timezone), limit }
}

fn local(at: DateTime<Utc>, timezone: Tz) -> NaiveTime {
    at.with_timezone(&timezone).time()
}

fn stop_time(start: DateTime<Utc>, end: DateTime<Utc>, timezone: Tz) -> NaiveTime {
    if end.with_timezone(&timezone).date_naive() > start.with_timezone(&timezone).date_naive() {
        LAST_MINUTE
    } else {
        local(end, timezone)
    }
}

/// Window to put on the device, given the live one.
///
/// While the live window is enabled and running, it is only ever widened:
/// the start moves earlier and the stop later, so an action in progress is never cut short.
/// Otherwise the wanted window replaces it, and no wanted window disables it.
pub fn reconcile(live: GridWindow, wanted: Option<GridWindow>, now: NaiveTime) -> GridWindow {
    let Some(wanted) = wanted else {
        return live.disabled();
    };
    let is_running = live.is_enabled && live.contains(now) && live.start <= live.stop;
    if is_running && wanted.start <= wanted.stop {
        GridWindow {
            is_enabled: true,
            start: live.start.min(wanted.start),
            stop: live.stop.max(wanted.stop),
            limit: wanted.limit,
        }
    } else {
        wanted
    }
}
