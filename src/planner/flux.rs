use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use itertools::Itertools;

use crate::{
    plan::{Draft, PeriodAction, Plan},
    planner::{History, Input, Strategy, period::in_hours},
    prelude::*,
    settings::{FluxSettings, Settings},
    telemetry::{Point, minimum},
};

/// Three fixed bands: cheap overnight, peak in the early evening, flat otherwise.
///
/// The export floor for the peak is corrected every day by how low the battery got after yesterday's peak.
pub struct Flux {
    timezone: Tz,
    import_ceiling: u8,
    settings: FluxSettings,
}

impl Flux {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            timezone: settings.timezone,
            import_ceiling: settings.battery.import_ceiling,
            settings: settings.flux,
        }
    }

    /// Export floor for the upcoming peaks.
    #[instrument(skip_all)]
    fn export_floor(&self, now: DateTime<Utc>, history: Option<&History>) -> Result<u8> {
        let settings = &self.settings;
        let Some(history) = history else {
            info!(floor = settings.default_floor, "no history, using the default floor");
            return Ok(settings.default_floor);
        };

        let yesterday = now
            .with_timezone(&self.timezone)
            .date_naive()
            .pred_opt()
            .context("there is no yesterday")?;
        let peak = history
            .plan
            .slots()
            .iter()
            .filter(|slot| {
                slot.start.with_timezone(&self.timezone).date_naive() == yesterday
                    && in_hours(slot.start, self.timezone, settings.peak_hours)
            })
            .collect_vec();
        let (Some(first), Some(last)) = (peak.first(), peak.last()) else {
            warn!(floor = settings.default_floor, "yesterday's plan has no peak, using the default floor");
            return Ok(settings.default_floor);
        };
        let mut floor = None;
        for slot in &peak {
            let action = slot
                .action
                .with_context(|| format!("yesterday's peak slot at {} has no action", slot.start))?;
            ensure!(action.is_exporting(), "yesterday's peak slot at {} did not export", slot.start);
            floor.get_or_insert(action.discharge_to_grid_limit);
        }
        let yesterday_floor = i32::from(floor.context("yesterday's peak is empty")?);

        #[expect(clippy::cast_possible_truncation)]
        let Some(lowest) = minimum(&history.battery_levels).map(|level| level.round() as i32) else {
            warn!(yesterday_floor, "no battery history, keeping yesterday's floor");
            return Ok(u8::try_from(yesterday_floor)?);
        };
        let level_before = level_at(&history.battery_levels, first.start);
        let level_after = level_at(&history.battery_levels, last.end());
        let achieved = level_before.zip(level_after).map(|(before, after)| before - after);
        let planned = level_before.map(|before| before - yesterday_floor);
        let reached_floor = achieved
            .zip(planned)
            .is_some_and(|(achieved, planned)| achieved + i32::from(settings.step) >= planned);

        let safety_floor = i32::from(settings.safety_floor);
        let floor = if lowest < safety_floor {
            let overshoot = safety_floor - lowest;
            info!(lowest, overshoot, "the battery went below the safety floor, exporting less");
            yesterday_floor + overshoot
        } else if lowest >= safety_floor + i32::from(settings.comfort_margin) && reached_floor {
            info!(lowest, "the battery stayed comfortably above the safety floor, exporting more");
            yesterday_floor - i32::from(settings.step)
        } else {
            yesterday_floor
        };
        let floor = floor.clamp(i32::from(settings.min_floor), i32::from(settings.max_floor));
        info!(yesterday_floor, ?planned, ?achieved, lowest, floor, "corrected the export floor");
        Ok(u8::try_from(floor)?)
    }
}

/// Last known value at or before the instant.
#[expect(clippy::cast_possible_truncation)]
fn level_at(points: &[Point], at: DateTime<Utc>) -> Option<i32> {
    points
        .iter()
        .filter(|point| point.at <= at)
        .max_by_key(|point| point.at)
        .map(|point| point.value.round() as i32)
}

impl Strategy for Flux {
    #[instrument(skip_all, fields(n_prices = input.prices.len()))]
    fn plan(&self, input: &Input<'_>) -> Result<Plan> {
        let floor = self.export_floor(input.now, input.history)?;
        let mut draft = Draft::new(input.prices);
        let mut n_imports = 0;
        let mut n_exports = 0;
        for slot in input.prices {
            if in_hours(slot.start, self.timezone, self.settings.low_hours) {
                draft.assign(slot.start, PeriodAction::import(self.import_ceiling));
                n_imports += 1;
            } else if in_hours(slot.start, self.timezone, self.settings.peak_hours) {
                draft.assign(slot.start, PeriodAction::export(floor));
                n_exports += 1;
            }
        }
        info!(floor, n_imports, n_exports, "planned");
        Ok(draft.finish())
    }

    fn needs_history(&self) -> bool {
        true
    }
}
