use chrono_tz::Tz;
use itertools::Itertools;

use crate::{
    battery::Battery,
    plan::{Draft, PeriodAction, Plan},
    planner::{
        Input,
        Strategy,
        period::in_hours,
        select::{cheap_imports, export_budget, top_k_by_sell},
    },
    prelude::*,
    quantity::rate::KilowattHourRate,
    settings::Settings,
};

/// Local hours in which the evening export is considered.
const EXPORT_HOURS: (u32, u32) = (16, 22);

/// Fixed import price with half-hourly export prices.
///
/// Imports only when paid to, and exports in the best evening slots that beat the import price by the spread.
pub struct Outgoing {
    timezone: Tz,
    battery: Battery,
    reserve: u8,
    import_ceiling: u8,
    export_margin: i32,
    export_spread: KilowattHourRate,
    discharge_rate: u8,
}

impl Outgoing {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            timezone: settings.timezone,
            battery: settings.battery.battery(),
            reserve: settings.battery.reserve,
            import_ceiling: settings.battery.import_ceiling,
            export_margin: settings.planner.export_margin,
            export_spread: settings.planner.export_spread,
            discharge_rate: settings.battery.default_discharge_rate,
        }
    }
}

impl Strategy for Outgoing {
    #[instrument(skip_all, fields(n_prices = input.prices.len(), battery_level = input.battery_level))]
    fn plan(&self, input: &Input<'_>) -> Result<Plan> {
        let mut draft = Draft::new(input.prices);
        for slot in cheap_imports(input.prices, None) {
            draft.assign(slot.start, PeriodAction::import(self.import_ceiling));
        }

        let budget = export_budget(
            self.battery,
            i32::from(input.battery_level),
            i32::from(self.reserve),
            self.export_margin,
        );
        let candidates = input.prices.iter().filter(|slot| {
            draft.is_free(slot.start)
                && in_hours(slot.start, self.timezone, EXPORT_HOURS)
                && slot.sell > slot.buy + self.export_spread
        });
        let exports = top_k_by_sell(candidates, budget).into_iter().map(|slot| slot.start).collect_vec();
        let export = PeriodAction::builder()
            .discharge_to_grid_limit(self.reserve)
            .battery_discharge_rate(self.discharge_rate)
            .build();
        for start in &exports {
            draft.assign(*start, export);
        }

        info!(budget, n_exports = exports.len(), "planned");
        Ok(draft.finish())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};

    use super::*;
    use crate::plan::{PriceSlot, SLOT_DURATION};

    /// 15:00 BST.
    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 14, 0, 0).unwrap()
    }

    fn prices(sells: &[f64]) -> Vec<PriceSlot> {
        (0..)
            .zip(sells)
            .map(|(index, sell)| PriceSlot {
                start: start() + SLOT_DURATION * index,
                buy: KilowattHourRate::from(24.0),
                sell: KilowattHourRate::from(*sell),
            })
            .collect()
    }

    #[test]
    fn test_exports_only_in_evening_above_spread() {
        // 15:00, 15:30, 16:00, 16:30, 17:00, 17:30:
        let prices = prices(&[50.0, 50.0, 28.0, 35.0, 40.0, 32.0]);
        let input = Input { prices: &prices, battery_level: 100, now: start(), history: None };
        let plan = Outgoing::from_settings(&Settings::default()).plan(&input).unwrap();
        let exporting = plan
            .slots()
            .iter()
            .filter(|slot| slot.action.is_some_and(|action| action.is_exporting()))
            .map(|slot| slot.sell.0)
            .collect_vec();
        assert_eq!(exporting, [35.0, 40.0, 32.0]);
    }
}
