use chrono_tz::Tz;
use itertools::Itertools;

use crate::{
    battery::Battery,
    plan::{Draft, PeriodAction, Plan},
    planner::{
        Input,
        Period,
        Stats,
        Strategy,
        select::{cheap_imports, export_budget, top_k_by_sell},
    },
    prelude::*,
    quantity::rate::KilowattHourRate,
    settings::Settings,
};

/// Half-hourly import and export prices.
///
/// Charges overnight when the grid is cheaper than the next morning's best export,
/// and sells the battery down to the reserve in the best-paid slots.
pub struct Agile {
    timezone: Tz,
    battery: Battery,
    reserve: u8,
    import_ceiling: u8,
    import_margin: KilowattHourRate,
    export_margin: i32,
    discharge_rate: u8,
}

impl Agile {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            timezone: settings.timezone,
            battery: settings.battery.battery(),
            reserve: settings.battery.reserve,
            import_ceiling: settings.battery.import_ceiling,
            import_margin: settings.planner.import_margin,
            export_margin: settings.planner.export_margin,
            discharge_rate: settings.battery.default_discharge_rate,
        }
    }
}

impl Strategy for Agile {
    #[instrument(skip_all, fields(n_prices = input.prices.len(), battery_level = input.battery_level))]
    fn plan(&self, input: &Input<'_>) -> Result<Plan> {
        let mut draft = Draft::new(input.prices);
        let import = PeriodAction::import(self.import_ceiling);

        let days = input
            .prices
            .iter()
            .into_group_map_by(|slot| slot.start.with_timezone(&self.timezone).date_naive());
        for (date, slots) in days {
            let morning = Stats::of(
                slots.iter().copied().filter(|slot| Period::of(slot.start, self.timezone) == Period::Morning),
            );
            let reference = morning.map(|morning| morning.max_sell - self.import_margin);
            debug!(%date, ?reference, "import reference");
            let overnight =
                slots.iter().copied().filter(|slot| Period::of(slot.start, self.timezone) == Period::Overnight);
            for slot in cheap_imports(overnight, reference) {
                draft.assign(slot.start, import);
            }
        }
        for slot in cheap_imports(input.prices, None) {
            draft.assign(slot.start, import);
        }

        let budget = export_budget(
            self.battery,
            i32::from(input.battery_level),
            i32::from(self.reserve),
            self.export_margin,
        );
        let candidates = input
            .prices
            .iter()
            .filter(|slot| draft.is_free(slot.start) && slot.sell > KilowattHourRate::ZERO);
        let exports = top_k_by_sell(candidates, budget).into_iter().map(|slot| slot.start).collect_vec();
        let export = PeriodAction::builder()
            .discharge_to_grid_limit(self.reserve)
            .battery_discharge_rate(self.discharge_rate)
            .build();
        for start in &exports {
            draft.assign(*start, export);
        }

        let plan = draft.finish();
        info!(budget, n_exports = exports.len(), "planned");
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};

    use super::*;
    use crate::plan::{PriceSlot, SLOT_DURATION};

    /// Midnight BST.
    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 31, 23, 0, 0).unwrap()
    }

    fn prices(buys: &[f64], sells: &[f64]) -> Vec<PriceSlot> {
        (0..)
            .zip(buys.iter().zip(sells))
            .map(|(index, (buy, sell))| PriceSlot {
                start: start() + SLOT_DURATION * index,
                buy: KilowattHourRate::from(*buy),
                sell: KilowattHourRate::from(*sell),
            })
            .collect()
    }

    fn plan(prices: &[PriceSlot], battery_level: u8) -> Plan {
        let input = Input { prices, battery_level, now: start(), history: None };
        Agile::from_settings(&Settings::default()).plan(&input).unwrap()
    }

    #[test]
    fn test_negative_price_imports() {
        let mut buys = [30.0; 10];
        buys[7] = -2.0;
        let prices = prices(&buys, &[5.0; 10]);
        let plan = plan(&prices, 20);
        let action = plan.slots()[7].action.unwrap();
        assert!(action.charge_from_grid_limit > 0);
        assert!(plan.slots().iter().enumerate().all(|(index, slot)| index == 7
            || !slot.action.is_some_and(|action| action.is_importing())));
    }

    #[test]
    fn test_single_export_at_best_price() {
        let sells = [5.0, 17.0, 3.0, 12.0, 20.0, 1.0, 8.0, 15.0, 2.0, 9.0];
        let prices = prices(&[40.0; 10], &sells);
        // (40 - 20) / 19 = 1 slot:
        let plan = plan(&prices, 40);
        let exporting = plan
            .slots()
            .iter()
            .filter(|slot| slot.action.is_some_and(|action| action.is_exporting()))
            .collect_vec();
        assert_eq!(exporting.len(), 1);
        assert_eq!(exporting[0].sell, KilowattHourRate::from(20.0));
        assert_eq!(exporting[0].action.unwrap().discharge_to_grid_limit, 20);
    }

    #[test]
    fn test_overnight_import_below_morning_export() {
        // 00:00–06:00 overnight, 06:00–10:00 morning (local):
        let mut buys = vec![30.0; 20];
        let mut sells = vec![1.0; 20];
        buys[4] = 10.0;
        buys[5] = 19.0;
        sells[14] = 20.0;
        let prices = prices(&buys, &sells);
        let plan = plan(&prices, 20);
        assert!(plan.slots()[4].action.is_some_and(|action| action.is_importing()));
        // Not cheaper than 20p minus the 2p margin:
        assert!(!plan.slots()[5].action.is_some_and(|action| action.is_importing()));
    }

    #[test]
    fn test_no_export_below_reserve() {
        let prices = prices(&[40.0; 10], &[10.0; 10]);
        let plan = plan(&prices, 15);
        assert!(plan.slots().iter().all(|slot| slot.action.is_none()));
    }
}
