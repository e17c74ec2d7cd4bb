//! Selection rules shared by the strategies.

use std::cmp::Reverse;

use itertools::Itertools;

use crate::{battery::Battery, plan::PriceSlot, quantity::rate::KilowattHourRate};

/// Number of slots the battery can export at full power before hitting the reserve, plus the margin.
#[must_use]
pub fn export_budget(battery: Battery, level: i32, reserve: i32, margin: i32) -> usize {
    let n_slots = (level - reserve).max(0) / battery.drain_per_slot() + margin;
    usize::try_from(n_slots).unwrap_or_default()
}

/// The `k` slots with the highest sell price.
///
/// Equal prices are ordered earliest slot first. The result is ordered by start time.
pub fn top_k_by_sell<'a>(
    slots: impl IntoIterator<Item = &'a PriceSlot>,
    k: usize,
) -> Vec<&'a PriceSlot> {
    slots
        .into_iter()
        .sorted_by_key(|slot| (Reverse(slot.sell), slot.start))
        .take(k)
        .sorted_by_key(|slot| slot.start)
        .collect()
}

/// Slots worth charging from the grid: paid to import, or cheaper than the reference.
pub fn cheap_imports<'a>(
    slots: impl IntoIterator<Item = &'a PriceSlot>,
    reference: Option<KilowattHourRate>,
) -> impl Iterator<Item = &'a PriceSlot> {
    slots.into_iter().filter(move |slot| {
        slot.buy < KilowattHourRate::ZERO || reference.is_some_and(|reference| slot.buy < reference)
    })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::plan::SLOT_DURATION;

    fn slots(sells: &[f64]) -> Vec<PriceSlot> {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        (0..)
            .zip(sells)
            .map(|(index, sell)| PriceSlot {
                start: start + SLOT_DURATION * index,
                buy: KilowattHourRate::from(30.0 - f64::from(index)),
                sell: KilowattHourRate::from(*sell),
            })
            .collect()
    }

    #[test]
    fn test_top_k_distinct() {
        let slots = slots(&[5.0, 17.0, 3.0, 12.0, 20.0, 1.0, 8.0, 15.0, 2.0, 9.0]);
        let selected = top_k_by_sell(&slots, 3);
        let sells = selected.iter().map(|slot| slot.sell.0).collect_vec();
        assert_eq!(sells, [17.0, 20.0, 15.0]);
    }

    #[test]
    fn test_top_k_ties_earliest_first() {
        let slots = slots(&[10.0, 7.0, 10.0, 10.0]);
        let selected = top_k_by_sell(&slots, 2);
        assert_eq!(selected[0].start, slots[0].start);
        assert_eq!(selected[1].start, slots[2].start);
    }

    #[test]
    fn test_top_k_more_than_available() {
        let slots = slots(&[1.0, 2.0]);
        assert_eq!(top_k_by_sell(&slots, 5).len(), 2);
        assert!(top_k_by_sell(&slots, 0).is_empty());
    }

    #[test]
    fn test_export_budget() {
        // 19% per slot:
        let battery = Battery::new(186.0, 51.2, 3600.0);
        assert_eq!(export_budget(battery, 40, 20, 0), 1);
        assert_eq!(export_budget(battery, 100, 20, 0), 4);
        assert_eq!(export_budget(battery, 100, 20, 1), 5);
        assert_eq!(export_budget(battery, 10, 20, 0), 0);
        assert_eq!(export_budget(battery, 10, 20, -1), 0);
    }

    #[test]
    fn test_cheap_imports() {
        let mut slots = slots(&[0.0; 4]);
        slots[2].buy = KilowattHourRate::from(-2.0);
        let negative = cheap_imports(&slots, None).map(|slot| slot.start).collect_vec();
        assert_eq!(negative, [slots[2].start]);
        // Buys are 30, 29, -2, 27:
        let cheap = cheap_imports(&slots, Some(KilowattHourRate::from(29.5))).count();
        assert_eq!(cheap, 3);
    }
}
