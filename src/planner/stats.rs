use itertools::Itertools;

use crate::{plan::PriceSlot, quantity::rate::KilowattHourRate};

/// Price summary of a group of slots.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Stats {
    pub n_slots: usize,
    pub min_buy: KilowattHourRate,
    pub max_buy: KilowattHourRate,
    pub median_buy: KilowattHourRate,
    pub min_sell: KilowattHourRate,
    pub max_sell: KilowattHourRate,
    pub median_sell: KilowattHourRate,
}

impl Stats {
    /// [`None`] for no slots.
    pub fn of<'a>(slots: impl IntoIterator<Item = &'a PriceSlot>) -> Option<Self> {
        let slots = slots.into_iter().collect_vec();
        let buys = slots.iter().map(|slot| slot.buy).collect_vec();
        let sells = slots.iter().map(|slot| slot.sell).collect_vec();
        Some(Self {
            n_slots: slots.len(),
            min_buy: buys.iter().copied().min()?,
            max_buy: buys.iter().copied().max()?,
            median_buy: median(buys)?,
            min_sell: sells.iter().copied().min()?,
            max_sell: sells.iter().copied().max()?,
            median_sell: median(sells)?,
        })
    }
}

fn median(mut values: Vec<KilowattHourRate>) -> Option<KilowattHourRate> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable_by(Ord::cmp);
    let index = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[index])
    } else {
        Some((values[index - 1] + values[index]) / 2.0)
    }
}
