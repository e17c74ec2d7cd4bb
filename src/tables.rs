use chrono_tz::Tz;
use comfy_table::{Attribute, Cell, CellAlignment, Color, Table, modifiers, presets};

use crate::{controller::Change, plan::Plan, quantity::rate::KilowattHourRate};

fn new_table() -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED).apply_modifier(modifiers::UTF8_ROUND_CORNERS);
    table.enforce_styling();
    table
}

#[must_use]
pub fn build_plan_table(plan: &Plan, timezone: Tz) -> Table {
    let median_buy = {
        let mut buys = plan.slots().iter().map(|slot| slot.buy).collect::<Vec<_>>();
        buys.sort_unstable();
        buys.get(buys.len() / 2).copied().unwrap_or(KilowattHourRate::ZERO)
    };

    let mut table = new_table();
    table.set_header(vec!["Date", "Start", "End", "Buy", "Sell", "Action"]);
    for slot in plan.slots() {
        let start = slot.start.with_timezone(&timezone);
        let action = slot.action_or_default();
        let action_color = if action.is_importing() {
            Color::Green
        } else if action.is_exporting() {
            Color::Red
        } else if slot.action.is_some() {
            Color::DarkYellow
        } else {
            Color::Reset
        };
        table.add_row(vec![
            Cell::new(start.format("%a %d")).add_attribute(Attribute::Dim),
            Cell::new(start.format("%H:%M")),
            Cell::new(slot.end().with_timezone(&timezone).format("%H:%M")).add_attribute(Attribute::Dim),
            Cell::new(slot.buy)
                .set_alignment(CellAlignment::Right)
                .fg(if slot.buy >= median_buy { Color::Red } else { Color::Green }),
            Cell::new(slot.sell).set_alignment(CellAlignment::Right),
            Cell::new(slot.action.map_or_else(|| "–".to_owned(), |action| action.to_string()))
                .fg(action_color),
        ]);
    }
    table
}

#[must_use]
pub fn build_changes_table(changes: &[Change]) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Setting", "From", "To", "Reason"]);
    for change in changes {
        table.add_row(vec![
            Cell::new(change.setting),
            Cell::new(&change.from).add_attribute(Attribute::Dim),
            Cell::new(&change.to).fg(Color::Green),
            Cell::new(&change.reason),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use chrono_tz::Europe::London;

    use super::*;
    use crate::plan::{PeriodAction, PlanSlot, PriceSlot};

    #[test]
    fn test_plan_table() {
        let price = PriceSlot {
            start: Utc.with_ymd_and_hms(2025, 6, 1, 15, 0, 0).unwrap(),
            buy: KilowattHourRate::from(35.0),
            sell: KilowattHourRate::from(30.0),
        };
        let plan = Plan::new([PlanSlot::with_action(price, PeriodAction::export(20))]);
        let rendered = build_plan_table(&plan, London).to_string();
        assert!(rendered.contains("16:00"));
        assert!(rendered.contains("export to 20%"));
    }

    #[test]
    fn test_changes_table() {
        let changes = [Change {
            setting: "battery charge rate",
            from: "100%".to_owned(),
            to: "0%".to_owned(),
            reason: "battery is full".to_owned(),
        }];
        let rendered = build_changes_table(&changes).to_string();
        assert!(rendered.contains("battery is full"));
    }
}
