use chrono::{DateTime, DurationRound, NaiveTime, TimeDelta, Utc};

use crate::{
    notify::notify,
    ops::Interval,
    plan::{Plan, SLOT_DURATION},
    planner::{History, Input, Strategy},
    prelude::*,
    services::Services,
    tables::build_plan_table,
    telemetry::{Series, local_time},
};

/// Local time at which the planning horizon ends on the next day.
const HORIZON_END: NaiveTime = NaiveTime::from_hms_opt(23, 0, 0).unwrap();

/// Fetch the prices, run the strategy, then save and announce the plan.
///
/// A scouting run only prints the plan.
#[instrument(skip_all, fields(is_scout = is_scout))]
pub async fn run(services: &Services, strategy: &dyn Strategy, is_scout: bool) -> Result<Plan> {
    let settings = &services.settings;
    let now = services.clock.now();
    let horizon = horizon(now, settings.timezone)?;
    info!(?horizon, strategy = %settings.strategy, "planning…");

    let prices = services
        .telemetry
        .get_prices(horizon, &settings.tariffs.import, &settings.tariffs.export)
        .await
        .context("failed to fetch the prices")?;
    ensure!(!prices.is_empty(), "no prices published for {horizon:?}");
    let battery_level = services.telemetry.get_battery_level(None).await?;
    let history = if strategy.needs_history() { gather_history(services, now).await } else { None };

    let input = Input { prices: &prices, battery_level, now, history: history.as_ref() };
    let plan = strategy.plan(&input)?;
    ensure!(!plan.is_empty(), "the strategy produced an empty plan");
    let table = build_plan_table(&plan, settings.timezone);
    println!("{table}");

    if is_scout {
        info!("scouting, not saving the plan");
    } else {
        services.store.save(&plan)?;
        notify(services.notifier.as_ref(), "New battery plan", &table.to_string()).await;
    }
    Ok(plan)
}

/// From the current slot until 23:00 tomorrow, local time.
fn horizon(now: DateTime<Utc>, timezone: chrono_tz::Tz) -> Result<Interval> {
    let start = now.duration_trunc(SLOT_DURATION)?;
    let tomorrow = now
        .with_timezone(&timezone)
        .date_naive()
        .succ_opt()
        .context("there is no tomorrow")?;
    Ok(Interval::from_std(start..local_time(tomorrow, HORIZON_END, timezone)))
}

/// Yesterday's plan and the battery levels since its peak, or nothing if unavailable.
#[instrument(skip_all)]
async fn gather_history(services: &Services, now: DateTime<Utc>) -> Option<History> {
    let settings = &services.settings;
    let today = now.with_timezone(&settings.timezone).date_naive();
    let yesterday = today.pred_opt()?;
    let (peak_start, _) = settings.flux.peak_hours;
    let (low_start, _) = settings.flux.low_hours;
    let since = local_time(yesterday, NaiveTime::from_hms_opt(peak_start, 0, 0)?, settings.timezone);
    let until = local_time(today, NaiveTime::from_hms_opt(low_start, 0, 0)?, settings.timezone).min(now);

    let plan = match services.store.load(since) {
        Ok(Some(plan)) => plan,
        Ok(None) => {
            warn!(%since, "no plan covers yesterday's peak");
            return None;
        }
        Err(error) => {
            warn!("failed to load yesterday's plan: {error:#}");
            return None;
        }
    };
    let battery_levels = services
        .telemetry
        .get_series(Series::BatteryLevel, Interval::from_std(since..(until.max(since + TimeDelta::minutes(1)))))
        .await
        .inspect_err(|error| warn!("failed to fetch the battery history: {error:#}"))
        .unwrap_or_default();
    Some(History { plan, battery_levels })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use chrono_tz::Europe::London;

    use super::*;
    use crate::{
        planner::Agile,
        plan::PriceSlot,
        quantity::rate::KilowattHourRate,
        testing::{FakeDevice, Harness},
    };

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 15, 47, 0).unwrap()
    }

    fn harness() -> Harness {
        let harness = Harness::new(FakeDevice::default());
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 15, 30, 0).unwrap();
        harness.telemetry.set_prices(
            (0..80)
                .map(|index| PriceSlot {
                    start: start + SLOT_DURATION * index,
                    buy: KilowattHourRate::from(if index == 20 { -2.0 } else { 25.0 }),
                    sell: KilowattHourRate::from(f64::from(index % 7)),
                })
                .collect(),
        );
        harness.telemetry.set_battery_level(None, 80);
        harness
    }

    #[test]
    fn test_horizon() -> Result {
        let horizon = horizon(now(), London)?;
        assert_eq!(horizon.start, Utc.with_ymd_and_hms(2025, 6, 1, 15, 30, 0).unwrap());
        assert_eq!(horizon.end, Utc.with_ymd_and_hms(2025, 6, 2, 22, 0, 0).unwrap());
        Ok(())
    }

    #[tokio::test]
    async fn test_run_saves_and_notifies() -> Result {
        let harness = harness();
        let services = harness.services(now());
        let strategy = Agile::from_settings(&services.settings);
        let plan = run(&services, &strategy, false).await?;

        // Prices past 23:00 tomorrow are left out:
        assert_eq!(plan.slots().len(), 61);
        assert!(plan.slots()[20].action.is_some_and(|action| action.is_importing()));
        assert_eq!(harness.store.n_plans(), 1);
        assert_eq!(harness.notifier.messages().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_scout_does_not_save() -> Result {
        let harness = harness();
        let services = harness.services(now());
        let strategy = Agile::from_settings(&services.settings);
        run(&services, &strategy, true).await?;
        assert_eq!(harness.store.n_plans(), 0);
        assert!(harness.notifier.messages().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_no_prices_fails() {
        let harness = Harness::new(FakeDevice::default());
        harness.telemetry.set_battery_level(None, 80);
        let services = harness.services(now());
        let strategy = Agile::from_settings(&services.settings);
        assert!(run(&services, &strategy, false).await.is_err());
    }
}
