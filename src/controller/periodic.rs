use crate::{
    controller::{Change, report, window},
    device::{DeviceSettings, GridWindow, read_settings},
    plan::{PeriodAction, Plan, PlanSlot},
    prelude::*,
    services::Services,
    store::load_with_fallback,
};

/// Bring the device in line with the plan's current slot.
///
/// Does nothing when no plan or slot covers now, or when the device is offline.
#[instrument(skip_all)]
pub async fn reconcile(services: &Services) -> Result<Vec<Change>> {
    let now = services.clock.now();
    let Some(loaded) = load_with_fallback(services.store.as_ref(), now)? else {
        error!(%now, "no plan covers now, leaving the device as is");
        return Ok(Vec::new());
    };
    let plan = &loaded.plan;
    let Some(slot) = plan.current(now) else {
        error!(%now, ?plan, "the plan has no current slot, leaving the device as is");
        return Ok(Vec::new());
    };
    let Some(live) =
        read_settings(services.device.as_ref(), services.backoff, &services.cancellation).await?
    else {
        return Ok(Vec::new());
    };
    info!(start = %slot.start, action = %slot.action_or_default(), "reconciling…");

    let changes = Reconciliation { services, plan, slot, live }.run().await?;
    report(services, "Battery settings reconciled", &changes, loaded.is_fallback).await;
    Ok(changes)
}

struct Reconciliation<'a> {
    services: &'a Services,
    plan: &'a Plan,
    slot: &'a PlanSlot,
    live: DeviceSettings,
}

impl Reconciliation<'_> {
    async fn run(self) -> Result<Vec<Change>> {
        let mut changes = Vec::new();
        let action = self.slot.action_or_default();
        let settings = &self.services.settings;
        let device = self.services.device.as_ref();
        let local_now = self.services.clock.now().with_timezone(&settings.timezone).time();

        let wanted = action.is_importing().then(|| {
            let limit = action.charge_from_grid_limit;
            window::coalesce(self.plan, self.slot, settings.timezone, limit, |other| {
                other.is_importing() && other.charge_from_grid_limit == limit
            })
        });
        let charge_from_grid = window::reconcile(self.live.charge_from_grid, wanted, local_now);
        if charge_from_grid != self.live.charge_from_grid {
            device.set_charge_from_grid(charge_from_grid).await?;
            changes.push(window_change(
                "charge from grid",
                self.live.charge_from_grid,
                charge_from_grid,
                if wanted.is_some() { "the plan imports" } else { "the plan does not import" },
            ));
        }

        let wanted = action.is_exporting().then(|| {
            let limit = action.discharge_to_grid_limit;
            window::coalesce(self.plan, self.slot, settings.timezone, limit, |other| {
                other.is_exporting() && other.discharge_to_grid_limit == limit
            })
        });
        let discharge_to_grid = window::reconcile(self.live.discharge_to_grid, wanted, local_now);
        if discharge_to_grid != self.live.discharge_to_grid {
            device.set_discharge_to_grid(discharge_to_grid).await?;
            changes.push(window_change(
                "discharge to grid",
                self.live.discharge_to_grid,
                discharge_to_grid,
                if wanted.is_some() { "the plan exports" } else { "the plan does not export" },
            ));
        }

        if let Some((rate, reason)) = self.wanted_charge_rate(action).await
            && rate != self.live.battery_charge_rate
        {
            device.set_battery_charge_rate(rate).await?;
            changes.push(rate_change("battery charge rate", self.live.battery_charge_rate, rate, reason));
        }

        let (rate, reason) = match action.battery_discharge_rate {
            Some(rate) => (rate, "the plan sets the rate"),
            None => (settings.battery.default_discharge_rate, "default rate"),
        };
        if rate != self.live.battery_discharge_rate {
            device.set_battery_discharge_rate(rate).await?;
            changes.push(rate_change("battery discharge rate", self.live.battery_discharge_rate, rate, reason));
        }

        Ok(changes)
    }

    /// Decide the charge rate, [`None`] to leave it as is.
    async fn wanted_charge_rate(&self, action: PeriodAction) -> Option<(u8, &'static str)> {
        let battery = &self.services.settings.battery;
        if action.is_importing() {
            return Some((battery.grid_charge_rate, "charging from grid"));
        }
        if let Some(rate) = action.battery_charge_rate {
            return Some((rate, "the plan sets the rate"));
        }
        let level = match self.services.telemetry.get_battery_level(None).await {
            Ok(level) => level,
            Err(error) => {
                warn!("failed to query the battery level, leaving the charge rate: {error:#}");
                return None;
            }
        };
        if level >= battery.full {
            Some((0, "battery is full"))
        } else if self.live.battery_charge_rate == 0 && level < battery.restore_below {
            Some((battery.default_charge_rate, "battery has space again"))
        } else {
            debug!(level, "battery has space");
            None
        }
    }
}

fn window_change(setting: &'static str, from: GridWindow, to: GridWindow, reason: &str) -> Change {
    Change { setting, from: from.to_string(), to: to.to_string(), reason: reason.to_owned() }
}

fn rate_change(setting: &'static str, from: u8, to: u8, reason: &str) -> Change {
    Change { setting, from: format!("{from}%"), to: format!("{to}%"), reason: reason.to_owned() }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, NaiveTime, TimeDelta, TimeZone, Utc};

    use super::*;
    use crate::{
        plan::{PriceSlot, SLOT_DURATION},
        quantity::rate::KilowattHourRate,
        store::PlanStore,
        testing::{FakeDevice, Harness},
    };

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, day, hour, minute, 0).unwrap()
    }

    fn time(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    /// 09:00–13:00 UTC, with the actions given per slot.
    fn plan(actions: &[Option<PeriodAction>]) -> Plan {
        let start = at(1, 9, 0);
        Plan::new((0..).zip(actions).map(|(index, action)| {
            let price = PriceSlot {
                start: start + SLOT_DURATION * index,
                buy: KilowattHourRate::from(5.0),
                sell: KilowattHourRate::from(1.0),
            };
            match action {
                Some(action) => PlanSlot::with_action(price, *action),
                None => PlanSlot::idle(price),
            }
        }))
    }

    fn importing_plan() -> Plan {
        let import = Some(PeriodAction::import(100));
        // 10:00–11:30 BST import:
        plan(&[import, import, import, None, None, None, None, None])
    }

    #[tokio::test]
    async fn test_imports_then_idempotent() -> Result {
        let harness = Harness::new(FakeDevice::default());
        harness.store.save(&importing_plan())?;
        harness.telemetry.set_battery_level(None, 50);
        let services = harness.services(at(1, 9, 10));

        let changes = reconcile(&services).await?;
        assert_eq!(changes.len(), 2, "{changes:?}");
        let settings = harness.device.settings();
        assert!(settings.charge_from_grid.is_enabled);
        assert_eq!(settings.charge_from_grid.start, time(10, 0));
        assert_eq!(settings.charge_from_grid.stop, time(11, 30));
        assert_eq!(settings.battery_charge_rate, 95);
        assert_eq!(harness.notifier.messages().len(), 1);

        let n_writes = harness.device.writes().len();
        let changes = reconcile(&services).await?;
        assert!(changes.is_empty(), "{changes:?}");
        assert_eq!(harness.device.writes().len(), n_writes);
        assert_eq!(harness.notifier.messages().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_widens_running_window() -> Result {
        let live = GridWindow { is_enabled: true, start: time(10, 0), stop: time(10, 45), limit: 100 };
        let harness = Harness::new(FakeDevice::with_charge_from_grid(live));
        // 10:30–12:00 BST import:
        let import = Some(PeriodAction::import(100));
        harness.store.save(&plan(&[None, import, import, import, None]))?;
        harness.telemetry.set_battery_level(None, 50);

        reconcile(&harness.services(at(1, 9, 40))).await?;
        let window = harness.device.settings().charge_from_grid;
        assert_eq!((window.start, window.stop), (time(10, 0), time(12, 0)));
        Ok(())
    }

    #[tokio::test]
    async fn test_keeps_wider_running_window() -> Result {
        let live = GridWindow { is_enabled: true, start: time(9, 0), stop: time(12, 0), limit: 100 };
        let harness = Harness::new(FakeDevice::with_charge_from_grid(live));
        harness.store.save(&importing_plan())?;
        harness.telemetry.set_battery_level(None, 50);

        reconcile(&harness.services(at(1, 9, 10))).await?;
        assert_eq!(harness.device.settings().charge_from_grid, live);
        Ok(())
    }

    #[tokio::test]
    async fn test_disables_import_when_storing() -> Result {
        let live = GridWindow { is_enabled: true, start: time(2, 0), stop: time(5, 0), limit: 100 };
        let harness = Harness::new(FakeDevice::with_charge_from_grid(live));
        harness.store.save(&plan(&[None; 8]))?;
        harness.telemetry.set_battery_level(None, 50);

        let changes = reconcile(&harness.services(at(1, 9, 10))).await?;
        assert_eq!(changes.len(), 1);
        assert!(!harness.device.settings().charge_from_grid.is_enabled);
        Ok(())
    }

    #[tokio::test]
    async fn test_exports_to_floor() -> Result {
        let harness = Harness::new(FakeDevice::default());
        let export = Some(PeriodAction::builder().discharge_to_grid_limit(20).battery_discharge_rate(80).build());
        harness.store.save(&plan(&[export, export, None]))?;
        harness.telemetry.set_battery_level(None, 70);

        reconcile(&harness.services(at(1, 9, 10))).await?;
        let settings = harness.device.settings();
        assert!(settings.discharge_to_grid.is_enabled);
        assert_eq!(settings.discharge_to_grid.limit, 20);
        assert_eq!(settings.discharge_to_grid.stop, time(11, 0));
        assert_eq!(settings.battery_discharge_rate, 80);
        Ok(())
    }

    #[tokio::test]
    async fn test_full_battery_stops_charging() -> Result {
        let harness = Harness::new(FakeDevice::default());
        harness.store.save(&plan(&[None; 4]))?;
        harness.telemetry.set_battery_level(None, 99);

        let changes = reconcile(&harness.services(at(1, 9, 10))).await?;
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].reason, "battery is full");
        assert_eq!(harness.device.settings().battery_charge_rate, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_restores_rate_once_there_is_space() -> Result {
        let harness = Harness::new(FakeDevice::with_charge_rate(0));
        harness.store.save(&plan(&[None; 4]))?;
        harness.telemetry.set_battery_level(None, 90);

        reconcile(&harness.services(at(1, 9, 10))).await?;
        assert_eq!(harness.device.settings().battery_charge_rate, 100);
        Ok(())
    }

    #[tokio::test]
    async fn test_no_plan_leaves_device() -> Result {
        let harness = Harness::new(FakeDevice::default());
        let changes = reconcile(&harness.services(at(1, 9, 10))).await?;
        assert!(changes.is_empty());
        assert!(harness.device.writes().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_before_first_slot_leaves_device() -> Result {
        let harness = Harness::new(FakeDevice::default());
        harness.store.save(&importing_plan())?;
        let changes = reconcile(&harness.services(at(1, 9, 0))).await?;
        assert!(changes.is_empty());
        assert!(harness.device.writes().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_offline_leaves_device() -> Result {
        let harness = Harness::new(FakeDevice::default());
        harness.device.set_offline();
        harness.store.save(&importing_plan())?;
        let changes = reconcile(&harness.services(at(1, 9, 10))).await?;
        assert!(changes.is_empty());
        assert!(harness.device.writes().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_uses_fallback_plan() -> Result {
        let harness = Harness::new(FakeDevice::default());
        harness.store.save(&importing_plan())?;
        harness.telemetry.set_battery_level(None, 50);

        let changes = reconcile(&harness.services(at(1, 9, 10) + TimeDelta::days(2))).await?;
        assert!(!changes.is_empty());
        assert!(harness.device.settings().charge_from_grid.is_enabled);
        let (_, body) = harness.notifier.messages().pop().unwrap();
        assert!(body.contains("two days ago"));
        Ok(())
    }
}
