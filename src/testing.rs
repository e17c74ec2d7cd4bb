//! In-memory collaborators for unit tests.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::{
    clock::{Clock, FixedClock},
    device::{BUSY_MARKER, Device, DeviceSettings, GridWindow, OFFLINE_MARKER, RawSettings, register},
    journal::Journal,
    notify::Notifier,
    ops::Interval,
    plan::{Plan, PriceSlot},
    prelude::*,
    retry::Backoff,
    services::Services,
    settings::Settings,
    store::PlanStore,
    telemetry::{Point, Series, Telemetry},
};

/// Inverter that applies every write to its register map.
#[derive(Default)]
pub struct FakeDevice {
    registers: Mutex<Option<RawSettings>>,
    n_busy: Mutex<u32>,
    is_offline: Mutex<bool>,
    writes: Mutex<Vec<RawSettings>>,
}

impl FakeDevice {
    pub fn default_registers() -> RawSettings {
        RawSettings(BTreeMap::from(
            [
                (register::CHARGE_FROM_GRID_ENABLED, "FALSE"),
                (register::CHARGE_START, "00:30"),
                (register::CHARGE_STOP, "04:30"),
                (register::CHARGE_LIMIT, "100"),
                (register::DISCHARGE_TO_GRID_ENABLED, "FALSE"),
                (register::DISCHARGE_START, "16:00"),
                (register::DISCHARGE_STOP, "19:00"),
                (register::DISCHARGE_LIMIT, "20"),
                (register::BATTERY_CHARGE_RATE, "100"),
                (register::BATTERY_DISCHARGE_RATE, "100"),
            ]
            .map(|(key, value)| (key.to_owned(), value.to_owned())),
        ))
    }

    pub fn with_charge_from_grid(window: GridWindow) -> Self {
        let device = Self::default();
        device.merge(&window.to_charge_registers());
        device
    }

    pub fn with_charge_rate(percent: u8) -> Self {
        let device = Self::default();
        device.merge(&RawSettings(BTreeMap::from([(
            register::BATTERY_CHARGE_RATE.to_owned(),
            percent.to_string(),
        )])));
        device
    }

    pub fn push_busy(&self, n_times: u32) {
        *self.n_busy.lock().unwrap() += n_times;
    }

    pub fn set_offline(&self) {
        *self.is_offline.lock().unwrap() = true;
    }

    pub fn registers(&self) -> RawSettings {
        self.registers.lock().unwrap().clone().unwrap_or_else(Self::default_registers)
    }

    pub fn settings(&self) -> DeviceSettings {
        self.registers().decode().unwrap()
    }

    pub fn writes(&self) -> Vec<RawSettings> {
        self.writes.lock().unwrap().clone()
    }

    fn merge(&self, update: &RawSettings) {
        let mut registers = self.registers();
        registers.0.extend(update.0.clone());
        *self.registers.lock().unwrap() = Some(registers);
    }

    fn write(&self, update: RawSettings) {
        self.merge(&update);
        self.writes.lock().unwrap().push(update);
    }
}

#[async_trait]
impl Device for FakeDevice {
    async fn get_settings(&self) -> Result<RawSettings> {
        if *self.is_offline.lock().unwrap() {
            return Ok(RawSettings(BTreeMap::from([(
                register::CHARGE_LIMIT.to_owned(),
                OFFLINE_MARKER.to_owned(),
            )])));
        }
        let mut n_busy = self.n_busy.lock().unwrap();
        let mut registers = self.registers();
        if *n_busy != 0 {
            *n_busy -= 1;
            registers.0.insert(register::CHARGE_LIMIT.to_owned(), BUSY_MARKER.to_owned());
        }
        Ok(registers)
    }

    async fn set_charge_from_grid(&self, window: GridWindow) -> Result {
        self.write(window.to_charge_registers());
        Ok(())
    }

    async fn set_discharge_to_grid(&self, window: GridWindow) -> Result {
        self.write(window.to_discharge_registers());
        Ok(())
    }

    async fn set_battery_charge_rate(&self, percent: u8) -> Result {
        self.write(RawSettings(BTreeMap::from([(
            register::BATTERY_CHARGE_RATE.to_owned(),
            percent.to_string(),
        )])));
        Ok(())
    }

    async fn set_battery_discharge_rate(&self, percent: u8) -> Result {
        self.write(RawSettings(BTreeMap::from([(
            register::BATTERY_DISCHARGE_RATE.to_owned(),
            percent.to_string(),
        )])));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeTelemetry {
    prices: Mutex<Vec<PriceSlot>>,
    levels: Mutex<HashMap<Option<DateTime<Utc>>, u8>>,
    series: Mutex<HashMap<Series, Vec<Point>>>,
    failing: Mutex<HashSet<Series>>,
}

impl FakeTelemetry {
    pub fn set_prices(&self, prices: Vec<PriceSlot>) {
        *self.prices.lock().unwrap() = prices;
    }

    pub fn set_battery_level(&self, at: Option<DateTime<Utc>>, level: u8) {
        self.levels.lock().unwrap().insert(at, level);
    }

    pub fn set_series(&self, series: Series, points: Vec<Point>) {
        self.series.lock().unwrap().insert(series, points);
    }

    pub fn fail_series(&self, series: Series) {
        self.failing.lock().unwrap().insert(series);
    }
}

#[async_trait]
impl Telemetry for FakeTelemetry {
    async fn get_prices(
        &self,
        interval: Interval,
        _import_tariff: &str,
        _export_tariff: &str,
    ) -> Result<Vec<PriceSlot>> {
        Ok(self.prices.lock().unwrap().iter().copied().filter(|slot| interval.contains(slot.start)).collect())
    }

    async fn get_battery_level(&self, at: Option<DateTime<Utc>>) -> Result<u8> {
        self.levels.lock().unwrap().get(&at).copied().with_context(|| format!("no level at {at:?}"))
    }

    async fn get_series(&self, series: Series, interval: Interval) -> Result<Vec<Point>> {
        if self.failing.lock().unwrap().contains(&series) {
            bail!("{series} is unavailable");
        }
        Ok(self
            .series
            .lock()
            .unwrap()
            .get(&series)
            .map(|points| points.iter().copied().filter(|point| interval.contains(point.at)).collect())
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    plans: Mutex<Vec<Plan>>,
}

impl PlanStore for MemoryStore {
    fn load_all(&self, at: DateTime<Utc>) -> Result<Vec<Plan>> {
        let mut plans: Vec<Plan> =
            self.plans.lock().unwrap().iter().filter(|plan| plan.covers(at)).cloned().collect();
        plans.sort_by_key(|plan| plan.interval().map(|interval| (interval.start, interval.end)));
        Ok(plans)
    }

    fn save(&self, plan: &Plan) -> Result {
        ensure!(!plan.is_empty(), "refusing to save an empty plan");
        self.plans.lock().unwrap().push(plan.clone());
        Ok(())
    }
}

impl MemoryStore {
    pub fn n_plans(&self) -> usize {
        self.plans.lock().unwrap().len()
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(String, String)>>,
    is_failing: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self { is_failing: true, ..Self::default() }
    }

    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, title: &str, body: &str) -> Result {
        ensure!(!self.is_failing, "the channel is down");
        self.messages.lock().unwrap().push((title.to_owned(), body.to_owned()));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryJournal {
    entries: Mutex<Vec<String>>,
}

impl MemoryJournal {
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }
}

impl Journal for MemoryJournal {
    fn append(&self, _at: DateTime<Utc>, entry: &str) -> Result {
        self.entries.lock().unwrap().push(entry.to_owned());
        Ok(())
    }
}

/// Fakes wired into the services, kept around for inspection.
pub struct Harness {
    pub device: Arc<FakeDevice>,
    pub telemetry: Arc<FakeTelemetry>,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub journal: Arc<MemoryJournal>,
    pub settings: Settings,
}

impl Harness {
    pub fn new(device: FakeDevice) -> Self {
        Self {
            device: Arc::new(device),
            telemetry: Arc::new(FakeTelemetry::default()),
            store: Arc::new(MemoryStore::default()),
            notifier: Arc::new(RecordingNotifier::default()),
            journal: Arc::new(MemoryJournal::default()),
            settings: Settings::default(),
        }
    }

    pub fn services(&self, now: DateTime<Utc>) -> Services {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock(now));
        Services {
            device: self.device.clone(),
            telemetry: self.telemetry.clone(),
            store: self.store.clone(),
            notifier: self.notifier.clone(),
            journal: self.journal.clone(),
            clock,
            settings: Arc::new(self.settings.clone()),
            backoff: Backoff::immediate(5),
            cancellation: CancellationToken::new(),
        }
    }
}
