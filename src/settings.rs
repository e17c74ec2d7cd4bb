//! Tunables read from the TOML settings file.

use std::{fmt::Debug, fs, path::Path};

use chrono::{NaiveTime, TimeDelta};
use chrono_tz::Tz;
use serde::Deserialize;

use crate::{battery::Battery, prelude::*, quantity::rate::KilowattHourRate};

#[must_use]
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Tariff time zone, used for every local-hour window.
    pub timezone: Tz,

    pub strategy: StrategyKind,
    pub tariffs: Tariffs,
    pub battery: BatterySettings,
    pub planner: PlannerSettings,
    pub flux: FluxSettings,
    pub target: TargetSettings,
    pub burst: BurstSettings,
    pub entities: Entities,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::Europe::London,
            strategy: StrategyKind::Agile,
            tariffs: Tariffs::default(),
            battery: BatterySettings::default(),
            planner: PlannerSettings::default(),
            flux: FluxSettings::default(),
            target: TargetSettings::default(),
            burst: BurstSettings::default(),
            entities: Entities::default(),
        }
    }
}

impl Settings {
    /// Read the settings, a missing file means all defaults.
    #[instrument(skip_all, fields(path = ?path))]
    pub fn read_from<P: AsRef<Path> + Debug>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.is_file() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("failed to read `{}`", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("failed to parse `{}`", path.display()))
        } else {
            info!("no settings file, using the defaults");
            Ok(Self::default())
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, derive_more::Display)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Half-hourly import and export prices.
    #[display("agile")]
    Agile,

    /// Fixed import price, half-hourly export prices.
    #[display("outgoing")]
    Outgoing,

    /// Three fixed bands with day-over-day feedback.
    #[display("flux")]
    Flux,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Tariffs {
    pub import: String,
    pub export: String,
}

impl Default for Tariffs {
    fn default() -> Self {
        Self {
            import: "E-1R-AGILE-24-10-01-C".to_owned(),
            export: "E-1R-AGILE-OUTGOING-19-05-13-C".to_owned(),
        }
    }
}

#[derive(Copy, Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatterySettings {
    pub amp_hours: f64,
    pub voltage: f64,
    pub max_power_watts: f64,

    /// Minimum state of charge kept for the house.
    pub reserve: u8,

    /// State of charge up to which the battery is charged from the grid.
    pub import_ceiling: u8,

    /// Charge rate while charging from the grid.
    pub grid_charge_rate: u8,

    /// Charge rate restored once the battery is no longer full.
    pub default_charge_rate: u8,

    pub default_discharge_rate: u8,

    /// State of charge at which the charge rate is dropped to zero.
    pub full: u8,

    /// State of charge below which a zeroed charge rate is restored.
    pub restore_below: u8,
}

impl Default for BatterySettings {
    fn default() -> Self {
        Self {
            amp_hours: 186.0,
            voltage: 51.2,
            max_power_watts: 3600.0,
            reserve: 20,
            import_ceiling: 100,
            grid_charge_rate: 95,
            default_charge_rate: 100,
            default_discharge_rate: 100,
            full: 98,
            restore_below: 95,
        }
    }
}

impl BatterySettings {
    pub fn battery(&self) -> Battery {
        Battery::new(self.amp_hours, self.voltage, self.max_power_watts)
    }
}

#[derive(Copy, Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlannerSettings {
    /// Local time of the daily planning run, after the next day's prices get published.
    pub run_at: NaiveTime,

    /// Extra slots added to the export budget.
    pub export_margin: i32,

    /// How much cheaper than the best morning sell price an import slot has to be.
    pub import_margin: KilowattHourRate,

    /// How much the sell price has to beat the buy price for an evening export.
    pub export_spread: KilowattHourRate,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            run_at: NaiveTime::from_hms_opt(16, 30, 0).unwrap_or(NaiveTime::MIN),
            export_margin: 0,
            import_margin: KilowattHourRate::from(2.0),
            export_spread: KilowattHourRate::from(5.0),
        }
    }
}

/// Three-band tariff.
#[derive(Copy, Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FluxSettings {
    /// Local hours `[start, end)` of the cheap band.
    pub low_hours: (u32, u32),

    /// Local hours `[start, end)` of the peak band.
    pub peak_hours: (u32, u32),

    /// Export floor used when there is no usable history.
    pub default_floor: u8,

    pub min_floor: u8,
    pub max_floor: u8,

    /// Lowest state of charge the battery should reach overnight.
    pub safety_floor: u8,

    /// How far above the safety floor counts as comfortable.
    pub comfort_margin: u8,

    /// Floor decrease after a comfortable day.
    pub step: u8,
}

impl Default for FluxSettings {
    fn default() -> Self {
        Self {
            low_hours: (2, 5),
            peak_hours: (16, 19),
            default_floor: 30,
            min_floor: 10,
            max_floor: 60,
            safety_floor: 10,
            comfort_margin: 10,
            step: 5,
        }
    }
}

#[derive(Copy, Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TargetSettings {
    /// Recent generation below which a lagging battery switches to the fast curve.
    pub low_generation_watts: f64,

    /// Recent generation above which a sunny summer day allows the slow curve.
    pub strong_generation_watts: f64,

    /// Forecast yield below which the fast curve is used.
    pub min_forecast_kwh: f64,

    /// Forecast yield above which the slow curve is allowed.
    pub high_forecast_kwh: f64,

    /// Months (1-based) in which the slow curve is allowed.
    pub summer_months: (u32, u32),

    /// How far back the recent generation is averaged.
    pub recent_minutes: i64,

    /// Narrowing of the sunrise–sunset window on both sides.
    pub window_inset_minutes: i64,
}

impl Default for TargetSettings {
    fn default() -> Self {
        Self {
            low_generation_watts: 1500.0,
            strong_generation_watts: 2500.0,
            min_forecast_kwh: 8.0,
            high_forecast_kwh: 25.0,
            summer_months: (5, 8),
            recent_minutes: 30,
            window_inset_minutes: 60,
        }
    }
}

impl TargetSettings {
    pub const fn recent(&self) -> TimeDelta {
        TimeDelta::minutes(self.recent_minutes)
    }

    pub const fn window_inset(&self) -> TimeDelta {
        TimeDelta::minutes(self.window_inset_minutes)
    }
}

#[derive(Copy, Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BurstSettings {
    /// Peak generation since the window start below which the day is considered dull.
    pub min_peak_watts: f64,

    /// Generation above which the sun counts as strong.
    pub high_generation_watts: f64,

    /// Inverter output above which the generation is probably being clipped.
    pub high_output_watts: f64,

    /// How close to the target counts as on target, in percent.
    pub near_target: i32,

    /// How far ahead of the target counts as comfortable, in percent.
    pub ahead_margin: i32,

    /// Current to peak generation ratio below which the generation has dropped.
    pub drop_ratio: f64,

    /// Length of the opportunistic export window.
    pub export_minutes: i64,
}

impl Default for BurstSettings {
    fn default() -> Self {
        Self {
            min_peak_watts: 1000.0,
            high_generation_watts: 2500.0,
            high_output_watts: 3300.0,
            near_target: 3,
            ahead_margin: 10,
            drop_ratio: 0.5,
            export_minutes: 30,
        }
    }
}

impl BurstSettings {
    pub const fn export_duration(&self) -> TimeDelta {
        TimeDelta::minutes(self.export_minutes)
    }
}

/// Home Assistant entity per series.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Entities {
    pub generation_power: String,
    pub inverter_output_power: String,
    pub battery_level: String,
    pub sunrise: String,
    pub sunset: String,
    pub forecast_yield: String,
}

impl Default for Entities {
    fn default() -> Self {
        Self {
            generation_power: "sensor.pv_power".to_owned(),
            inverter_output_power: "sensor.inverter_output_power".to_owned(),
            battery_level: "sensor.battery_soc".to_owned(),
            sunrise: "sensor.sun_next_rising".to_owned(),
            sunset: "sensor.sun_next_setting".to_owned(),
            forecast_yield: "sensor.solcast_pv_forecast_forecast_today".to_owned(),
        }
    }
}
