//! Inverter settings as seen by the controllers.
//!
//! The device speaks a flat map of string registers, which is decoded into [`DeviceSettings`]
//! right after retrieval.

use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
    ops::ControlFlow,
};

use async_trait::async_trait;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{prelude::*, retry::Backoff};

/// Register value reported while the inverter is still answering the previous request.
pub const BUSY_MARKER: &str = "DATAFRAME_TIMEOUT";

/// Register value reported while the inverter cannot be reached by its gateway.
pub const OFFLINE_MARKER: &str = "DEVICE_OFFLINE";

pub mod register {
    pub const CHARGE_FROM_GRID_ENABLED: &str = "enable_charge_from_grid";
    pub const CHARGE_START: &str = "charge_start_time";
    pub const CHARGE_STOP: &str = "charge_stop_time";
    pub const CHARGE_LIMIT: &str = "charge_limit";
    pub const DISCHARGE_TO_GRID_ENABLED: &str = "enable_discharge_to_grid";
    pub const DISCHARGE_START: &str = "discharge_start_time";
    pub const DISCHARGE_STOP: &str = "discharge_stop_time";
    pub const DISCHARGE_LIMIT: &str = "discharge_limit";
    pub const BATTERY_CHARGE_RATE: &str = "battery_charge_rate";
    pub const BATTERY_DISCHARGE_RATE: &str = "battery_discharge_rate";
}

const TIME_FORMAT: &str = "%H:%M";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("the device is busy")]
    Busy,

    #[error("the device is offline")]
    Offline,

    #[error("register `{0}` is missing")]
    Missing(&'static str),

    #[error("register `{register}` has an unexpected value `{value}`")]
    Malformed { register: &'static str, value: String },
}

/// Raw register map as returned by the device.
#[must_use]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, derive_more::From)]
#[serde(transparent)]
pub struct RawSettings(pub BTreeMap<String, String>);

impl RawSettings {
    fn get(&self, register: &'static str) -> Result<&str, SettingsError> {
        self.0.get(register).map(String::as_str).ok_or(SettingsError::Missing(register))
    }

    fn parse_bool(&self, register: &'static str) -> Result<bool, SettingsError> {
        let value = self.get(register)?;
        match value.to_ascii_uppercase().as_str() {
            "TRUE" | "1" => Ok(true),
            "FALSE" | "0" => Ok(false),
            _ => Err(SettingsError::Malformed { register, value: value.to_owned() }),
        }
    }

    fn parse_time(&self, register: &'static str) -> Result<NaiveTime, SettingsError> {
        let value = self.get(register)?;
        NaiveTime::parse_from_str(value, TIME_FORMAT)
            .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
            .map_err(|_| SettingsError::Malformed { register, value: value.to_owned() })
    }

    fn parse_percent(&self, register: &'static str) -> Result<u8, SettingsError> {
        let value = self.get(register)?;
        value
            .trim()
            .parse::<u8>()
            .ok()
            .filter(|percent| *percent <= 100)
            .ok_or_else(|| SettingsError::Malformed { register, value: value.to_owned() })
    }

    /// Decode the registers, checking for the busy and offline markers first.
    ///
    /// The offline marker wins over the busy one.
    pub fn decode(&self) -> Result<DeviceSettings, SettingsError> {
        if self.0.values().any(|value| value == OFFLINE_MARKER) {
            return Err(SettingsError::Offline);
        }
        if self.0.values().any(|value| value == BUSY_MARKER) {
            return Err(SettingsError::Busy);
        }
        Ok(DeviceSettings {
            charge_from_grid: self.get_charge_from_grid()?,
            discharge_to_grid: self.get_discharge_to_grid()?,
            battery_charge_rate: self.get_battery_charge_rate()?,
            battery_discharge_rate: self.parse_percent(register::BATTERY_DISCHARGE_RATE)?,
        })
    }

    pub fn get_charge_from_grid(&self) -> Result<GridWindow, SettingsError> {
        Ok(GridWindow {
            is_enabled: self.parse_bool(register::CHARGE_FROM_GRID_ENABLED)?,
            start: self.parse_time(register::CHARGE_START)?,
            stop: self.parse_time(register::CHARGE_STOP)?,
            limit: self.parse_percent(register::CHARGE_LIMIT)?,
        })
    }

    pub fn get_discharge_to_grid(&self) -> Result<GridWindow, SettingsError> {
        Ok(GridWindow {
            is_enabled: self.parse_bool(register::DISCHARGE_TO_GRID_ENABLED)?,
            start: self.parse_time(register::DISCHARGE_START)?,
            stop: self.parse_time(register::DISCHARGE_STOP)?,
            limit: self.parse_percent(register::DISCHARGE_LIMIT)?,
        })
    }

    pub fn get_battery_charge_rate(&self) -> Result<u8, SettingsError> {
        self.parse_percent(register::BATTERY_CHARGE_RATE)
    }
}

/// Grid import or export window in the device's wall-clock time.
#[must_use]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct GridWindow {
    pub is_enabled: bool,
    pub start: NaiveTime,
    pub stop: NaiveTime,

    /// State-of-charge ceiling for import, floor for export.
    pub limit: u8,
}

impl GridWindow {
    pub const fn disabled(self) -> Self {
        Self { is_enabled: false, ..self }
    }

    /// Whether the window covers the wall-clock time.
    #[must_use]
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start <= self.stop {
            self.start <= time && time < self.stop
        } else {
            // Wraps over midnight:
            self.start <= time || time < self.stop
        }
    }

    /// Encode as registers for the import window.
    pub fn to_charge_registers(self) -> RawSettings {
        self.to_registers(
            register::CHARGE_FROM_GRID_ENABLED,
            register::CHARGE_START,
            register::CHARGE_STOP,
            register::CHARGE_LIMIT,
        )
    }

    /// Encode as registers for the export window.
    pub fn to_discharge_registers(self) -> RawSettings {
        self.to_registers(
            register::DISCHARGE_TO_GRID_ENABLED,
            register::DISCHARGE_START,
            register::DISCHARGE_STOP,
            register::DISCHARGE_LIMIT,
        )
    }

    fn to_registers(
        self,
        enabled: &str,
        start: &str,
        stop: &str,
        limit: &str,
    ) -> RawSettings {
        RawSettings(BTreeMap::from([
            (enabled.to_owned(), if self.is_enabled { "TRUE" } else { "FALSE" }.to_owned()),
            (start.to_owned(), self.start.format(TIME_FORMAT).to_string()),
            (stop.to_owned(), self.stop.format(TIME_FORMAT).to_string()),
            (limit.to_owned(), self.limit.to_string()),
        ]))
    }
}

impl Display for GridWindow {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}–{} at {}%",
            if self.is_enabled { "enabled" } else { "disabled" },
            self.start.format(TIME_FORMAT),
            self.stop.format(TIME_FORMAT),
            self.limit,
        )
    }
}

/// Decoded inverter settings.
#[must_use]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DeviceSettings {
    pub charge_from_grid: GridWindow,
    pub discharge_to_grid: GridWindow,
    pub battery_charge_rate: u8,
    pub battery_discharge_rate: u8,
}

/// Remote inverter.
///
/// Every setter is idempotent: repeating the same call is harmless.
#[async_trait]
pub trait Device: Send + Sync {
    async fn get_settings(&self) -> Result<RawSettings>;

    async fn set_charge_from_grid(&self, window: GridWindow) -> Result;

    async fn set_discharge_to_grid(&self, window: GridWindow) -> Result;

    async fn set_battery_charge_rate(&self, percent: u8) -> Result;

    async fn set_battery_discharge_rate(&self, percent: u8) -> Result;
}

/// Read and decode the settings, polling past the busy marker.
///
/// # Returns
///
/// - [`Some`] settings when the device answered.
/// - [`None`] when the device is offline and the control cycle should be skipped.
#[instrument(skip_all)]
pub async fn read_settings(
    device: &dyn Device,
    backoff: Backoff,
    cancellation: &CancellationToken,
) -> Result<Option<DeviceSettings>> {
    let result = backoff
        .run(cancellation, move |_| async move {
            let raw = match device.get_settings().await {
                Ok(raw) => raw,
                Err(error) => return ControlFlow::Continue(error),
            };
            match raw.decode() {
                Ok(settings) => ControlFlow::Break(Ok(Some(settings))),
                Err(SettingsError::Offline) => ControlFlow::Break(Ok(None)),
                Err(SettingsError::Busy) => ControlFlow::Continue(SettingsError::Busy.into()),
                Err(error) => ControlFlow::Break(Err(Error::from(error))),
            }
        })
        .await
        .context("failed to read the device settings")?;
    let settings = result?;
    if settings.is_none() {
        info!("the device is offline, skipping");
    }
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDevice;

    fn raw(pairs: &[(&str, &str)]) -> RawSettings {
        RawSettings(pairs.iter().map(|(key, value)| ((*key).to_owned(), (*value).to_owned())).collect())
    }

    #[test]
    fn test_decode_ok() {
        let settings = FakeDevice::default_registers().decode().unwrap();
        assert!(!settings.charge_from_grid.is_enabled);
        assert_eq!(settings.charge_from_grid.start, NaiveTime::from_hms_opt(0, 30, 0).unwrap());
        assert_eq!(settings.battery_charge_rate, 100);
    }

    #[test]
    fn test_decode_busy() {
        let mut registers = FakeDevice::default_registers();
        registers.0.insert(register::CHARGE_LIMIT.to_owned(), BUSY_MARKER.to_owned());
        assert!(matches!(registers.decode(), Err(SettingsError::Busy)));
    }

    #[test]
    fn test_decode_offline() {
        let registers = raw(&[("status", OFFLINE_MARKER)]);
        assert!(matches!(registers.decode(), Err(SettingsError::Offline)));
    }

    #[test]
    fn test_decode_malformed_bool() {
        let mut registers = FakeDevice::default_registers();
        registers.0.insert(register::CHARGE_FROM_GRID_ENABLED.to_owned(), "maybe".to_owned());
        assert!(matches!(registers.decode(), Err(SettingsError::Malformed { .. })));
    }

    #[test]
    fn test_window_contains_wrapping() {
        let window = GridWindow {
            is_enabled: true,
            start: NaiveTime::from_hms_opt(23, 0, 0).unwrap(),
            stop: NaiveTime::from_hms_opt(2, 0, 0).unwrap(),
            limit: 100,
        };
        assert!(window.contains(NaiveTime::from_hms_opt(23, 30, 0).unwrap()));
        assert!(window.contains(NaiveTime::from_hms_opt(1, 0, 0).unwrap()));
        assert!(!window.contains(NaiveTime::from_hms_opt(2, 0, 0).unwrap()));
    }

    #[test]
    fn test_registers_round_trip() {
        let window = GridWindow {
            is_enabled: true,
            start: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            stop: NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
            limit: 20,
        };
        assert_eq!(window.to_discharge_registers().get_discharge_to_grid().unwrap(), window);
    }

    #[tokio::test]
    async fn test_read_settings_polls_past_busy() {
        let device = FakeDevice::default();
        device.push_busy(2);
        let settings =
            read_settings(&device, Backoff::immediate(5), &CancellationToken::new()).await.unwrap();
        assert!(settings.is_some());
    }

    #[tokio::test]
    async fn test_read_settings_offline() {
        let device = FakeDevice::default();
        device.set_offline();
        let settings =
            read_settings(&device, Backoff::immediate(5), &CancellationToken::new()).await.unwrap();
        assert!(settings.is_none());
    }

    #[tokio::test]
    async fn test_read_settings_gives_up() {
        let device = FakeDevice::default();
        device.push_busy(10);
        let result = read_settings(&device, Backoff::immediate(3), &CancellationToken::new()).await;
        assert!(result.is_err());
    }
}
