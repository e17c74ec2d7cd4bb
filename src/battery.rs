//! Battery unit conversions.
//!
//! Percentages are of the usable capacity for energy, and of the inverter's maximum battery power for rates.

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};

use crate::quantity::{energy::KilowattHours, power::Kilowatts, time::Hours};

/// Charge and discharge rates accepted by the inverter firmware, in percent.
///
/// There is no true zero: the lowest accepted rate is 5%.
pub const DEVICE_RATE_STEPS: [u8; 9] = [5, 10, 25, 33, 50, 67, 75, 80, 90];

#[must_use]
#[derive(Copy, Clone, Debug)]
pub struct Battery {
    /// Usable capacity in watt-hours.
    capacity_watt_hours: f64,

    /// Maximum charging or discharging power in watts.
    max_power_watts: f64,
}

impl Battery {
    pub fn new(amp_hours: f64, voltage: f64, max_power_watts: f64) -> Self {
        Self { capacity_watt_hours: amp_hours * voltage, max_power_watts }
    }

    pub fn capacity(self) -> KilowattHours {
        KilowattHours::from_watt_hours(self.capacity_watt_hours)
    }

    pub fn max_power(self) -> Kilowatts {
        Kilowatts::from_watts(self.max_power_watts)
    }

    pub fn percent_to_energy(self, percent: i32) -> KilowattHours {
        KilowattHours::from(self.capacity().0 * f64::from(percent) / 100.0)
    }

    #[expect(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn energy_to_percent(self, energy: KilowattHours) -> i32 {
        (energy.0 * 100.0 / self.capacity().0).round() as i32
    }

    pub fn percent_to_power(self, percent: i32) -> Kilowatts {
        Kilowatts::from(self.max_power().0 * f64::from(percent) / 100.0)
    }

    #[expect(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn power_to_percent(self, power: Kilowatts) -> i32 {
        (power.0 * 100.0 / self.max_power().0).round() as i32
    }

    /// How many percent of charge a single half-hour slot drains at full power.
    #[must_use]
    pub fn drain_per_slot(self) -> i32 {
        self.energy_to_percent(self.max_power() * Hours::from(0.5)).max(1)
    }

    /// Constant power needed to move the battery from one state of charge to another within the interval.
    ///
    /// A non-positive interval yields the full battery power in the needed direction.
    pub fn transfer_plan(
        self,
        from_percent: i32,
        to_percent: i32,
        from_time: DateTime<Utc>,
        to_time: DateTime<Utc>,
    ) -> Transfer {
        let energy = self.percent_to_energy(to_percent - from_percent);
        let hours = Hours::from(to_time - from_time).max(Hours::ZERO);
        let rate = if hours > Hours::ZERO {
            energy / hours
        } else if energy > KilowattHours::ZERO {
            self.max_power()
        } else if energy < KilowattHours::ZERO {
            -self.max_power()
        } else {
            Kilowatts::ZERO
        };
        Transfer { energy, hours, rate, rate_percent: self.power_to_percent(rate) }
    }
}

#[must_use]
#[derive(Copy, Clone, Debug)]
pub struct Transfer {
    pub energy: KilowattHours,
    pub hours: Hours,
    pub rate: Kilowatts,
    pub rate_percent: i32,
}

impl Display for Transfer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} over {} at {} ({}%)", self.energy, self.hours, self.rate, self.rate_percent)
    }
}

/// Quantize the requested rate to the smallest accepted rate that is not lower.
///
/// Anything above the ladder maps to its top, anything below to its bottom.
#[must_use]
pub fn round_to_device_step(percent: i32) -> u8 {
    DEVICE_RATE_STEPS
        .iter()
        .copied()
        .find(|step| i32::from(*step) >= percent)
        .unwrap_or(DEVICE_RATE_STEPS[DEVICE_RATE_STEPS.len() - 1])
}

/// Next accepted rate above the current one, saturating at the top.
#[must_use]
pub fn step_up(rate: u8) -> u8 {
    DEVICE_RATE_STEPS
        .iter()
        .copied()
        .find(|step| *step > rate)
        .unwrap_or(DEVICE_RATE_STEPS[DEVICE_RATE_STEPS.len() - 1])
}

/// Next accepted rate below the current one, saturating at the bottom.
#[must_use]
pub fn step_down(rate: u8) -> u8 {
    DEVICE_RATE_STEPS.iter().copied().rev().find(|step| *step < rate).unwrap_or(DEVICE_RATE_STEPS[0])
}
