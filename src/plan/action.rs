use std::fmt::{Display, Formatter};

use bon::Builder;
use serde::{Deserialize, Serialize};

/// Battery directive for a single slot.
///
/// The default action neither imports nor exports.
#[must_use]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Builder, Serialize, Deserialize)]
pub struct PeriodAction {
    /// State of charge up to which charging from the grid is allowed, `0` disables it.
    #[builder(default = 0)]
    #[serde(rename = "chargeFromGridLimit")]
    pub charge_from_grid_limit: u8,

    /// State of charge down to which exporting to the grid is allowed, `100` disables it.
    #[builder(default = 100)]
    #[serde(rename = "dischargeToGridLimit")]
    pub discharge_to_grid_limit: u8,

    #[serde(rename = "batteryChargeRatePercent", default)]
    pub battery_charge_rate: Option<u8>,

    #[serde(rename = "batteryDischargeRatePercent", default)]
    pub battery_discharge_rate: Option<u8>,
}

impl Default for PeriodAction {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl PeriodAction {
    /// Charge from the grid up to the ceiling.
    pub fn import(ceiling: u8) -> Self {
        Self::builder().charge_from_grid_limit(ceiling).build()
    }

    /// Export to the grid down to the floor.
    pub fn export(floor: u8) -> Self {
        Self::builder().discharge_to_grid_limit(floor).build()
    }

    #[must_use]
    pub const fn is_importing(&self) -> bool {
        self.charge_from_grid_limit > 0
    }

    #[must_use]
    pub const fn is_exporting(&self) -> bool {
        self.discharge_to_grid_limit < 100
    }

    /// Neither importing nor exporting: on-site generation goes into the battery.
    #[must_use]
    pub const fn is_storing(&self) -> bool {
        !self.is_importing() && !self.is_exporting()
    }
}

impl Display for PeriodAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_importing() {
            write!(f, "import to {}%", self.charge_from_grid_limit)?;
        } else if self.is_exporting() {
            write!(f, "export to {}%", self.discharge_to_grid_limit)?;
        } else {
            write!(f, "store")?;
        }
        if let Some(rate) = self.battery_charge_rate {
            write!(f, ", charge at {rate}%")?;
        }
        if let Some(rate) = self.battery_discharge_rate {
            write!(f, ", discharge at {rate}%")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_inert() {
        let action = PeriodAction::default();
        assert_eq!(action.charge_from_grid_limit, 0);
        assert_eq!(action.discharge_to_grid_limit, 100);
        assert!(action.is_storing());
    }

    #[test]
    fn test_deserialize_defaults_missing_rates() {
        // language=JSON
        const ACTION: &str = r#"{"chargeFromGridLimit": 98, "dischargeToGridLimit": 100}"#;
        let action = serde_json::from_str::<PeriodAction>(ACTION).unwrap();
        assert!(action.is_importing());
        assert_eq!(action.battery_charge_rate, None);
    }

    #[test]
    fn test_display() {
        assert_eq!(PeriodAction::export(20).to_string(), "export to 20%");
        let action = PeriodAction::builder().battery_charge_rate(50).build();
        assert_eq!(action.to_string(), "store, charge at 50%");
    }
}
