use std::{
    fmt::{Debug, Display, Formatter},
    ops::Div,
};

use crate::quantity::{Quantity, power::Kilowatts, time::Hours};

pub type KilowattHours = Quantity<1, 1, 0>;

impl KilowattHours {
    pub fn from_watt_hours(watt_hours: f64) -> Self {
        Self(watt_hours * 0.001)
    }
}

impl Display for KilowattHours {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2} kWh", self.0)
    }
}

impl Debug for KilowattHours {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.0}Wh", self.0 * 1000.0)
    }
}

impl Div<Hours> for KilowattHours {
    type Output = Kilowatts;

    fn div(self, rhs: Hours) -> Self::Output {
        Quantity(self.0 / rhs.0)
    }
}
