use std::{
    fmt::{Debug, Display, Formatter},
    ops::Mul,
};

use crate::quantity::{Quantity, energy::KilowattHours, time::Hours};

pub type Kilowatts = Quantity<1, 0, 0>;

impl Kilowatts {
    pub fn from_watts(watts: f64) -> Self {
        Self(watts * 0.001)
    }

    #[must_use]
    pub fn watts(self) -> f64 {
        self.0 * 1000.0
    }
}

impl Display for Kilowatts {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.0} W", self.0 * 1000.0)
    }
}

impl Debug for Kilowatts {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.0}W", self.0 * 1000.0)
    }
}

impl Mul<Hours> for Kilowatts {
    type Output = KilowattHours;

    fn mul(self, rhs: Hours) -> Self::Output {
        Quantity(self.0 * rhs.0)
    }
}
