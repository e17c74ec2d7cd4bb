pub mod energy;
pub mod power;
pub mod rate;
pub mod time;

use std::{
    cmp::Ordering,
    ops::{Div, Mul},
};

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// Physical quantity tagged with its dimensions, so that the compiler keeps kilowatts apart from kilowatt-hours.
#[derive(
    Clone,
    Copy,
    Default,
    Deserialize,
    Serialize,
    derive_more::Add,
    derive_more::AddAssign,
    derive_more::From,
    derive_more::FromStr,
    derive_more::Neg,
    derive_more::Sub,
    derive_more::SubAssign,
    derive_more::Sum,
)]
#[serde(transparent)]
pub struct Quantity<const POWER: isize, const TIME: isize, const COST: isize>(pub f64);

impl<const POWER: isize, const TIME: isize, const COST: isize> Quantity<POWER, TIME, COST> {
    pub const ZERO: Self = Self(0.0);

    #[must_use]
    pub fn min(self, rhs: Self) -> Self {
        if rhs < self { rhs } else { self }
    }

    #[must_use]
    pub fn max(self, rhs: Self) -> Self {
        if rhs > self { rhs } else { self }
    }

    #[must_use]
    pub fn clamp(self, min: Self, max: Self) -> Self {
        self.max(min).min(max)
    }

    #[must_use]
    pub const fn abs(self) -> Self {
        Self(self.0.abs())
    }
}

impl<const POWER: isize, const TIME: isize, const COST: isize> PartialEq
    for Quantity<POWER, TIME, COST>
{
    fn eq(&self, other: &Self) -> bool {
        OrderedFloat(self.0).eq(&OrderedFloat(other.0))
    }
}

impl<const POWER: isize, const TIME: isize, const COST: isize> Eq for Quantity<POWER, TIME, COST> {}

impl<const POWER: isize, const TIME: isize, const COST: isize> PartialOrd
    for Quantity<POWER, TIME, COST>
{
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<const POWER: isize, const TIME: isize, const COST: isize> Ord for Quantity<POWER, TIME, COST> {
    fn cmp(&self, other: &Self) -> Ordering {
        OrderedFloat(self.0).cmp(&OrderedFloat(other.0))
    }
}

impl<const POWER: isize, const TIME: isize, const COST: isize> Mul<f64>
    for Quantity<POWER, TIME, COST>
{
    type Output = Self;

    fn mul(self, rhs: f64) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl<const POWER: isize, const TIME: isize, const COST: isize> Div<f64>
    for Quantity<POWER, TIME, COST>
{
    type Output = Self;

    fn div(self, rhs: f64) -> Self::Output {
        Self(self.0 / rhs)
    }
}

#[cfg(test)]
mod tests {
    use std::fmt::{Debug, Formatter};

    use super::*;

    type Bare = Quantity<0, 0, 0>;

    impl Debug for Bare {
        fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self.0)
        }
    }

    #[test]
    fn test_min() {
        assert_eq!(Bare::from(1.0).min(Bare::from(2.0)), Bare::from(1.0));
        assert_eq!(Bare::from(2.0).min(Bare::from(1.0)), Bare::from(1.0));
    }

    #[test]
    fn test_max() {
        assert_eq!(Bare::from(1.0).max(Bare::from(2.0)), Bare::from(2.0));
        assert_eq!(Bare::from(2.0).max(Bare::from(1.0)), Bare::from(2.0));
    }

    #[test]
    fn test_clamp() {
        assert_eq!(Bare::from(1.0).clamp(Bare::from(2.0), Bare::from(3.0)), Bare::from(2.0));
        assert_eq!(Bare::from(4.0).clamp(Bare::from(2.0), Bare::from(3.0)), Bare::from(3.0));
        assert_eq!(Bare::from(2.0).clamp(Bare::from(1.0), Bare::from(3.0)), Bare::from(2.0));
    }

    #[test]
    fn test_ordering_is_total() {
        let mut values = vec![Bare::from(2.0), Bare::from(-1.0), Bare::from(0.5)];
        values.sort();
        assert_eq!(values, vec![Bare::from(-1.0), Bare::from(0.5), Bare::from(2.0)]);
    }
}
