use std::{
    fmt::{Debug, Formatter},
    ops::Sub,
};

use chrono::{DateTime, Utc};

pub type Interval<Tz = Utc> = RangeExclusive<DateTime<Tz>>;

#[must_use]
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct RangeExclusive<T: Copy> {
    pub start: T,
    pub end: T,
}

impl<T: Copy + Debug> Debug for RangeExclusive<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}..{:?}", self.start, self.end)
    }
}

impl<T: Copy> RangeExclusive<T> {
    pub const fn from_std(range: std::ops::Range<T>) -> Self {
        Self { start: range.start, end: range.end }
    }

    pub const fn with_end(mut self, end: T) -> Self {
        self.end = end;
        self
    }
}

impl<T: Copy + Sub> RangeExclusive<T> {
    #[must_use]
    pub fn len(self) -> <T as Sub>::Output {
        self.end - self.start
    }
}

impl<T: Copy + PartialOrd> RangeExclusive<T> {
    #[must_use]
    pub fn contains(self, other: T) -> bool {
        (self.start <= other) && (other < self.end)
    }

    /// Clamp the value into `start..=end`.
    #[must_use]
    pub fn clamp(self, value: T) -> T {
        if value < self.start {
            self.start
        } else if value > self.end {
            self.end
        } else {
            value
        }
    }
}
