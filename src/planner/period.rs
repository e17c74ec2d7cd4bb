use std::ops::Range;

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;

/// Named part of the local day.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, derive_more::Display)]
pub enum Period {
    #[display("overnight")]
    Overnight,

    #[display("morning")]
    Morning,

    #[display("daytime")]
    Daytime,

    #[display("evening")]
    Evening,

    #[display("late")]
    Late,
}

impl Period {
    #[must_use]
    pub const fn hours(self) -> Range<u32> {
        match self {
            Self::Overnight => 0..6,
            Self::Morning => 6..10,
            Self::Daytime => 10..16,
            Self::Evening => 16..19,
            Self::Late => 19..24,
        }
    }

    #[must_use]
    pub fn of(at: DateTime<Utc>, tz: Tz) -> Self {
        let hour = local_hour(at, tz);
        [Self::Overnight, Self::Morning, Self::Daytime, Self::Evening]
            .into_iter()
            .find(|period| period.hours().contains(&hour))
            .unwrap_or(Self::Late)
    }
}

#[must_use]
pub fn local_hour(at: DateTime<Utc>, tz: Tz) -> u32 {
    at.with_timezone(&tz).hour()
}

/// Whether the local hour falls within `[start, end)`, wrapping over midnight when `start > end`.
#[must_use]
pub fn in_hours(at: DateTime<Utc>, tz: Tz, (start, end): (u32, u32)) -> bool {
    let hour = local_hour(at, tz);
    if start <= end { (start..end).contains(&hour) } else { hour >= start || hour < end }
}
