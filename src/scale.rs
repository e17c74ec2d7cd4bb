//! Expected state of charge between two checkpoints.

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::quantity::time::Hours;

/// How the target ramps between the checkpoints.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Front-loaded: most of the change happens early, `1 - (1 - f)²`.
    Fast,

    /// Proportional to the elapsed time.
    Linear,

    /// Back-loaded: most of the change happens late, `f²`.
    Slow,
}

impl Method {
    pub const ALL: [Self; 3] = [Self::Fast, Self::Linear, Self::Slow];

    /// Map the elapsed fraction onto the progress fraction, both in `[0, 1]`.
    #[must_use]
    fn shape(self, fraction: f64) -> f64 {
        match self {
            Self::Fast => 1.0 - (1.0 - fraction).powi(2),
            Self::Linear => fraction,
            Self::Slow => fraction.powi(2),
        }
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fast => write!(f, "fast"),
            Self::Linear => write!(f, "linear"),
            Self::Slow => write!(f, "slow"),
        }
    }
}

/// Interpolate the value at `at`, clamped to the interval.
#[expect(clippy::cast_possible_truncation)]
#[must_use]
pub fn apply(
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    at: DateTime<Utc>,
    start_value: i32,
    end_value: i32,
    method: Method,
) -> i32 {
    if at <= start_time {
        return start_value;
    }
    if at >= end_time {
        return end_value;
    }
    let fraction = Hours::from(at - start_time).0 / Hours::from(end_time - start_time).0;
    let progress = method.shape(fraction.clamp(0.0, 1.0));
    start_value + (f64::from(end_value - start_value) * progress).round() as i32
}
