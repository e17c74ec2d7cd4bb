//! Price and time-series queries.

use std::fmt::{Display, Formatter};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, Utc};
use chrono_tz::Tz;

use crate::{ops::Interval, plan::PriceSlot, prelude::*};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Series {
    /// On-site generation in watts.
    GenerationPower,

    /// Inverter AC output in watts.
    InverterOutputPower,

    /// State of charge in percent.
    BatteryLevel,

    /// Sunrise events.
    Sunrise,

    /// Sunset events.
    Sunset,

    /// Forecast generation for the day in kilowatt-hours.
    ForecastYield,
}

impl Display for Series {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GenerationPower => write!(f, "generation power"),
            Self::InverterOutputPower => write!(f, "inverter output power"),
            Self::BatteryLevel => write!(f, "battery level"),
            Self::Sunrise => write!(f, "sunrise"),
            Self::Sunset => write!(f, "sunset"),
            Self::ForecastYield => write!(f, "forecast yield"),
        }
    }
}

/// Sample of a series.
///
/// Event series (sunrise and sunset) yield one point per event, stamped with the event time.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Point {
    pub at: DateTime<Utc>,
    pub value: f64,
}

impl Point {
    pub const fn new(at: DateTime<Utc>, value: f64) -> Self {
        Self { at, value }
    }
}

#[async_trait]
pub trait Telemetry: Send + Sync {
    /// Half-hour import and export prices starting within the interval.
    async fn get_prices(
        &self,
        interval: Interval,
        import_tariff: &str,
        export_tariff: &str,
    ) -> Result<Vec<PriceSlot>>;

    /// State of charge at the given time, or the live one.
    async fn get_battery_level(&self, at: Option<DateTime<Utc>>) -> Result<u8>;

    /// Samples ordered by time.
    async fn get_series(&self, series: Series, interval: Interval) -> Result<Vec<Point>>;
}

#[expect(clippy::cast_precision_loss)]
#[must_use]
pub fn mean(points: &[Point]) -> Option<f64> {
    (!points.is_empty()).then(|| points.iter().map(|point| point.value).sum::<f64>() / points.len() as f64)
}

#[must_use]
pub fn peak(points: &[Point]) -> Option<f64> {
    points.iter().map(|point| point.value).max_by(f64::total_cmp)
}

#[must_use]
pub fn minimum(points: &[Point]) -> Option<f64> {
    points.iter().map(|point| point.value).min_by(f64::total_cmp)
}

/// Local midnight-to-midnight interval of the date.
pub fn local_day(date: NaiveDate, tz: Tz) -> Interval {
    let start = local_time(date, NaiveTime::MIN, tz);
    let end = date.succ_opt().map_or(start + TimeDelta::days(1), |next| local_time(next, NaiveTime::MIN, tz));
    Interval::from_std(start..end)
}

/// Convert the local wall-clock time into UTC, taking the earliest instant when ambiguous.
///
/// Times skipped by a daylight saving transition are shifted by an hour.
pub fn local_time(date: NaiveDate, time: NaiveTime, tz: Tz) -> DateTime<Utc> {
    let naive = date.and_time(time);
    naive
        .and_local_timezone(tz)
        .earliest()
        .or_else(|| (naive + TimeDelta::hours(1)).and_local_timezone(tz).earliest())
        .map_or_else(|| naive.and_utc(), |at| at.to_utc())
}

const FALLBACK_SUNRISE: NaiveTime = NaiveTime::from_hms_opt(8, 0, 0).unwrap();
const FALLBACK_SUNSET: NaiveTime = NaiveTime::from_hms_opt(16, 0, 0).unwrap();

/// Generation window of the date: sunrise to sunset, narrowed by the inset on both sides.
///
/// Falls back to 08:00–16:00 local time when the sun events are unavailable.
#[instrument(skip_all, fields(date = %date))]
pub async fn generation_window(
    telemetry: &dyn Telemetry,
    date: NaiveDate,
    tz: Tz,
    inset: TimeDelta,
) -> Interval {
    let day = local_day(date, tz);
    match query_sun_events(telemetry, day).await {
        Ok((sunrise, sunset)) if sunrise + inset < sunset - inset => {
            Interval::from_std((sunrise + inset)..(sunset - inset))
        }
        Ok((sunrise, sunset)) => {
            warn!(%sunrise, %sunset, "the inset swallows the whole day, using the fallback window");
            fallback_window(date, tz)
        }
        Err(error) => {
            warn!("failed to query the sun events, using the fallback window: {error:#}");
            fallback_window(date, tz)
        }
    }
}

fn fallback_window(date: NaiveDate, tz: Tz) -> Interval {
    Interval::from_std(local_time(date, FALLBACK_SUNRISE, tz)..local_time(date, FALLBACK_SUNSET, tz))
}

async fn query_sun_events(
    telemetry: &dyn Telemetry,
    day: Interval,
) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let sunrise = telemetry
        .get_series(Series::Sunrise, day)
        .await?
        .into_iter()
        .map(|point| point.at)
        .filter(|at| day.contains(*at))
        .min()
        .context("no sunrise on the day")?;
    let sunset = telemetry
        .get_series(Series::Sunset, day)
        .await?
        .into_iter()
        .map(|point| point.at)
        .filter(|at| day.contains(*at))
        .max()
        .context("no sunset on the day")?;
    ensure!(sunrise < sunset, "sunrise `{sunrise}` is not before sunset `{sunset}`");
    Ok((sunrise, sunset))
}

/// Latest forecast yield for the day as known at `now`, in kilowatt-hours.
#[instrument(skip_all)]
pub async fn forecast_yield(
    telemetry: &dyn Telemetry,
    day: Interval,
    now: DateTime<Utc>,
) -> Result<Option<f64>> {
    let interval = day.with_end(now.clamp(day.start, day.end));
    let points = if interval.start < interval.end {
        telemetry.get_series(Series::ForecastYield, interval).await?
    } else {
        Vec::new()
    };
    Ok(points.into_iter().max_by_key(|point| point.at).map(|point| point.value))
}
