//! Where the battery should be right now to reach the desired level by the end of the generation window.

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Datelike, Utc};
use chrono_tz::Tz;

use crate::{
    clock::Clock,
    ops::Interval,
    plan::Plan,
    prelude::*,
    scale::{self, Method},
    settings::TargetSettings,
    telemetry::{self, Series, Telemetry},
};

#[must_use]
#[derive(Copy, Clone, Debug)]
pub struct TargetInfo {
    pub now: DateTime<Utc>,

    /// Generation window, clipped at the first planned export.
    pub window: Interval,

    pub live_soc: i32,

    /// State of charge at the start of the window.
    pub start_soc: i32,

    pub desired_end: i32,

    pub fast: i32,
    pub linear: i32,
    pub slow: i32,

    pub method: Method,

    /// Forecast yield for the day in kilowatt-hours.
    pub forecast: Option<f64>,

    /// Mean generation power over the recent minutes in watts.
    pub recent_generation: Option<f64>,
}

impl TargetInfo {
    #[must_use]
    pub const fn target_for(&self, method: Method) -> i32 {
        match method {
            Method::Fast => self.fast,
            Method::Linear => self.linear,
            Method::Slow => self.slow,
        }
    }

    /// Recommended state of charge for now.
    #[must_use]
    pub const fn target(&self) -> i32 {
        self.target_for(self.method)
    }
}

impl Display for TargetInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "live {}%, start {}%, target {}% ({}; fast {}%, linear {}%, slow {}%)",
            self.live_soc,
            self.start_soc,
            self.target(),
            self.method,
            self.fast,
            self.linear,
            self.slow,
        )
    }
}

pub struct TargetService<'a> {
    pub telemetry: &'a dyn Telemetry,
    pub clock: &'a dyn Clock,
    pub timezone: Tz,
    pub settings: TargetSettings,
}

impl TargetService<'_> {
    #[instrument(skip_all, fields(desired_end = desired_end))]
    pub async fn compute(&self, plan: &Plan, desired_end: i32) -> Result<TargetInfo> {
        let now = self.clock.now();
        let local_now = now.with_timezone(&self.timezone);
        let window = self.window(plan, now).await;

        let live_soc = i32::from(self.telemetry.get_battery_level(None).await?);
        let start_soc = if now > window.start {
            match self.telemetry.get_battery_level(Some(window.start)).await {
                Ok(level) => i32::from(level),
                Err(error) => {
                    warn!("failed to query the level at the window start, using the live one: {error:#}");
                    live_soc
                }
            }
        } else {
            live_soc
        };

        let day = telemetry::local_day(local_now.date_naive(), self.timezone);
        let forecast = telemetry::forecast_yield(self.telemetry, day, now)
            .await
            .inspect_err(|error| warn!("failed to query the forecast: {error:#}"))
            .ok()
            .flatten();
        let recent = Interval::from_std((now - self.settings.recent())..now);
        let recent_generation = self
            .telemetry
            .get_series(Series::GenerationPower, recent)
            .await
            .inspect_err(|error| warn!("failed to query the recent generation: {error:#}"))
            .ok()
            .and_then(|points| telemetry::mean(&points));

        let [fast, linear, slow] = Method::ALL
            .map(|method| scale::apply(window.start, window.end, now, start_soc, desired_end, method));
        let mut info = TargetInfo {
            now,
            window,
            live_soc,
            start_soc,
            desired_end,
            fast,
            linear,
            slow,
            method: Method::Linear,
            forecast,
            recent_generation,
        };
        info.method = self.select_method(&info, local_now.month());
        info!(%info, ?forecast, ?recent_generation, "computed");
        Ok(info)
    }

    /// Generation window of today, ending early when the plan exports within it.
    async fn window(&self, plan: &Plan, now: DateTime<Utc>) -> Interval {
        let date = now.with_timezone(&self.timezone).date_naive();
        let window =
            telemetry::generation_window(self.telemetry, date, self.timezone, self.settings.window_inset())
                .await;
        let first_export = plan
            .within(window)
            .find(|slot| slot.action.is_some_and(|action| action.is_exporting()))
            .map(|slot| slot.start)
            .filter(|start| *start > window.start);
        match first_export {
            Some(start) => window.with_end(start),
            None => window,
        }
    }

    fn select_method(&self, info: &TargetInfo, month: u32) -> Method {
        let settings = &self.settings;
        if info.recent_generation.is_some_and(|watts| watts < settings.low_generation_watts)
            && info.live_soc < info.slow
        {
            return Method::Fast;
        }
        if info.forecast.is_some_and(|forecast| forecast < settings.min_forecast_kwh) {
            return Method::Fast;
        }
        let (first_month, last_month) = settings.summer_months;
        if info.forecast.is_some_and(|forecast| forecast >= settings.high_forecast_kwh)
            && (first_month..=last_month).contains(&month)
            && info.recent_generation.is_some_and(|watts| watts >= settings.strong_generation_watts)
        {
            return Method::Slow;
        }
        Method::Linear
    }
}
