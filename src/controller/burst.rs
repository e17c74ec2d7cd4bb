use std::fmt::{Display, Formatter};

use chrono::{DateTime, NaiveTime, TimeDelta, Timelike, Utc};

use crate::{
    battery::{round_to_device_step, step_down, step_up},
    controller::{Change, report, window::LAST_MINUTE},
    device::{DeviceSettings, GridWindow, read_settings},
    journal::record,
    ops::Interval,
    prelude::*,
    services::Services,
    settings::BurstSettings,
    store::load_with_fallback,
    target::{TargetInfo, TargetService},
    telemetry::{self, Series},
};

/// Intraday charge-rate correction while the plan prefers storing.
#[instrument(skip_all)]
pub async fn burst(services: &Services) -> Result<Vec<Change>> {
    let now = services.clock.now();
    let settings = &services.settings;
    let Some(loaded) = load_with_fallback(services.store.as_ref(), now)? else {
        error!(%now, "no plan covers now, leaving the device as is");
        return Ok(Vec::new());
    };
    let Some(slot) = loaded.plan.current(now) else {
        error!(%now, "the plan has no current slot, leaving the device as is");
        return Ok(Vec::new());
    };
    if !slot.action_or_default().is_storing() {
        debug!(action = %slot.action_or_default(), "the plan does not store now, skipping");
        return Ok(Vec::new());
    }

    let service = TargetService {
        telemetry: services.telemetry.as_ref(),
        clock: services.clock.as_ref(),
        timezone: settings.timezone,
        settings: settings.target,
    };
    let info = service.compute(&loaded.plan, 100).await?;
    if !info.window.contains(now) {
        debug!(window = ?info.window, "outside the generation window, skipping");
        return Ok(Vec::new());
    }
    if info.live_soc >= i32::from(settings.battery.full) {
        debug!(live_soc = info.live_soc, "the battery is full, skipping");
        return Ok(Vec::new());
    }

    let generation = services
        .telemetry
        .get_series(Series::GenerationPower, info.window.with_end(now))
        .await
        .context("failed to query the generation since the window start")?;
    let peak = telemetry::peak(&generation).unwrap_or_default();
    if peak < settings.burst.min_peak_watts {
        info!(peak, "dull day so far, skipping");
        return Ok(Vec::new());
    }

    let Some(live) =
        read_settings(services.device.as_ref(), services.backoff, &services.cancellation).await?
    else {
        return Ok(Vec::new());
    };

    let recent = Interval::from_std((now - settings.target.recent())..now);
    let output = services
        .telemetry
        .get_series(Series::InverterOutputPower, recent)
        .await
        .inspect_err(|error| warn!("failed to query the inverter output: {error:#}"))
        .ok()
        .and_then(|points| telemetry::mean(&points))
        .unwrap_or_default();
    let observation =
        Observation { generation: info.recent_generation.unwrap_or_default(), output, peak };
    let decision = decide(&settings.burst, &info, observation);
    info!(%decision, ?observation, "decided");

    let battery = settings.battery.battery();
    let transfer = battery.transfer_plan(info.live_soc, 100, now, info.window.end);
    let safety_floor = round_to_device_step(transfer.rate_percent);
    debug!(%transfer, safety_floor, power = %battery.percent_to_power(i32::from(safety_floor)), "safety floor");
    let adjustment = Adjustment { services, now, info: &info, live, safety_floor };
    let (changes, outcome) = adjustment.apply(decision).await?;

    record(
        services.journal.as_ref(),
        now,
        &format!("{info}; {observation}; safety floor {safety_floor}%; {decision}; {outcome}"),
    );
    report(services, "Intraday battery adjustment", &changes, loaded.is_fallback).await;
    Ok(changes)
}

/// Power readings the decision is based on, in watts.
#[derive(Copy, Clone, Debug)]
struct Observation {
    /// Mean generation over the recent minutes.
    generation: f64,

    /// Mean inverter output over the recent minutes.
    output: f64,

    /// Peak generation since the window start.
    peak: f64,
}

impl Display for Observation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "generation {:.0} W, output {:.0} W, peak {:.0} W",
            self.generation, self.output, self.peak,
        )
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Decision {
    Hold(&'static str),
    Raise(&'static str),
    Lower(&'static str),

    /// Open a short export window down to the target.
    Export(&'static str),
}

impl Decision {
    const fn reason(self) -> &'static str {
        match self {
            Self::Hold(reason) | Self::Raise(reason) | Self::Lower(reason) | Self::Export(reason) => {
                reason
            }
        }
    }
}

impl Display for Decision {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hold(reason) => write!(f, "hold: {reason}"),
            Self::Raise(reason) => write!(f, "raise: {reason}"),
            Self::Lower(reason) => write!(f, "lower: {reason}"),
            Self::Export(reason) => write!(f, "export: {reason}"),
        }
    }
}

fn decide(settings: &BurstSettings, info: &TargetInfo, observation: Observation) -> Decision {
    let ahead = info.live_soc - info.target();

    if observation.generation >= settings.high_generation_watts {
        return if observation.output >= settings.high_output_watts {
            Decision::Raise("possible curtailment")
        } else if ahead > settings.near_target {
            Decision::Lower("ahead of target")
        } else if ahead < -settings.near_target {
            Decision::Raise("behind target")
        } else {
            Decision::Hold("on target")
        };
    }

    let had_strong_peak = observation.peak >= settings.high_generation_watts;
    let has_dropped = observation.generation < observation.peak * settings.drop_ratio;
    let is_early = info.now < info.window.start + info.window.len() / 2;
    if had_strong_peak && has_dropped && ahead >= settings.ahead_margin {
        Decision::Export("generation dropped after a spike")
    } else if had_strong_peak && is_early && ahead >= -settings.near_target {
        Decision::Lower("reserving headroom after a strong start")
    } else {
        Decision::Hold("generation is low")
    }
}

struct Adjustment<'a> {
    services: &'a Services,
    now: DateTime<Utc>,
    info: &'a TargetInfo,
    live: DeviceSettings,

    /// Lowest charge rate that still fills the battery by the window end.
    safety_floor: u8,
}

impl Adjustment<'_> {
    /// Write the decision, returning the changes and a description of the outcome.
    async fn apply(&self, decision: Decision) -> Result<(Vec<Change>, String)> {
        let live_rate = self.live.battery_charge_rate;
        let candidate = match decision {
            Decision::Export(reason) => return self.export(reason).await,
            Decision::Hold(_) => live_rate,
            Decision::Raise(_) => step_up(live_rate).max(live_rate),
            Decision::Lower(_) => step_down(live_rate).min(live_rate),
        };
        let wanted = candidate.max(self.safety_floor);
        let rate = if wanted == live_rate { live_rate } else { round_to_device_step(i32::from(wanted)) };
        if rate == live_rate {
            let outcome = match decision {
                Decision::Lower(_) if candidate < live_rate => {
                    format!("held by the safety floor at {live_rate}%")
                }
                Decision::Hold(_) => "left as is".to_owned(),
                _ => format!("already at {live_rate}%"),
            };
            return Ok((Vec::new(), outcome));
        }
        let reason = if candidate < self.safety_floor {
            format!("{}, raised to the safety floor", decision.reason())
        } else {
            decision.reason().to_owned()
        };
        self.services.device.set_battery_charge_rate(rate).await?;
        let change = Change {
            setting: "battery charge rate",
            from: format!("{live_rate}%"),
            to: format!("{rate}%"),
            reason,
        };
        Ok((vec![change], format!("charge rate {live_rate}% → {rate}%")))
    }

    async fn export(&self, reason: &str) -> Result<(Vec<Change>, String)> {
        let settings = &self.services.settings;
        let local_now = self.now.with_timezone(&settings.timezone).time();
        let live = self.live.discharge_to_grid;
        if live.is_enabled && live.contains(local_now) {
            return Ok((Vec::new(), format!("export already running: {live}")));
        }
        let floor = self.info.target().clamp(i32::from(settings.battery.reserve), 100);
        let window = export_window(local_now, settings.burst.export_duration(), u8::try_from(floor)?)?;
        self.services.device.set_discharge_to_grid(window).await?;
        let change = Change {
            setting: "discharge to grid",
            from: live.to_string(),
            to: window.to_string(),
            reason: reason.to_owned(),
        };
        Ok((vec![change], format!("export window {window}")))
    }
}

/// Export window starting at the current minute, cut at 23:59 instead of wrapping past midnight.
fn export_window(local_now: NaiveTime, duration: TimeDelta, limit: u8) -> Result<GridWindow> {
    let start = NaiveTime::from_hms_opt(local_now.hour(), local_now.minute(), 0)
        .context("invalid local time")?;
    let (stop, overflow) = start.overflowing_add_signed(duration);
    Ok(GridWindow { is_enabled: true, start, stop: if overflow == 0 { stop } else { LAST_MINUTE }, limit })
}
