use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};

use crate::{
    api::{home_assistant, octopus},
    ops::Interval,
    plan::PriceSlot,
    prelude::*,
    settings::Entities,
    telemetry::{Point, Series, Telemetry},
};

/// How far back the historical battery level is looked up.
const BATTERY_LEVEL_LOOKBACK: TimeDelta = TimeDelta::hours(6);

/// Prices from Octopus Energy, everything else from Home Assistant.
pub struct Upstream {
    pub octopus: octopus::Api,
    pub home_assistant: home_assistant::Api,
    pub entities: Entities,
}

impl Upstream {
    fn entity_id(&self, series: Series) -> &str {
        match series {
            Series::GenerationPower => self.entities.generation_power.as_str(),
            Series::InverterOutputPower => self.entities.inverter_output_power.as_str(),
            Series::BatteryLevel => self.entities.battery_level.as_str(),
            Series::Sunrise => self.entities.sunrise.as_str(),
            Series::Sunset => self.entities.sunset.as_str(),
            Series::ForecastYield => self.entities.forecast_yield.as_str(),
        }
    }
}

#[async_trait]
impl Telemetry for Upstream {
    async fn get_prices(
        &self,
        interval: Interval,
        import_tariff: &str,
        export_tariff: &str,
    ) -> Result<Vec<PriceSlot>> {
        self.octopus.get_prices(interval, import_tariff, export_tariff).await
    }

    async fn get_battery_level(&self, at: Option<DateTime<Utc>>) -> Result<u8> {
        let entity_id = self.entity_id(Series::BatteryLevel);
        let value = match at {
            None => self.home_assistant.get_state::<f64>(entity_id).await?.value,
            Some(at) => {
                let interval = Interval::from_std((at - BATTERY_LEVEL_LOOKBACK)..at);
                self.home_assistant
                    .get_history::<f64>(entity_id, interval)
                    .await?
                    .into_iter()
                    .filter(|state| state.last_changed_at <= at)
                    .max_by_key(|state| state.last_changed_at)
                    .with_context(|| format!("no battery level known at {at}"))?
                    .value
            }
        };
        to_percent(value)
    }

    async fn get_series(&self, series: Series, interval: Interval) -> Result<Vec<Point>> {
        let entity_id = self.entity_id(series);
        let points = match series {
            Series::Sunrise | Series::Sunset => self
                .home_assistant
                .get_history::<DateTime<Utc>>(entity_id, interval)
                .await?
                .into_iter()
                .map(|state| Point::new(state.value, 0.0))
                .filter(|point| interval.contains(point.at))
                .collect(),
            _ => self
                .home_assistant
                .get_history::<f64>(entity_id, interval)
                .await?
                .into_iter()
                .map(|state| Point::new(state.last_changed_at, state.value))
                .collect(),
        };
        Ok(points)
    }
}

#[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_percent(value: f64) -> Result<u8> {
    ensure!(value.is_finite(), "battery level `{value}` is not a number");
    Ok(value.round().clamp(0.0, 100.0) as u8)
}
