//! [Octopus Energy](https://developer.octopus.energy/rest/) public tariff client.

use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde::Deserialize;

use crate::{
    api::client,
    ops::Interval,
    plan::{PriceSlot, SLOT_DURATION},
    prelude::*,
    quantity::rate::KilowattHourRate,
};

const BASE_URL: &str = "https://api.octopus.energy/v1/products";

pub struct Api(Client);

impl Api {
    pub fn try_new() -> Result<Self> {
        Ok(Self(client::try_new()?))
    }

    /// Unit rates of the tariff overlapping the interval, ordered by start.
    #[instrument(skip_all, fields(tariff = tariff))]
    pub async fn get_unit_rates(&self, tariff: &str, interval: Interval) -> Result<Vec<UnitRate>> {
        info!("fetching…");
        let product = product_code(tariff)?;
        let mut url = Url::parse(BASE_URL)?;
        url.path_segments_mut()
            .map_err(|()| anyhow!("invalid base URL"))?
            .push(product)
            .push("electricity-tariffs")
            .push(tariff)
            .push("standard-unit-rates")
            .push("");
        url.query_pairs_mut()
            .append_pair("period_from", &interval.start.to_rfc3339())
            .append_pair("period_to", &interval.end.to_rfc3339())
            .append_pair("page_size", "1500");

        let mut rates = Vec::new();
        let mut next = Some(url);
        while let Some(url) = next {
            let page = self
                .0
                .get(url)
                .send()
                .await
                .context("failed to call")?
                .error_for_status()
                .context("request failed")?
                .json::<Page>()
                .await
                .context("failed to deserialize the response")?;
            rates.extend(page.results);
            next = page.next.as_deref().map(Url::parse).transpose()?;
        }
        rates.sort_by_key(|rate| rate.valid_from);
        info!(n_rates = rates.len(), "fetched");
        Ok(rates)
    }

    /// Half-hour slots within the interval for which both tariffs have a rate.
    #[instrument(skip_all)]
    pub async fn get_prices(
        &self,
        interval: Interval,
        import_tariff: &str,
        export_tariff: &str,
    ) -> Result<Vec<PriceSlot>> {
        let import_rates = self.get_unit_rates(import_tariff, interval).await?;
        let export_rates = self.get_unit_rates(export_tariff, interval).await?;
        Ok(merge(interval, &import_rates, &export_rates))
    }
}

/// Derive the product code from a tariff code: `E-1R-AGILE-24-10-01-C` is `AGILE-24-10-01`.
fn product_code(tariff: &str) -> Result<&str> {
    let (_, rest) = tariff
        .strip_prefix("E-")
        .and_then(|rest| rest.split_once('-'))
        .with_context(|| format!("`{tariff}` is not an electricity tariff code"))?;
    let (product, region) =
        rest.rsplit_once('-').with_context(|| format!("`{tariff}` has no region suffix"))?;
    ensure!(region.len() == 1, "`{tariff}` has an unexpected region suffix");
    Ok(product)
}

fn merge(interval: Interval, import_rates: &[UnitRate], export_rates: &[UnitRate]) -> Vec<PriceSlot> {
    let mut slots = Vec::new();
    let mut start = interval.start;
    while start < interval.end {
        match (rate_at(import_rates, start), rate_at(export_rates, start)) {
            (Some(buy), Some(sell)) => slots.push(PriceSlot { start, buy, sell }),
            (buy, sell) => debug!(%start, ?buy, ?sell, "incomplete prices, skipping"),
        }
        start += SLOT_DURATION;
    }
    slots
}

fn rate_at(rates: &[UnitRate], at: DateTime<Utc>) -> Option<KilowattHourRate> {
    rates.iter().rev().find(|rate| rate.covers(at)).map(|rate| rate.value)
}

#[derive(Deserialize)]
struct Page {
    next: Option<String>,
    results: Vec<UnitRate>,
}

/// Pence per kilowatt-hour including VAT, valid until `valid_to` or further notice.
#[must_use]
#[derive(Copy, Clone, Debug, Deserialize)]
pub struct UnitRate {
    #[serde(rename = "value_inc_vat")]
    pub value: KilowattHourRate,

    pub valid_from: DateTime<Utc>,

    pub valid_to: Option<DateTime<Utc>>,
}

impl UnitRate {
    #[must_use]
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        self.valid_from <= at && self.valid_to.is_none_or(|valid_to| at < valid_to)
    }
}
