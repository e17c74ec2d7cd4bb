//! Inverter gateway speaking a flat register map over HTTP.

use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;
use reqwest::{
    Client,
    ClientBuilder,
    Url,
    header::{AUTHORIZATION, HeaderMap, HeaderValue},
};

use crate::{
    device::{Device, GridWindow, RawSettings, register},
    prelude::*,
};

pub struct Api {
    client: Client,
    settings_url: Url,
}

impl Api {
    pub fn try_new(access_token: &str, base_url: &Url) -> Result<Self> {
        let headers = HeaderMap::from_iter([(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {access_token}"))?,
        )]);
        let client = ClientBuilder::new()
            .default_headers(headers)
            .timeout(Duration::from_secs(20))
            .build()?;
        let mut settings_url = base_url.clone();
        settings_url
            .path_segments_mut()
            .map_err(|()| anyhow!("invalid base URL"))?
            .pop_if_empty()
            .push("settings");
        Ok(Self { client, settings_url })
    }

    #[instrument(skip_all, fields(n_registers = registers.0.len()))]
    async fn write(&self, registers: RawSettings) -> Result {
        debug!(?registers, "writing…");
        self.client
            .post(self.settings_url.clone())
            .json(&registers)
            .send()
            .await
            .context("failed to call")?
            .error_for_status()
            .context("the device rejected the settings")?;
        Ok(())
    }
}

#[async_trait]
impl Device for Api {
    #[instrument(skip_all)]
    async fn get_settings(&self) -> Result<RawSettings> {
        self.client
            .get(self.settings_url.clone())
            .send()
            .await
            .context("failed to call")?
            .error_for_status()
            .context("request failed")?
            .json::<RawSettings>()
            .await
            .context("failed to deserialize the settings")
    }

    async fn set_charge_from_grid(&self, window: GridWindow) -> Result {
        self.write(window.to_charge_registers()).await
    }

    async fn set_discharge_to_grid(&self, window: GridWindow) -> Result {
        self.write(window.to_discharge_registers()).await
    }

    async fn set_battery_charge_rate(&self, percent: u8) -> Result {
        self.write(rate_registers(register::BATTERY_CHARGE_RATE, percent)).await
    }

    async fn set_battery_discharge_rate(&self, percent: u8) -> Result {
        self.write(rate_registers(register::BATTERY_DISCHARGE_RATE, percent)).await
    }
}

fn rate_registers(register: &str, percent: u8) -> RawSettings {
    RawSettings(BTreeMap::from([(register.to_owned(), percent.to_string())]))
}
