//! [Home Assistant](https://developers.home-assistant.io/docs/api/rest/) REST client.

mod history;

use std::{str::FromStr, time::Duration};

use reqwest::{
    Client,
    ClientBuilder,
    Url,
    header::{AUTHORIZATION, HeaderMap, HeaderValue},
};
use serde::de::DeserializeOwned;

pub use self::history::{EntitiesHistory, State};
use crate::{ops::Interval, prelude::*};

pub struct Api {
    client: Client,
    base_url: Url,
}

impl Api {
    /// The base URL includes the `/api` path, for example: `http://localhost:8123/api`.
    pub fn try_new(access_token: &str, base_url: Url) -> Result<Self> {
        let headers = HeaderMap::from_iter([(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {access_token}"))?,
        )]);
        let client = ClientBuilder::new()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client, base_url })
    }

    /// State changes of the entity within the interval, including the state at its start.
    #[instrument(skip_all, fields(entity_id = entity_id))]
    pub async fn get_history<V>(&self, entity_id: &str, interval: Interval) -> Result<Vec<State<V>>>
    where
        V: FromStr + DeserializeOwned,
        <V as FromStr>::Err: std::fmt::Display,
    {
        debug!("fetching the entity state changes…");
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow!("invalid base URL"))?
            .push("history")
            .push("period")
            .push(&interval.start.to_rfc3339());
        url.query_pairs_mut()
            .append_pair("filter_entity_id", entity_id)
            .append_pair("end_time", &interval.end.to_rfc3339())
            .append_pair("no_attributes", "true");
        let history = self
            .client
            .get(url)
            .send()
            .await
            .context("failed to call")?
            .error_for_status()
            .context("request failed")?
            .json::<EntitiesHistory<V>>()
            .await
            .context("failed to deserialize the history")?;
        let states = history.into_iter().next().map(|entity| entity.0).unwrap_or_default();
        debug!(n_states = states.len(), "fetched");
        Ok(states)
    }

    /// Current state of the entity.
    #[instrument(skip_all, fields(entity_id = entity_id))]
    pub async fn get_state<V>(&self, entity_id: &str) -> Result<State<V>>
    where
        V: FromStr + DeserializeOwned,
        <V as FromStr>::Err: std::fmt::Display,
    {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow!("invalid base URL"))?
            .push("states")
            .push(entity_id);
        self.client
            .get(url)
            .send()
            .await
            .context("failed to call")?
            .error_for_status()
            .context("request failed")?
            .json::<State<V>>()
            .await
            .with_context(|| format!("failed to deserialize the state of `{entity_id}`"))
    }
}
