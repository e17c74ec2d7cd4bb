use std::time::Duration;

use reqwest::{Client as HttpClient, Url};

use crate::prelude::*;

/// Dead man's switch pinged after every successful job.
pub struct Client {
    inner: HttpClient,
    url: Option<Url>,
}

impl Client {
    pub fn try_new(url: Option<Url>) -> Result<Self> {
        Ok(Self { inner: HttpClient::builder().timeout(Duration::from_secs(3)).build()?, url })
    }

    /// Send the heartbeat if configured, logging any failure.
    #[instrument(skip_all)]
    pub async fn send(&self) {
        let Some(url) = &self.url else {
            return;
        };
        debug!("sending a heartbeat…");
        let result = self.inner.post(url.clone()).send().await.and_then(reqwest::Response::error_for_status);
        if let Err(error) = result {
            warn!("failed to send the heartbeat: {error:#}");
        }
    }
}
