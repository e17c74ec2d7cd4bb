//! [ntfy](https://docs.ntfy.sh/publish/)-style push notifications.

use async_trait::async_trait;
use http::HeaderName;
use reqwest::{Client, Url};

use crate::{api::client, notify::Notifier, prelude::*};

const TITLE: HeaderName = HeaderName::from_static("title");

pub struct Api {
    client: Client,
    topic_url: Url,
}

impl Api {
    pub fn try_new(topic_url: Url) -> Result<Self> {
        Ok(Self { client: client::try_new()?, topic_url })
    }
}

#[async_trait]
impl Notifier for Api {
    #[instrument(skip_all, fields(title = title))]
    async fn send(&self, title: &str, body: &str) -> Result {
        self.client
            .post(self.topic_url.clone())
            .header(TITLE, title)
            .body(body.to_owned())
            .send()
            .await
            .context("failed to call")?
            .error_for_status()
            .context("the notification was rejected")?;
        info!("sent");
        Ok(())
    }
}
