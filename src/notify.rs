//! Operator notifications.

use async_trait::async_trait;

use crate::prelude::*;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, title: &str, body: &str) -> Result;
}

/// Deliver the message, logging any failure instead of returning it.
pub async fn notify(notifier: &dyn Notifier, title: &str, body: &str) {
    if let Err(error) = notifier.send(title, body).await {
        warn!(title, "failed to send the notification: {error:#}");
    }
}

/// Drops every message.
pub struct Silent;

#[async_trait]
impl Notifier for Silent {
    async fn send(&self, title: &str, _body: &str) -> Result {
        debug!(title, "notifications are disabled");
        Ok(())
    }
}
