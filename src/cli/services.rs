use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use reqwest::Url;
use tokio_util::sync::CancellationToken;

use crate::{
    api::{Upstream, heartbeat, home_assistant, inverter, ntfy, octopus},
    clock::SystemClock,
    journal::FileJournal,
    notify::{Notifier, Silent},
    prelude::*,
    retry::Backoff,
    services::Services,
    settings::Settings,
    store::FileStore,
};

/// Connections to everything the jobs talk to.
#[derive(Parser)]
pub struct ServicesArgs {
    #[clap(flatten)]
    pub home_assistant: HomeAssistantArgs,

    #[clap(flatten)]
    pub inverter: InverterArgs,

    /// Topic URL for the operator notifications, for example: `https://ntfy.sh/my-battery`.
    #[clap(long = "ntfy-topic-url", env = "NTFY_TOPIC_URL")]
    pub ntfy_topic_url: Option<Url>,

    #[clap(flatten)]
    pub store: StoreArgs,

    /// Append-only log of the intraday decisions.
    #[clap(long = "journal-path", env = "JOURNAL_PATH", default_value = "journal.log")]
    pub journal_path: PathBuf,

    #[clap(flatten)]
    pub heartbeat: HeartbeatArgs,
}

impl ServicesArgs {
    pub fn build(&self, settings: Settings) -> Result<Services> {
        let telemetry = Upstream {
            octopus: octopus::Api::try_new()?,
            home_assistant: home_assistant::Api::try_new(
                &self.home_assistant.access_token,
                self.home_assistant.base_url.clone(),
            )?,
            entities: settings.entities.clone(),
        };
        let notifier: Arc<dyn Notifier> = match &self.ntfy_topic_url {
            Some(topic_url) => Arc::new(ntfy::Api::try_new(topic_url.clone())?),
            None => {
                warn!("no notification topic configured, notifications are disabled");
                Arc::new(Silent)
            }
        };
        Ok(Services {
            device: Arc::new(inverter::Api::try_new(
                &self.inverter.access_token,
                &self.inverter.base_url,
            )?),
            telemetry: Arc::new(telemetry),
            store: Arc::new(self.store.open()),
            notifier,
            journal: Arc::new(FileJournal::new(&self.journal_path)),
            clock: Arc::new(SystemClock),
            settings: Arc::new(settings),
            backoff: Backoff::default(),
            cancellation: CancellationToken::new(),
        })
    }
}

#[derive(Parser)]
pub struct HomeAssistantArgs {
    /// Home Assistant API access token.
    #[clap(long = "home-assistant-access-token", env = "HOME_ASSISTANT_ACCESS_TOKEN")]
    pub access_token: String,

    /// Home Assistant API base URL. For example: `http://localhost:8123/api`.
    #[clap(long = "home-assistant-api-base-url", env = "HOME_ASSISTANT_API_BASE_URL")]
    pub base_url: Url,
}

#[derive(Parser)]
pub struct InverterArgs {
    #[clap(long = "inverter-access-token", env = "INVERTER_ACCESS_TOKEN")]
    pub access_token: String,

    /// Inverter gateway base URL, the settings live under `{base}/settings`.
    #[clap(long = "inverter-api-base-url", env = "INVERTER_API_BASE_URL")]
    pub base_url: Url,
}

#[derive(Parser)]
pub struct StoreArgs {
    /// Directory holding the plan files.
    #[clap(long = "plans-dir", env = "PLANS_DIR", default_value = "plans")]
    pub plans_dir: PathBuf,
}

impl StoreArgs {
    pub fn open(&self) -> FileStore {
        FileStore::new(&self.plans_dir)
    }
}

#[derive(Parser)]
pub struct HeartbeatArgs {
    /// Pinged after every successful job.
    #[clap(long = "heartbeat-url", env = "HEARTBEAT_URL")]
    pub url: Option<Url>,
}

impl HeartbeatArgs {
    pub fn client(&self) -> Result<heartbeat::Client> {
        heartbeat::Client::try_new(self.url.clone())
    }
}
