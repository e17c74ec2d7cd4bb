use clap::Parser;
use tokio::signal::ctrl_c;

use crate::{cli::services::ServicesArgs, prelude::*, scheduler::Scheduler, settings::Settings};

#[derive(Parser)]
pub struct ServeArgs {
    #[clap(long, env = "RECONCILE_INTERVAL", default_value = "30min")]
    reconcile_interval: humantime::Duration,

    #[clap(long, env = "BURST_INTERVAL", default_value = "8min")]
    burst_interval: humantime::Duration,

    #[clap(flatten)]
    services: ServicesArgs,
}

impl ServeArgs {
    pub async fn run(self, settings: Settings) -> Result {
        let services = self.services.build(settings)?;

        let cancellation = services.cancellation.clone();
        tokio::spawn(async move {
            match ctrl_c().await {
                Ok(()) => info!("interrupted"),
                Err(error) => error!("failed to listen for the interrupt: {error:#}"),
            }
            cancellation.cancel();
        });

        Scheduler::builder()
            .services(services)
            .heartbeat(self.services.heartbeat.client()?)
            .reconcile_interval(self.reconcile_interval)
            .burst_interval(self.burst_interval)
            .build()
            .run()
            .await
    }
}
