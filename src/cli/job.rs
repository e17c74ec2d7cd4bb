use clap::Parser;

use crate::{cli::services::ServicesArgs, prelude::*, scheduler::Job, settings::Settings};

#[derive(Parser)]
pub struct JobArgs {
    #[clap(flatten)]
    services: ServicesArgs,
}

impl JobArgs {
    /// Run the job once.
    #[instrument(skip_all, fields(job = %job))]
    pub async fn run(self, settings: Settings, job: Job) -> Result {
        let services = self.services.build(settings)?;
        job.run(&services).await?;
        self.services.heartbeat.client()?.send().await;
        Ok(())
    }
}
