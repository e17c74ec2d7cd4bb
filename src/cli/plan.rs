use clap::Parser;

use crate::{cli::services::ServicesArgs, planner, prelude::*, settings::Settings};

#[derive(Parser)]
pub struct PlanArgs {
    /// Only print the plan, do not save it (dry run).
    #[clap(long)]
    scout: bool,

    #[clap(flatten)]
    services: ServicesArgs,
}

impl PlanArgs {
    pub async fn run(self, settings: Settings) -> Result {
        let services = self.services.build(settings)?;
        let strategy = planner::from_settings(&services.settings);
        planner::run(&services, strategy.as_ref(), self.scout).await?;
        self.services.heartbeat.client()?.send().await;
        Ok(())
    }
}
