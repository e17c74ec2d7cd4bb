use chrono::{DateTime, Utc};
use clap::Parser;

use crate::{
    cli::services::StoreArgs,
    prelude::*,
    settings::Settings,
    store::load_with_fallback,
    tables::build_plan_table,
};

#[derive(Parser)]
pub struct ShowArgs {
    /// Instant to look the plan up for, RFC 3339. Defaults to now.
    #[clap(long)]
    at: Option<DateTime<Utc>>,

    #[clap(flatten)]
    store: StoreArgs,
}

impl ShowArgs {
    pub fn run(self, settings: &Settings) -> Result {
        let at = self.at.unwrap_or_else(Utc::now);
        let Some(loaded) = load_with_fallback(&self.store.open(), at)? else {
            bail!("no plan covers {at}");
        };
        if loaded.is_fallback {
            warn!("showing the plan from two days earlier");
        }
        println!("{}", build_plan_table(&loaded.plan, settings.timezone));
        let plan = &loaded.plan;
        match plan.current(at) {
            Some(slot) => info!(start = %slot.start, action = %slot.action_or_default(), "current slot"),
            None => warn!(%at, "no current slot"),
        }
        if let Some(slot) = plan.previous(at) {
            info!(start = %slot.start, action = %slot.action_or_default(), "previous slot");
        }
        if let Some(slot) = plan.next(at) {
            info!(start = %slot.start, action = %slot.action_or_default(), "next slot");
        }
        Ok(())
    }
}
