mod job;
mod plan;
mod serve;
mod services;
mod show;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::cli::{job::JobArgs, plan::PlanArgs, serve::ServeArgs, show::ShowArgs};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
#[must_use]
pub struct Args {
    /// TOML file with the tunables, the defaults are used when it does not exist.
    #[clap(long = "settings", env = "SETTINGS_PATH", default_value = "heron.toml")]
    pub settings_path: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Fetch the prices, plan until tomorrow night, and save the plan.
    #[clap(name = "plan")]
    Plan(Box<PlanArgs>),

    /// Bring the inverter settings in line with the current plan slot.
    #[clap(name = "reconcile")]
    Reconcile(Box<JobArgs>),

    /// Nudge the battery charge rate along with the generation while the plan stores.
    #[clap(name = "burst")]
    Burst(Box<JobArgs>),

    /// Print the plan covering the instant.
    #[clap(name = "show")]
    Show(Box<ShowArgs>),

    /// Keep running, firing each job on its own cadence.
    #[clap(name = "serve")]
    Serve(Box<ServeArgs>),
}
