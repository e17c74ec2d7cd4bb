#![allow(clippy::doc_markdown)]
#![doc = include_str!("../README.md")]

mod api;
mod battery;
mod cli;
mod clock;
mod controller;
mod device;
mod journal;
mod notify;
mod ops;
mod plan;
mod planner;
mod prelude;
mod quantity;
mod retry;
mod scale;
mod scheduler;
mod services;
mod settings;
mod store;
mod tables;
mod target;
mod telemetry;
#[cfg(test)]
mod testing;

use clap::{Parser, crate_version};
use tracing_subscriber::EnvFilter;

use crate::{
    cli::{Args, Command},
    prelude::*,
    scheduler::Job,
    settings::Settings,
};

#[tokio::main]
async fn main() -> Result {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .without_time()
        .compact()
        .init();
    info!(version = crate_version!(), "starting…");

    let args = Args::parse();
    let settings = Settings::read_from(&args.settings_path)?;

    match args.command {
        Command::Plan(args) => args.run(settings).await?,
        Command::Reconcile(args) => args.run(settings, Job::Reconcile).await?,
        Command::Burst(args) => args.run(settings, Job::Burst).await?,
        Command::Show(args) => args.run(&settings)?,
        Command::Serve(args) => args.run(settings).await?,
    }

    info!("done!");
    Ok(())
}
