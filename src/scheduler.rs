//! Long-running loop firing the planner and the controllers.

use std::{sync::Arc, time::Duration};

use bon::Builder;
use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use tokio::{
    select,
    sync::Mutex,
    time::{MissedTickBehavior, interval, sleep},
};

use crate::{
    api::heartbeat,
    controller,
    planner,
    prelude::*,
    services::Services,
    telemetry::local_time,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, derive_more::Display)]
pub enum Job {
    #[display("plan")]
    Plan,

    #[display("reconcile")]
    Reconcile,

    #[display("burst")]
    Burst,
}

impl Job {
    /// Run the job once.
    pub async fn run(self, services: &Services) -> Result {
        match self {
            Self::Plan => {
                let strategy = planner::from_settings(&services.settings);
                planner::run(services, strategy.as_ref(), false).await?;
            }
            Self::Reconcile => {
                controller::reconcile(services).await?;
            }
            Self::Burst => {
                controller::burst(services).await?;
            }
        }
        Ok(())
    }
}

#[derive(Builder)]
pub struct Scheduler {
    services: Services,
    heartbeat: heartbeat::Client,

    #[builder(into)]
    reconcile_interval: Duration,

    #[builder(into)]
    burst_interval: Duration,

    #[builder(skip)]
    guards: Guards,
}

/// One lock per job, held for the duration of a run.
#[derive(Default)]
struct Guards {
    plan: Arc<Mutex<()>>,
    reconcile: Arc<Mutex<()>>,
    burst: Arc<Mutex<()>>,
}

impl Guards {
    fn get(&self, job: Job) -> &Arc<Mutex<()>> {
        match job {
            Job::Plan => &self.plan,
            Job::Reconcile => &self.reconcile,
            Job::Burst => &self.burst,
        }
    }
}

impl Scheduler {
    /// Run until the cancellation token fires, then wait for the running jobs.
    pub async fn run(self) -> Result {
        let this = Arc::new(self);
        let cancellation = this.services.cancellation.clone();
        let settings = &this.services.settings;

        let mut reconcile_interval = interval(this.reconcile_interval);
        reconcile_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut burst_interval = interval(this.burst_interval);
        burst_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            plan_at = %settings.planner.run_at,
            reconcile_interval = ?this.reconcile_interval,
            burst_interval = ?this.burst_interval,
            "serving…",
        );
        loop {
            let now = this.services.clock.now();
            let next_plan = next_run(now, settings.planner.run_at, settings.timezone);
            debug!(%next_plan, "next planning run");
            let until_plan = (next_plan - now).to_std().unwrap_or(Duration::ZERO);

            select! {
                () = cancellation.cancelled() => break,
                () = sleep(until_plan) => this.spawn(Job::Plan),
                _ = reconcile_interval.tick() => this.spawn(Job::Reconcile),
                _ = burst_interval.tick() => this.spawn(Job::Burst),
            }
        }

        info!("stopping, waiting for the running jobs…");
        for job in [Job::Plan, Job::Reconcile, Job::Burst] {
            drop(this.guards.get(job).lock().await);
        }
        Ok(())
    }

    /// Start the job in the background, unless its previous run is still going.
    fn spawn(self: &Arc<Self>, job: Job) {
        let Ok(guard) = Arc::clone(self.guards.get(job)).try_lock_owned() else {
            warn!(%job, "the previous run is still going, skipping");
            return;
        };
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let _guard = guard;
            let handle = {
                let this = Arc::clone(&this);
                tokio::spawn(async move { job.run(&this.services).await })
            };
            match handle.await {
                Ok(Ok(())) => {
                    info!(%job, "done");
                    this.heartbeat.send().await;
                }
                Ok(Err(error)) => error!(%job, "failed: {error:#}"),
                Err(error) => error!(%job, "crashed: {error}"),
            }
        });
    }
}

/// First occurrence of the local time strictly after now.
#[must_use]
pub fn next_run(now: DateTime<Utc>, at: NaiveTime, timezone: Tz) -> DateTime<Utc> {
    let today = now.with_timezone(&timezone).date_naive();
    today
        .iter_days()
        .map(|date| local_time(date, at, timezone))
        .find(|run_at| *run_at > now)
        .unwrap_or(now)
}
