use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    clock::Clock,
    device::Device,
    journal::Journal,
    notify::Notifier,
    retry::Backoff,
    settings::Settings,
    store::PlanStore,
    telemetry::Telemetry,
};

/// Collaborators shared by the jobs.
#[derive(Clone)]
pub struct Services {
    pub device: Arc<dyn Device>,
    pub telemetry: Arc<dyn Telemetry>,
    pub store: Arc<dyn PlanStore>,
    pub notifier: Arc<dyn Notifier>,
    pub journal: Arc<dyn Journal>,
    pub clock: Arc<dyn Clock>,
    pub settings: Arc<Settings>,

    /// Polling policy for the device's busy marker.
    pub backoff: Backoff,

    pub cancellation: CancellationToken,
}
