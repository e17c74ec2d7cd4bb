//! Reconciliation of the live device settings against the plan.

mod burst;
mod periodic;
mod window;

use std::fmt::{Display, Formatter};

pub use self::{burst::burst, periodic::reconcile};
use crate::{notify::notify, prelude::*, services::Services, tables::build_changes_table};

/// Applied device write with its justification.
#[must_use]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Change {
    pub setting: &'static str,
    pub from: String,
    pub to: String,
    pub reason: String,
}

impl Display for Change {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} → {} ({})", self.setting, self.from, self.to, self.reason)
    }
}

/// Announce the changes, if any.
async fn report(services: &Services, title: &str, changes: &[Change], is_fallback: bool) {
    if changes.is_empty() {
        debug!("nothing changed");
        return;
    }
    for change in changes {
        info!(%change, "applied");
    }
    let mut body = build_changes_table(changes).to_string();
    if is_fallback {
        body.push_str("\nNo plan covers now, the plan from two days ago is being reused.");
    }
    notify(services.notifier.as_ref(), title, &body).await;
}
