//! Plan persistence.

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use itertools::Itertools;

use crate::{ops::Interval, plan::{Plan, SLOT_DURATION}, prelude::*};

/// How far back the fallback plan is taken from.
pub const FALLBACK_OFFSET: TimeDelta = TimeDelta::days(2);

pub trait PlanStore: Send + Sync {
    /// The latest-starting plan covering the instant.
    fn load(&self, at: DateTime<Utc>) -> Result<Option<Plan>> {
        Ok(self.load_all(at)?.pop())
    }

    /// Every plan covering the instant, ordered by first slot.
    fn load_all(&self, at: DateTime<Utc>) -> Result<Vec<Plan>>;

    fn save(&self, plan: &Plan) -> Result;
}

#[must_use]
#[derive(Debug)]
pub struct LoadedPlan {
    pub plan: Plan,

    /// The plan was borrowed from two days earlier and should be flagged to the operator.
    pub is_fallback: bool,
}

/// Load the plan covering the instant, or the one covering two days earlier shifted forward.
#[instrument(skip_all, fields(at = %at))]
pub fn load_with_fallback(store: &dyn PlanStore, at: DateTime<Utc>) -> Result<Option<LoadedPlan>> {
    if let Some(plan) = store.load(at)? {
        return Ok(Some(LoadedPlan { plan, is_fallback: false }));
    }
    let Some(plan) = store.load(at - FALLBACK_OFFSET)? else {
        return Ok(None);
    };
    warn!(?plan, "no plan covers the instant, reusing the plan from two days earlier");
    Ok(Some(LoadedPlan { plan: plan.shifted(FALLBACK_OFFSET), is_fallback: true }))
}

const FILENAME_TIME_FORMAT: &str = "%Y-%m-%d_%H-%M";
const EXTENSION: &str = "json";

/// JSON files named after the first and the last slot starts.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn filename(interval: Interval) -> String {
        format!(
            "{}__{}.{EXTENSION}",
            interval.start.format(FILENAME_TIME_FORMAT),
            (interval.end - SLOT_DURATION).format(FILENAME_TIME_FORMAT),
        )
    }

    /// Coverage encoded in the filename, [`None`] for foreign files.
    fn parse_filename(path: &Path) -> Option<Interval> {
        if path.extension()? != EXTENSION {
            return None;
        }
        let (first, last) = path.file_stem()?.to_str()?.split_once("__")?;
        let first = NaiveDateTime::parse_from_str(first, FILENAME_TIME_FORMAT).ok()?.and_utc();
        let last = NaiveDateTime::parse_from_str(last, FILENAME_TIME_FORMAT).ok()?.and_utc();
        (first <= last).then(|| Interval::from_std(first..(last + SLOT_DURATION)))
    }

    fn read(path: &Path) -> Result<Plan> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read `{}`", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to deserialize `{}`", path.display()))
    }
}

impl PlanStore for FileStore {
    fn load_all(&self, at: DateTime<Utc>) -> Result<Vec<Plan>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.root)
            .with_context(|| format!("failed to list `{}`", self.root.display()))?;
        let mut covering = Vec::new();
        for entry in entries {
            let path = entry?.path();
            match Self::parse_filename(&path) {
                Some(interval) if interval.contains(at) => covering.push((interval, path)),
                Some(_) => {}
                None => debug!(path = %path.display(), "skipping a foreign file"),
            }
        }
        covering
            .into_iter()
            .sorted_by_key(|(interval, _)| (interval.start, interval.end))
            .map(|(_, path)| Self::read(&path))
            .filter_ok(|plan| plan.covers(at))
            .collect()
    }

    #[instrument(skip_all, fields(plan = ?plan))]
    fn save(&self, plan: &Plan) -> Result {
        let interval = plan.interval().context("refusing to save an empty plan")?;
        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create `{}`", self.root.display()))?;
        let path = self.root.join(Self::filename(interval));
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, serde_json::to_string_pretty(plan)?)
            .with_context(|| format!("failed to write `{}`", temp_path.display()))?;
        fs::rename(&temp_path, &path)
            .with_context(|| format!("failed to replace `{}`", path.display()))?;
        info!(path = %path.display(), "saved");
        Ok(())
    }
}
