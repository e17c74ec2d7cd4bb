//! Append-only log of intraday decisions.

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
};

use chrono::{DateTime, SecondsFormat, Utc};

use crate::prelude::*;

pub trait Journal: Send + Sync {
    fn append(&self, at: DateTime<Utc>, entry: &str) -> Result;
}

/// Record the entry, logging any failure instead of returning it.
pub fn record(journal: &dyn Journal, at: DateTime<Utc>, entry: &str) {
    if let Err(error) = journal.append(at, entry) {
        warn!("failed to append to the journal: {error:#}");
    }
}

pub struct FileJournal {
    path: PathBuf,
}

impl FileJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Journal for FileJournal {
    fn append(&self, at: DateTime<Utc>, entry: &str) -> Result {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create `{}`", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open `{}`", self.path.display()))?;
        writeln!(file, "{} {entry}", at.to_rfc3339_opts(SecondsFormat::Secs, true))?;
        Ok(())
    }
}
