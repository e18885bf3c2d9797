pub mod listener;
pub mod storage;

pub use listener::HistoryListener;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildHistoryEntry {
    pub timestamp: DateTime<Local>,
    pub tasks: Vec<String>,
    pub duration: f64,
    pub success: bool,
    #[serde(default)]
    pub failure: Option<String>,
    pub tasks_executed: usize,
    pub tasks_failed: usize,
}

impl BuildHistoryEntry {
    pub fn new(tasks: Vec<String>) -> Self {
        Self {
            timestamp: Local::now(),
            tasks,
            duration: 0.0,
            success: false,
            failure: None,
            tasks_executed: 0,
            tasks_failed: 0,
        }
    }

    pub fn finalize(&mut self, total_duration: f64, failure: Option<String>) {
        self.duration = total_duration;
        self.success = failure.is_none();
        self.failure = failure;
    }

    /// Requested tasks as typed, or `(default tasks)`.
    pub fn task_label(&self) -> String {
        if self.tasks.is_empty() {
            "(default tasks)".to_string()
        } else {
            self.tasks.join(" ")
        }
    }
}

pub struct BuildHistory {
    entries: Vec<BuildHistoryEntry>,
    storage_path: PathBuf,
    max_builds: usize,
}

impl BuildHistory {
    pub fn new(storage_path: PathBuf, max_builds: usize) -> anyhow::Result<Self> {
        let entries = storage::load_history(&storage_path)?;
        Ok(Self {
            entries,
            storage_path,
            max_builds,
        })
    }

    pub fn add_entry(&mut self, entry: BuildHistoryEntry) -> anyhow::Result<()> {
        self.entries.push(entry);

        if self.entries.len() > self.max_builds {
            let overflow = self.entries.len() - self.max_builds;
            self.entries.drain(..overflow);
        }

        storage::save_history(&self.storage_path, &self.entries)
    }

    pub fn entries(&self) -> &[BuildHistoryEntry] {
        &self.entries
    }

    /// Up to `count` entries, newest first.
    pub fn recent(&self, count: usize) -> impl Iterator<Item = &BuildHistoryEntry> {
        self.entries.iter().rev().take(count)
    }

    pub fn last_entry(&self) -> Option<&BuildHistoryEntry> {
        self.entries.last()
    }

    pub fn clear(&mut self) -> anyhow::Result<()> {
        self.entries.clear();
        storage::save_history(&self.storage_path, &self.entries)
    }
}
