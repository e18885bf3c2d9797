use std::time::Instant;

use super::{BuildHistory, BuildHistoryEntry};
use crate::events::{BuildListener, ProjectEvaluationListener, TaskExecutionListener};
use crate::orchestrator::BuildResult;
use crate::project::{Task, TaskState};
use crate::settings::InvocationRequest;

/// Appends one entry per run to the persisted build history.
pub struct HistoryListener {
    history: BuildHistory,
    entry: Option<BuildHistoryEntry>,
    started: Option<Instant>,
}

impl HistoryListener {
    pub fn new(history: BuildHistory) -> Self {
        Self {
            history,
            entry: None,
            started: None,
        }
    }

    pub fn history(&self) -> &BuildHistory {
        &self.history
    }
}

impl BuildListener for HistoryListener {
    fn build_started(&mut self, request: &InvocationRequest) -> anyhow::Result<()> {
        self.entry = Some(BuildHistoryEntry::new(request.task_names.clone()));
        self.started = Some(Instant::now());
        Ok(())
    }

    fn build_finished(&mut self, result: &BuildResult) -> anyhow::Result<()> {
        let Some(mut entry) = self.entry.take() else {
            return Ok(());
        };
        let duration = self
            .started
            .take()
            .map(|s| s.elapsed().as_secs_f64())
            .unwrap_or(0.0);

        entry.finalize(duration, result.failure().map(|e| e.to_string()));
        self.history.add_entry(entry)
    }
}

impl ProjectEvaluationListener for HistoryListener {}

impl TaskExecutionListener for HistoryListener {
    fn after_execute(&mut self, _task: &Task, state: &TaskState) -> anyhow::Result<()> {
        if let Some(entry) = self.entry.as_mut() {
            match state {
                TaskState::Executed => entry.tasks_executed += 1,
                TaskState::Failed(_) => entry.tasks_failed += 1,
                TaskState::UpToDate | TaskState::Skipped => {}
            }
        }
        Ok(())
    }
}
