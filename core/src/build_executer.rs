use std::collections::HashSet;

use anyhow::Context;

use crate::dependency_graph::TaskDependencyGraph;
use crate::error::BuildError;
use crate::events::EventBus;
use crate::executor;
use crate::logger::Logger;
use crate::project::{Project, ProjectGraph, ProjectState, Task, TaskId, TaskState};

/// The work behind a single task.
pub trait TaskAction {
    fn run(&mut self, task: &Task, project: &Project) -> anyhow::Result<()>;
}

/// Runs each of the task's commands in the project directory.
pub struct ShellTaskAction {
    runtime: tokio::runtime::Runtime,
    logger: Logger,
}

impl ShellTaskAction {
    pub fn new(logger: Logger) -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to start process runtime")?;
        Ok(Self { runtime, logger })
    }
}

impl TaskAction for ShellTaskAction {
    fn run(&mut self, task: &Task, project: &Project) -> anyhow::Result<()> {
        let logger = self.logger.clone();
        let results = self.runtime.block_on(executor::execute_steps(
            &task.commands,
            &project.dir,
            move |line| logger.info(&line),
        ))?;

        for (command, result) in task.commands.iter().zip(&results) {
            self.logger.debug(&format!(
                "{} `{}` finished in {:.2}s",
                task.path,
                command.join(" "),
                result.duration
            ));
            if let Some(reason) = result.failure_reason() {
                anyhow::bail!(reason);
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionSummary {
    pub outcomes: Vec<(TaskId, TaskState)>,
}

impl ExecutionSummary {
    pub fn executed(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.outcomes
            .iter()
            .filter(|(_, state)| matches!(state, TaskState::Executed))
            .map(|(id, _)| *id)
    }
}

/// Runs a selected task set in dependency order, firing task events around
/// each task. Stops at the first failure.
pub struct BuildExecuter {
    action: Box<dyn TaskAction>,
    logger: Logger,
}

impl BuildExecuter {
    pub fn new(action: Box<dyn TaskAction>, logger: Logger) -> Self {
        Self { action, logger }
    }

    pub fn execute(
        &mut self,
        graph: &ProjectGraph,
        bus: &EventBus,
        selected: &[TaskId],
        excluded: &HashSet<TaskId>,
    ) -> Result<ExecutionSummary, BuildError> {
        let dependencies = TaskDependencyGraph::from_tasks(graph, selected, excluded)?;
        let layers = dependencies.topological_sort(graph)?;
        let mut summary = ExecutionSummary::default();

        for id in layers.into_iter().flatten() {
            let task = graph
                .task(id)
                .ok_or_else(|| anyhow::anyhow!("Task {} vanished from the project graph", id))?;
            let project = graph
                .project(task.project)
                .ok_or_else(|| anyhow::anyhow!("Project of task {} is missing", task.path))?;

            bus.before_execute(task);
            let state = self.run_task(task, project);
            bus.after_execute(task, &state);

            summary.outcomes.push((id, state.clone()));

            if let TaskState::Failed(reason) = state {
                return Err(BuildError::TaskFailed {
                    task: task.path.clone(),
                    reason,
                });
            }
        }

        Ok(summary)
    }

    fn run_task(&mut self, task: &Task, project: &Project) -> TaskState {
        if !task.enabled || matches!(project.state, Some(ProjectState::Skipped)) {
            self.logger.debug(&format!("Skipping disabled task {}", task.path));
            return TaskState::Skipped;
        }

        if task.commands.is_empty() {
            return TaskState::UpToDate;
        }

        match self.action.run(task, project) {
            Ok(()) => TaskState::Executed,
            Err(e) => TaskState::Failed(format!("{:#}", e)),
        }
    }
}
