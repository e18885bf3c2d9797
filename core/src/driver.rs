use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;

use crate::build_executer::BuildExecuter;
use crate::error::BuildError;
use crate::events::EventBus;
use crate::project::{Project, ProjectGraph, TaskId};
use crate::settings::InvocationRequest;

/// What a driver gets to work with while executing one unit.
pub struct ExecutionContext<'a> {
    pub graph: &'a ProjectGraph,
    pub bus: &'a EventBus,
    pub executer: &'a mut BuildExecuter,
}

/// Graph plus cursor: hands the orchestrator one unit of work at a time.
pub trait ExecutionDriver {
    fn has_next(&self) -> bool;

    /// Binds the next unit to the just loaded (or reused) graph.
    fn select(&mut self, graph: &ProjectGraph) -> Result<(), BuildError>;

    /// Label of the selected unit, for logging.
    fn description(&self) -> String;

    fn execute(&mut self, context: &mut ExecutionContext<'_>) -> Result<(), BuildError>;

    /// True when the last executed unit changed project state in a way the
    /// current graph no longer reflects.
    fn requires_project_reload(&self) -> bool;
}

struct Selection {
    names: Vec<String>,
    tasks: Vec<TaskId>,
    excluded: HashSet<TaskId>,
}

/// Default driver: one unit per requested task name, or a single unit for
/// all of them in a merged build.
pub struct TaskSelectionDriver {
    pending: VecDeque<Vec<String>>,
    defaults_pending: bool,
    excluded_names: Vec<String>,
    current_dir: PathBuf,
    current: Option<Selection>,
    reload_required: bool,
}

impl TaskSelectionDriver {
    pub fn from_request(request: &InvocationRequest) -> Self {
        let pending: VecDeque<Vec<String>> = if request.task_names.is_empty() {
            VecDeque::new()
        } else if request.merged_build {
            VecDeque::from(vec![request.task_names.clone()])
        } else {
            request.task_names.iter().map(|name| vec![name.clone()]).collect()
        };

        Self {
            defaults_pending: pending.is_empty(),
            pending,
            excluded_names: request.excluded_task_names.clone(),
            current_dir: request.current_dir.clone(),
            current: None,
            reload_required: false,
        }
    }

    fn current_project<'g>(&self, graph: &'g ProjectGraph) -> &'g Project {
        graph
            .projects()
            .find(|p| p.dir == self.current_dir)
            .unwrap_or_else(|| graph.root())
    }

    fn resolve(
        &self,
        graph: &ProjectGraph,
        current: &Project,
        name: &str,
    ) -> Result<Vec<TaskId>, BuildError> {
        if name.starts_with(':') {
            return graph
                .find_task(name)
                .map(|task| vec![task.id])
                .ok_or_else(|| BuildError::TaskNotFound {
                    name: name.to_string(),
                    project: ":".to_string(),
                });
        }

        let tasks: Vec<TaskId> = graph
            .subtree(current.id)
            .into_iter()
            .filter(|id| graph.project(*id).map_or(false, Project::is_evaluated))
            .filter_map(|id| graph.task_in_project(id, name).map(|t| t.id))
            .collect();

        if tasks.is_empty() {
            return Err(BuildError::TaskNotFound {
                name: name.to_string(),
                project: current.path.clone(),
            });
        }

        Ok(tasks)
    }
}

impl ExecutionDriver for TaskSelectionDriver {
    fn has_next(&self) -> bool {
        self.defaults_pending || !self.pending.is_empty()
    }

    fn select(&mut self, graph: &ProjectGraph) -> Result<(), BuildError> {
        let current = self.current_project(graph);

        let names = if self.defaults_pending {
            self.defaults_pending = false;
            if current.default_tasks.is_empty() {
                return Err(BuildError::NoTasks);
            }
            current.default_tasks.clone()
        } else {
            self.pending.pop_front().ok_or(BuildError::NoTasks)?
        };

        let mut tasks = Vec::new();
        for name in &names {
            for id in self.resolve(graph, current, name)? {
                if !tasks.contains(&id) {
                    tasks.push(id);
                }
            }
        }

        let mut excluded = HashSet::new();
        for name in &self.excluded_names {
            excluded.extend(self.resolve(graph, current, name)?);
        }

        self.current = Some(Selection {
            names,
            tasks,
            excluded,
        });
        Ok(())
    }

    fn description(&self) -> String {
        match &self.current {
            Some(selection) => {
                let quoted: Vec<String> = selection
                    .names
                    .iter()
                    .map(|n| format!("'{}'", n))
                    .collect();
                format!("primary task(s) {}", quoted.join(", "))
            }
            None => "no selection".to_string(),
        }
    }

    fn execute(&mut self, context: &mut ExecutionContext<'_>) -> Result<(), BuildError> {
        let selection = self
            .current
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("execute called before select"))?;

        let summary = context.executer.execute(
            context.graph,
            context.bus,
            &selection.tasks,
            &selection.excluded,
        )?;

        self.reload_required = summary
            .executed()
            .filter_map(|id| context.graph.task(id))
            .any(|task| task.reconfigures);

        Ok(())
    }

    fn requires_project_reload(&self) -> bool {
        self.reload_required
    }
}
