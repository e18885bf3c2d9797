use crate::error::BuildError;
use crate::events::EventBus;
use crate::logger::Logger;
use crate::project::{ProjectGraph, ProjectId, ProjectState};

/// Evaluates every project of a freshly loaded graph.
pub trait BuildConfigurer {
    fn configure(&mut self, graph: &mut ProjectGraph, bus: &EventBus) -> Result<(), BuildError>;
}

pub struct DefaultBuildConfigurer {
    logger: Logger,
}

impl DefaultBuildConfigurer {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }

    fn evaluate(&self, graph: &ProjectGraph, id: ProjectId) -> ProjectState {
        let Some(project) = graph.project(id) else {
            return ProjectState::Failed(format!("unknown {}", id));
        };

        let parent_disabled = project
            .parent
            .and_then(|p| graph.project(p))
            .map(|p| matches!(p.state, Some(ProjectState::Skipped)))
            .unwrap_or(false);

        if !project.enabled || parent_disabled {
            return ProjectState::Skipped;
        }

        for task in graph.project_tasks(id) {
            for dependency in &task.depends_on {
                if graph.resolve_dependency(task, dependency).is_none() {
                    return ProjectState::Failed(format!(
                        "task {} depends on unknown task '{}'",
                        task.path, dependency
                    ));
                }
            }
        }

        ProjectState::Evaluated
    }
}

impl BuildConfigurer for DefaultBuildConfigurer {
    fn configure(&mut self, graph: &mut ProjectGraph, bus: &EventBus) -> Result<(), BuildError> {
        for id in graph.subtree(graph.root_id()) {
            if let Some(project) = graph.project(id) {
                bus.before_evaluate(project);
            }

            let state = self.evaluate(graph, id);

            if let Some(project) = graph.project_mut(id) {
                project.state = Some(state.clone());
            }
            if let Some(project) = graph.project(id) {
                self.logger
                    .debug(&format!("Evaluated project {}: {}", project.path, state.label()));
                bus.after_evaluate(project, &state);

                if let ProjectState::Failed(reason) = state {
                    return Err(BuildError::ProjectEvaluation {
                        project: project.path.clone(),
                        reason,
                    });
                }
            }
        }

        Ok(())
    }
}
