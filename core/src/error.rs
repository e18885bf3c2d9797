use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::dependency_graph::GraphError;

/// Terminal failure of a run. Captured into `BuildResult::failure`, never
/// propagated out of `Orchestrator::run`.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("no anvil.toml found in {0} or any parent directory")]
    SettingsNotFound(PathBuf),

    #[error("invalid build file {path}: {reason}")]
    InvalidSettings { path: PathBuf, reason: String },

    #[error("failed to load project {project}: {reason}")]
    ProjectLoad { project: String, reason: String },

    #[error("project {project} failed to evaluate: {reason}")]
    ProjectEvaluation { project: String, reason: String },

    #[error("task '{name}' not found in project {project}")]
    TaskNotFound { name: String, project: String },

    #[error("no tasks specified and no default tasks defined")]
    NoTasks,

    #[error("failed to order tasks: {0}")]
    Graph(#[from] GraphError),

    #[error("execution failed for task {task}: {reason}")]
    TaskFailed { task: String, reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Raised while writing profile reports. Observability-only: never replaces
/// the primary build failure.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write report {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A listener returned an error while handling an event. Delivery to the
/// remaining listeners continues.
#[derive(Debug)]
pub struct ListenerFailure {
    pub event: &'static str,
    pub error: anyhow::Error,
}

impl ListenerFailure {
    pub fn new(event: &'static str, error: anyhow::Error) -> Self {
        Self { event, error }
    }
}

impl fmt::Display for ListenerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener failed during {}: {:#}", self.event, self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_error_messages() {
        let err = BuildError::TaskFailed {
            task: ":app:compile".to_string(),
            reason: "Exit code 2".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "execution failed for task :app:compile: Exit code 2"
        );

        let err = BuildError::TaskNotFound {
            name: "deploy".to_string(),
            project: ":".to_string(),
        };
        assert_eq!(err.to_string(), "task 'deploy' not found in project :");
    }

    #[test]
    fn test_listener_failure_display() {
        let failure = ListenerFailure::new("build_finished", anyhow::anyhow!("disk full"));
        assert_eq!(
            failure.to_string(),
            "listener failed during build_finished: disk full"
        );
    }
}
