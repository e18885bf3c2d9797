pub mod build_executer;
pub mod cli;
pub mod config;
pub mod configurer;
pub mod console;
pub mod dependency_graph;
pub mod driver;
pub mod error;
pub mod events;
pub mod executor;
pub mod history;
pub mod listing;
pub mod loader;
pub mod logger;
pub mod orchestrator;
pub mod profile;
pub mod project;
pub mod settings;

pub use build_executer::{BuildExecuter, ExecutionSummary, ShellTaskAction, TaskAction};
pub use cli::{Cli, Commands, HistoryCommands};
pub use config::Config;
pub use configurer::{BuildConfigurer, DefaultBuildConfigurer};
pub use console::ConsoleListener;
pub use dependency_graph::{GraphError, TaskDependencyGraph};
pub use driver::{ExecutionContext, ExecutionDriver, TaskSelectionDriver};
pub use error::{BuildError, ListenerFailure, ReportError};
pub use events::{BuildListener, EventBus, ProjectEvaluationListener, TaskExecutionListener};
pub use executor::{execute_step, execute_steps, ExecutionResult};
pub use history::{BuildHistory, BuildHistoryEntry, HistoryListener};
pub use loader::{DescriptorProjectsLoader, ProjectsLoader};
pub use logger::{LogLevel, Logger};
pub use orchestrator::{BuildResult, Orchestrator};
pub use profile::{BuildProfile, Clock, ProfileListener, SystemClock};
pub use project::{Project, ProjectGraph, ProjectId, ProjectState, Task, TaskId, TaskState};
pub use settings::{
    ConfigurationSnapshot, FileSettingsResolver, InvocationRequest, SettingsResolver,
};
