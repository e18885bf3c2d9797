pub mod listener;
pub mod report;

pub use listener::ProfileListener;
pub use report::{format_duration, ProfileFormat, ProfileOutput, ReportOutcome};

use std::collections::BTreeMap;

use crate::project::{Project, ProjectId, ProjectState, Task, TaskId, TaskState};
use crate::settings::InvocationRequest;

/// Source of wall-clock instants, in milliseconds since the epoch.
pub trait Clock {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

fn set_once(slot: &mut Option<i64>, at: i64) {
    if slot.is_none() {
        *slot = Some(at);
    }
}

fn elapsed(from: Option<i64>, to: Option<i64>) -> i64 {
    to.unwrap_or_default() - from.unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct TaskProfile {
    pub path: String,
    start: Option<i64>,
    finish: Option<i64>,
    state: Option<TaskState>,
}

impl TaskProfile {
    fn new(path: String) -> Self {
        Self {
            path,
            start: None,
            finish: None,
            state: None,
        }
    }

    pub fn set_start(&mut self, at: i64) {
        set_once(&mut self.start, at);
    }

    pub fn set_finish(&mut self, at: i64) {
        set_once(&mut self.finish, at);
    }

    pub fn set_state(&mut self, state: TaskState) {
        self.state = Some(state);
    }

    pub fn start(&self) -> i64 {
        self.start.unwrap_or_default()
    }

    pub fn finish(&self) -> i64 {
        self.finish.unwrap_or_default()
    }

    pub fn state(&self) -> Option<&TaskState> {
        self.state.as_ref()
    }

    pub fn state_label(&self) -> &'static str {
        self.state.as_ref().map_or("not run", TaskState::label)
    }

    pub fn elapsed(&self) -> i64 {
        elapsed(self.start, self.finish)
    }
}

#[derive(Debug, Clone)]
pub struct ProjectProfile {
    pub path: String,
    before_evaluate: Option<i64>,
    after_evaluate: Option<i64>,
    state: Option<ProjectState>,
    tasks: BTreeMap<TaskId, TaskProfile>,
}

impl ProjectProfile {
    fn new(path: String) -> Self {
        Self {
            path,
            before_evaluate: None,
            after_evaluate: None,
            state: None,
            tasks: BTreeMap::new(),
        }
    }

    pub fn set_before_evaluate(&mut self, at: i64) {
        set_once(&mut self.before_evaluate, at);
    }

    pub fn set_after_evaluate(&mut self, at: i64) {
        set_once(&mut self.after_evaluate, at);
    }

    pub fn set_state(&mut self, state: ProjectState) {
        self.state = Some(state);
    }

    pub fn state(&self) -> Option<&ProjectState> {
        self.state.as_ref()
    }

    pub fn state_label(&self) -> &'static str {
        self.state.as_ref().map_or("not evaluated", ProjectState::label)
    }

    pub fn elapsed_evaluation(&self) -> i64 {
        elapsed(self.before_evaluate, self.after_evaluate)
    }

    pub fn elapsed_task_execution(&self) -> i64 {
        self.tasks.values().map(TaskProfile::elapsed).sum()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Tasks in the order they started.
    pub fn tasks(&self) -> Vec<&TaskProfile> {
        let mut tasks: Vec<&TaskProfile> = self.tasks.values().collect();
        tasks.sort_by_key(|t| t.start());
        tasks
    }

    pub fn task_profile(&mut self, id: TaskId, path: &str) -> &mut TaskProfile {
        self.tasks
            .entry(id)
            .or_insert_with(|| TaskProfile::new(path.to_string()))
    }
}

/// Timing record of one run. Instants are written once each, in the order
/// the lifecycle produces them; metrics are derived on demand.
#[derive(Debug, Clone, Default)]
pub struct BuildProfile {
    profiling_started: Option<i64>,
    build_started: Option<i64>,
    settings_evaluated: Option<i64>,
    projects_loaded: Option<i64>,
    projects_evaluated: Option<i64>,
    build_finished: Option<i64>,
    task_description: String,
    successful: Option<bool>,
    projects: BTreeMap<ProjectId, ProjectProfile>,
}

impl BuildProfile {
    pub fn new(profiling_started: i64) -> Self {
        Self {
            profiling_started: Some(profiling_started),
            ..Self::default()
        }
    }

    pub fn set_build_started(&mut self, at: i64) {
        set_once(&mut self.build_started, at);
    }

    pub fn set_settings_evaluated(&mut self, at: i64) {
        set_once(&mut self.settings_evaluated, at);
    }

    pub fn set_projects_loaded(&mut self, at: i64) {
        set_once(&mut self.projects_loaded, at);
    }

    pub fn set_projects_evaluated(&mut self, at: i64) {
        set_once(&mut self.projects_evaluated, at);
    }

    pub fn set_build_finished(&mut self, at: i64) {
        set_once(&mut self.build_finished, at);
    }

    pub fn set_successful(&mut self, successful: bool) {
        self.successful = Some(successful);
    }

    pub fn successful(&self) -> Option<bool> {
        self.successful
    }

    /// Captures the command line in its `-x<excluded> <requested>` form.
    pub fn describe_request(&mut self, request: &InvocationRequest) {
        let mut description = String::new();
        for name in &request.excluded_task_names {
            description.push_str("-x");
            description.push_str(name);
            description.push(' ');
        }
        for name in &request.task_names {
            description.push_str(name);
            description.push(' ');
        }
        self.task_description = description.trim().to_string();
    }

    pub fn task_description(&self) -> &str {
        &self.task_description
    }

    pub fn profiling_started(&self) -> i64 {
        self.profiling_started.unwrap_or_default()
    }

    pub fn build_started(&self) -> i64 {
        self.build_started.unwrap_or_default()
    }

    pub fn build_finished(&self) -> i64 {
        self.build_finished.unwrap_or_default()
    }

    pub fn project_profile(&mut self, project: &Project) -> &mut ProjectProfile {
        self.projects
            .entry(project.id)
            .or_insert_with(|| ProjectProfile::new(project.path.clone()))
    }

    pub fn task_profile(&mut self, task: &Task) -> &mut TaskProfile {
        self.projects
            .entry(task.project)
            .or_insert_with(|| ProjectProfile::new(task.project_path.clone()))
            .task_profile(task.id, &task.path)
    }

    pub fn projects(&self) -> impl Iterator<Item = &ProjectProfile> {
        self.projects.values()
    }

    pub fn project_count(&self) -> usize {
        self.projects.len()
    }

    pub fn elapsed_startup(&self) -> i64 {
        elapsed(self.profiling_started, self.build_started)
    }

    pub fn elapsed_settings(&self) -> i64 {
        elapsed(self.build_started, self.settings_evaluated)
    }

    pub fn elapsed_projects_loading(&self) -> i64 {
        elapsed(self.settings_evaluated, self.projects_loaded)
    }

    pub fn elapsed_projects_evaluation(&self) -> i64 {
        elapsed(self.projects_loaded, self.projects_evaluated)
    }

    pub fn elapsed_post_evaluation(&self) -> i64 {
        elapsed(self.projects_evaluated, self.build_finished)
    }

    pub fn elapsed_total(&self) -> i64 {
        elapsed(self.profiling_started, self.build_finished)
    }

    pub fn total_task_execution(&self) -> i64 {
        self.projects
            .values()
            .map(ProjectProfile::elapsed_task_execution)
            .sum()
    }

    pub fn max_project_execution(&self) -> i64 {
        self.projects
            .values()
            .map(ProjectProfile::elapsed_task_execution)
            .max()
            .unwrap_or(0)
    }

    /// `(label, elapsed)` for each phase, in lifecycle order.
    pub fn phases(&self) -> [(&'static str, i64); 5] {
        [
            ("Startup", self.elapsed_startup()),
            ("Settings", self.elapsed_settings()),
            ("Loading projects", self.elapsed_projects_loading()),
            ("Configuring projects", self.elapsed_projects_evaluation()),
            ("Task execution", self.elapsed_post_evaluation()),
        ]
    }
}
