use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anvil_core::profile::report::REPORT_DIR;
use anvil_core::{
    BuildError, BuildHistory, BuildListener, BuildResult, HistoryListener, InvocationRequest,
    Logger, Orchestrator, ProfileListener, Project, ProjectEvaluationListener, ProjectGraph, Task,
    TaskAction, TaskExecutionListener, TaskState,
};
use tempfile::TempDir;

struct RecordingAction {
    ran: Arc<Mutex<Vec<String>>>,
    fail: Option<&'static str>,
}

impl TaskAction for RecordingAction {
    fn run(&mut self, task: &Task, _project: &Project) -> anyhow::Result<()> {
        self.ran.lock().unwrap().push(task.path.clone());
        if self.fail == Some(task.path.as_str()) {
            anyhow::bail!("Exit code 2");
        }
        Ok(())
    }
}

#[derive(Default)]
struct Counter {
    loads: usize,
    finished: usize,
    states: Vec<(String, TaskState)>,
}

impl BuildListener for Counter {
    fn projects_loaded(&mut self, _graph: &ProjectGraph) -> anyhow::Result<()> {
        self.loads += 1;
        Ok(())
    }

    fn build_finished(&mut self, _result: &BuildResult) -> anyhow::Result<()> {
        self.finished += 1;
        Ok(())
    }
}

impl ProjectEvaluationListener for Counter {}

impl TaskExecutionListener for Counter {
    fn after_execute(&mut self, task: &Task, state: &TaskState) -> anyhow::Result<()> {
        self.states.push((task.path.clone(), state.clone()));
        Ok(())
    }
}

fn write(dir: &Path, content: &str) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join("anvil.toml"), content).unwrap();
}

fn workspace() -> TempDir {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        r#"
[settings]
include = ["core", "app"]

[project]
name = "workspace"
default_tasks = ["build"]

[[tasks]]
name = "build"
description = "Assembles the application"
depends_on = [":app:assemble"]
"#,
    );
    write(
        &temp.path().join("core"),
        r#"
[[tasks]]
name = "compile"
commands = [["cc", "-c", "core.c"]]
"#,
    );
    write(
        &temp.path().join("app"),
        r#"
[[tasks]]
name = "compile"
depends_on = [":core:compile"]
commands = [["cc", "-c", "main.c"]]

[[tasks]]
name = "assemble"
depends_on = ["compile"]
commands = [["ld", "-o", "app"]]

[[tasks]]
name = "regenerate"
reconfigures = true
commands = [["gen"]]
"#,
    );
    temp
}

struct Harness {
    orchestrator: Orchestrator,
    ran: Arc<Mutex<Vec<String>>>,
    counter: Arc<Mutex<Counter>>,
}

fn harness(fail: Option<&'static str>) -> Harness {
    let ran = Arc::new(Mutex::new(Vec::new()));
    let action = RecordingAction {
        ran: ran.clone(),
        fail,
    };
    let mut orchestrator = Orchestrator::with_defaults(Box::new(action), Logger::new());
    let counter = Arc::new(Mutex::new(Counter::default()));
    orchestrator.add_listener(counter.clone());

    Harness {
        orchestrator,
        ran,
        counter,
    }
}

#[test]
fn test_default_tasks_run_in_dependency_order() {
    let temp = workspace();
    let mut harness = harness(None);

    let result = harness
        .orchestrator
        .run(&InvocationRequest::new(temp.path().to_path_buf()));

    assert!(result.is_success(), "unexpected failure: {:?}", result.failure());
    assert_eq!(
        *harness.ran.lock().unwrap(),
        vec![":core:compile", ":app:compile", ":app:assemble"]
    );

    let counter = harness.counter.lock().unwrap();
    assert_eq!(counter.loads, 1);
    assert_eq!(counter.finished, 1);
    assert_eq!(
        counter.states.last().unwrap(),
        &(":build".to_string(), TaskState::UpToDate)
    );
}

#[test]
fn test_reconfiguring_task_reloads_graph() {
    let temp = workspace();
    let mut harness = harness(None);

    let request =
        InvocationRequest::new(temp.path().to_path_buf()).with_tasks(["regenerate", "assemble"]);
    let result = harness.orchestrator.run(&request);

    assert!(result.is_success());
    assert_eq!(harness.counter.lock().unwrap().loads, 2);
    assert_eq!(harness.ran.lock().unwrap().first().unwrap(), ":app:regenerate");
}

/// Rewrites the root build file while `:regenerate` runs, adding `package`.
struct RegeneratingAction {
    ran: Arc<Mutex<Vec<String>>>,
}

impl TaskAction for RegeneratingAction {
    fn run(&mut self, task: &Task, project: &Project) -> anyhow::Result<()> {
        self.ran.lock().unwrap().push(task.path.clone());
        if task.name == "regenerate" {
            fs::write(
                project.dir.join("anvil.toml"),
                r#"
[settings]

[[tasks]]
name = "regenerate"
reconfigures = true
commands = [["gen"]]

[[tasks]]
name = "compile"
commands = [["cc", "-c", "main.c"]]

[[tasks]]
name = "package"
depends_on = ["compile"]
commands = [["tar", "cf", "app.tar"]]
"#,
            )?;
        }
        Ok(())
    }
}

#[test]
fn test_reload_picks_up_tasks_written_by_reconfiguring_task() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        r#"
[settings]

[[tasks]]
name = "regenerate"
reconfigures = true
commands = [["gen"]]
"#,
    );

    let ran = Arc::new(Mutex::new(Vec::new()));
    let action = RegeneratingAction { ran: ran.clone() };
    let mut orchestrator = Orchestrator::with_defaults(Box::new(action), Logger::new());
    let counter = Arc::new(Mutex::new(Counter::default()));
    orchestrator.add_listener(counter.clone());

    let request =
        InvocationRequest::new(temp.path().to_path_buf()).with_tasks(["regenerate", "package"]);
    let result = orchestrator.run(&request);

    assert!(result.is_success(), "unexpected failure: {:?}", result.failure());
    assert_eq!(
        *ran.lock().unwrap(),
        vec![":regenerate", ":compile", ":package"]
    );
    assert_eq!(counter.lock().unwrap().loads, 2);
}

#[test]
fn test_separate_units_reuse_graph() {
    let temp = workspace();
    let mut harness = harness(None);

    let request = InvocationRequest::new(temp.path().to_path_buf())
        .with_tasks([":core:compile", ":app:assemble"]);
    let result = harness.orchestrator.run(&request);

    assert!(result.is_success());
    assert_eq!(harness.counter.lock().unwrap().loads, 1);
    assert_eq!(
        *harness.ran.lock().unwrap(),
        vec![":core:compile", ":core:compile", ":app:compile", ":app:assemble"]
    );
}

#[test]
fn test_excluded_task_is_skipped_with_its_dependencies() {
    let temp = workspace();
    let mut harness = harness(None);

    let request = InvocationRequest::new(temp.path().to_path_buf())
        .with_tasks([":app:assemble"])
        .with_excluded([":app:compile"]);
    harness.orchestrator.run(&request);

    assert_eq!(*harness.ran.lock().unwrap(), vec![":app:assemble"]);
}

#[test]
fn test_task_failure_is_reported_and_recorded() {
    let temp = workspace();
    let history_path = temp.path().join("history.json");
    let mut harness = harness(Some(":app:compile"));

    let history = BuildHistory::new(history_path.clone(), 10).unwrap();
    harness
        .orchestrator
        .add_listener(Arc::new(Mutex::new(HistoryListener::new(history))));

    let result = harness
        .orchestrator
        .run(&InvocationRequest::new(temp.path().to_path_buf()));

    match result.failure() {
        Some(BuildError::TaskFailed { task, reason }) => {
            assert_eq!(task, ":app:compile");
            assert_eq!(reason, "Exit code 2");
        }
        other => panic!("Expected TaskFailed, got {:?}", other),
    }
    assert!(result.configuration().is_some());
    assert_eq!(harness.counter.lock().unwrap().finished, 1);

    let history = BuildHistory::new(history_path, 10).unwrap();
    let entry = history.last_entry().unwrap();
    assert!(!entry.success);
    assert_eq!(entry.tasks_executed, 1);
    assert_eq!(entry.tasks_failed, 1);
}

#[test]
fn test_profile_reports_written_for_run() {
    let temp = workspace();
    let mut harness = harness(None);
    let profiler = Arc::new(Mutex::new(ProfileListener::new(Logger::new())));
    harness.orchestrator.add_listener(profiler.clone());

    let request = InvocationRequest::new(temp.path().to_path_buf()).with_tasks(["build"]);
    let result = harness.orchestrator.run(&request);
    assert!(result.is_success());
    assert!(result.listener_failures().is_empty());

    let profiler = profiler.lock().unwrap();
    let reports = profiler.written_reports();
    assert_eq!(reports.len(), 3);
    for report in reports {
        assert!(report.starts_with(temp.path().join("build").join(REPORT_DIR)));
        assert!(report.exists());
    }

    let profile = profiler.profile();
    assert_eq!(profile.task_description(), "build");
    assert_eq!(profile.project_count(), 3);
    let phases: i64 = profile.phases().iter().map(|(_, ms)| ms).sum();
    assert_eq!(phases, profile.elapsed_total());
}

#[test]
fn test_missing_settings_still_finishes_and_profiles() {
    let temp = TempDir::new().unwrap();
    let mut harness = harness(None);
    let profiler = Arc::new(Mutex::new(ProfileListener::new(Logger::new())));
    harness.orchestrator.add_listener(profiler.clone());

    let result = harness
        .orchestrator
        .run(&InvocationRequest::new(temp.path().to_path_buf()));

    assert!(matches!(result.failure(), Some(BuildError::SettingsNotFound(_))));
    assert!(result.configuration().is_none());
    assert_eq!(harness.counter.lock().unwrap().finished, 1);

    let profiler = profiler.lock().unwrap();
    assert_eq!(profiler.written_reports().len(), 3);
    assert!(profiler.written_reports()[0].starts_with(temp.path().join("build")));
}
