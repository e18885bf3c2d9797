use std::path::PathBuf;

use super::report::{write_reports, ProfileOutput};
use super::{BuildProfile, Clock, SystemClock};
use crate::events::{BuildListener, ProjectEvaluationListener, TaskExecutionListener};
use crate::logger::Logger;
use crate::orchestrator::BuildResult;
use crate::project::{Project, ProjectGraph, ProjectState, Task, TaskState};
use crate::settings::{ConfigurationSnapshot, InvocationRequest};

/// Timestamps every lifecycle event into a [`BuildProfile`] and writes the
/// configured reports when the run finishes.
pub struct ProfileListener {
    clock: Box<dyn Clock + Send>,
    profile: BuildProfile,
    outputs: Vec<ProfileOutput>,
    fallback_build_dir: Option<PathBuf>,
    written: Vec<PathBuf>,
    logger: Logger,
}

impl ProfileListener {
    pub fn new(logger: Logger) -> Self {
        Self::with_clock(Box::new(SystemClock), logger)
    }

    /// Profiling starts when the listener is created.
    pub fn with_clock(clock: Box<dyn Clock + Send>, logger: Logger) -> Self {
        let profile = BuildProfile::new(clock.now_millis());
        Self {
            clock,
            profile,
            outputs: ProfileOutput::defaults(),
            fallback_build_dir: None,
            written: Vec::new(),
            logger,
        }
    }

    pub fn with_outputs(mut self, outputs: Vec<ProfileOutput>) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn profile(&self) -> &BuildProfile {
        &self.profile
    }

    pub fn written_reports(&self) -> &[PathBuf] {
        &self.written
    }

    fn now(&self) -> i64 {
        self.clock.now_millis()
    }
}

impl BuildListener for ProfileListener {
    fn build_started(&mut self, request: &InvocationRequest) -> anyhow::Result<()> {
        let at = self.now();
        self.profile.set_build_started(at);
        self.profile.describe_request(request);
        self.fallback_build_dir = Some(request.default_build_dir());
        Ok(())
    }

    fn settings_evaluated(&mut self, _settings: &ConfigurationSnapshot) -> anyhow::Result<()> {
        let at = self.now();
        self.profile.set_settings_evaluated(at);
        Ok(())
    }

    fn projects_loaded(&mut self, _graph: &ProjectGraph) -> anyhow::Result<()> {
        let at = self.now();
        self.profile.set_projects_loaded(at);
        Ok(())
    }

    fn projects_evaluated(&mut self, _graph: &ProjectGraph) -> anyhow::Result<()> {
        let at = self.now();
        self.profile.set_projects_evaluated(at);
        Ok(())
    }

    fn build_finished(&mut self, result: &BuildResult) -> anyhow::Result<()> {
        let at = self.now();
        self.profile.set_build_finished(at);
        self.profile.set_successful(result.is_success());

        let build_dir = match result.build_dir().or_else(|| self.fallback_build_dir.clone()) {
            Some(dir) => dir,
            None => anyhow::bail!("No build directory to write profile reports into"),
        };

        let outcome = write_reports(&self.profile, &build_dir, &self.outputs);
        for path in &outcome.written {
            self.logger
                .info(&format!("See the profiling report at: {}", path.display()));
        }
        self.written.extend(outcome.written);

        if !outcome.failures.is_empty() {
            let reasons: Vec<String> = outcome.failures.iter().map(|e| e.to_string()).collect();
            anyhow::bail!(
                "{} of {} profile reports could not be written: {}",
                outcome.failures.len(),
                self.outputs.len(),
                reasons.join("; ")
            );
        }

        Ok(())
    }
}

impl ProjectEvaluationListener for ProfileListener {
    fn before_evaluate(&mut self, project: &Project) -> anyhow::Result<()> {
        let at = self.now();
        self.profile.project_profile(project).set_before_evaluate(at);
        Ok(())
    }

    fn after_evaluate(&mut self, project: &Project, state: &ProjectState) -> anyhow::Result<()> {
        let at = self.now();
        let record = self.profile.project_profile(project);
        record.set_after_evaluate(at);
        record.set_state(state.clone());
        Ok(())
    }
}

impl TaskExecutionListener for ProfileListener {
    fn before_execute(&mut self, task: &Task) -> anyhow::Result<()> {
        let at = self.now();
        self.profile.task_profile(task).set_start(at);
        Ok(())
    }

    fn after_execute(&mut self, task: &Task, state: &TaskState) -> anyhow::Result<()> {
        let at = self.now();
        let record = self.profile.task_profile(task);
        record.set_finish(at);
        record.set_state(state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BuildError;
    use crate::profile::report::{ProfileFormat, REPORT_DIR};
    use crate::project::IdIssuer;
    use crate::settings::ProjectDescriptor;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    /// Each read returns the current value, then advances by `step`.
    struct SteppingClock {
        now: Arc<AtomicI64>,
        step: i64,
    }

    impl Clock for SteppingClock {
        fn now_millis(&self) -> i64 {
            self.now.fetch_add(self.step, Ordering::SeqCst)
        }
    }

    fn listener(start: i64, step: i64) -> ProfileListener {
        let clock = SteppingClock {
            now: Arc::new(AtomicI64::new(start)),
            step,
        };
        ProfileListener::with_clock(Box::new(clock), Logger::new())
    }

    fn snapshot(dir: PathBuf) -> ConfigurationSnapshot {
        ConfigurationSnapshot {
            settings_file: dir.join("anvil.toml"),
            root: ProjectDescriptor::new("ws", dir),
        }
    }

    #[test]
    fn test_lifecycle_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let mut listener = listener(1_000, 100).with_outputs(vec![]);
        let request = InvocationRequest::new(dir.path().to_path_buf()).with_tasks(["compile"]);

        let mut ids = IdIssuer::new();
        let root = Project::new(ids.next_project(), "ws".to_string(), ":".to_string(), dir.path().to_path_buf());
        let task = Task::new(ids.next_task(), &root, "compile".to_string());
        let graph = ProjectGraph::new(root.clone());

        listener.build_started(&request).unwrap();
        listener.settings_evaluated(&snapshot(dir.path().to_path_buf())).unwrap();
        listener.projects_loaded(&graph).unwrap();
        listener.before_evaluate(&root).unwrap();
        listener.after_evaluate(&root, &ProjectState::Evaluated).unwrap();
        listener.projects_evaluated(&graph).unwrap();
        listener.before_execute(&task).unwrap();
        listener.after_execute(&task, &TaskState::Executed).unwrap();
        let result = BuildResult::new(Some(snapshot(dir.path().to_path_buf())), None);
        listener.build_finished(&result).unwrap();

        let profile = listener.profile();
        assert_eq!(profile.profiling_started(), 1_000);
        assert_eq!(profile.elapsed_startup(), 100);
        assert_eq!(profile.elapsed_settings(), 100);
        assert_eq!(profile.elapsed_projects_loading(), 100);
        assert_eq!(profile.elapsed_projects_evaluation(), 300);
        assert_eq!(profile.elapsed_post_evaluation(), 300);
        assert_eq!(profile.elapsed_total(), 900);
        assert_eq!(profile.total_task_execution(), 100);
        assert_eq!(profile.task_description(), "compile");
        assert_eq!(profile.successful(), Some(true));
    }

    #[test]
    fn test_reports_written_under_root_build_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut listener = listener(0, 10)
            .with_outputs(vec![ProfileOutput::new("profile", ProfileFormat::Text)]);
        let request = InvocationRequest::new(dir.path().to_path_buf());

        listener.build_started(&request).unwrap();
        let result = BuildResult::new(Some(snapshot(dir.path().to_path_buf())), None);
        listener.build_finished(&result).unwrap();

        assert_eq!(listener.written_reports().len(), 1);
        assert!(listener.written_reports()[0].starts_with(dir.path().join("build").join(REPORT_DIR)));
    }

    #[test]
    fn test_reports_written_without_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let mut listener = listener(0, 10)
            .with_outputs(vec![ProfileOutput::new("profile", ProfileFormat::Csv)]);
        let request = InvocationRequest::new(dir.path().join("nested"));

        listener.build_started(&request).unwrap();
        let result = BuildResult::new(None, Some(BuildError::NoTasks));
        listener.build_finished(&result).unwrap();

        assert_eq!(listener.profile().successful(), Some(false));
        assert!(listener.written_reports()[0].starts_with(dir.path().join("nested").join("build")));
    }

    #[test]
    fn test_failed_output_reported_after_others_written() {
        let dir = tempfile::tempdir().unwrap();
        let report_dir = dir.path().join("build").join(REPORT_DIR);
        std::fs::create_dir_all(&report_dir).unwrap();
        std::fs::write(report_dir.join("blocked"), "").unwrap();

        let mut listener = listener(0, 10).with_outputs(vec![
            ProfileOutput::new("blocked/profile", ProfileFormat::Html),
            ProfileOutput::new("profile", ProfileFormat::Text),
        ]);
        listener
            .build_started(&InvocationRequest::new(dir.path().to_path_buf()))
            .unwrap();

        let result = BuildResult::new(Some(snapshot(dir.path().to_path_buf())), None);
        let error = listener.build_finished(&result).unwrap_err();

        assert!(error.to_string().starts_with("1 of 2 profile reports"));
        assert_eq!(listener.written_reports().len(), 1);
    }
}
