use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::ListenerFailure;
use crate::orchestrator::BuildResult;
use crate::project::{Project, ProjectGraph, ProjectState, Task, TaskState};
use crate::settings::{ConfigurationSnapshot, InvocationRequest};

/// Run lifecycle events. Every method defaults to a no-op.
pub trait BuildListener {
    fn build_started(&mut self, _request: &InvocationRequest) -> anyhow::Result<()> {
        Ok(())
    }

    fn settings_evaluated(&mut self, _settings: &ConfigurationSnapshot) -> anyhow::Result<()> {
        Ok(())
    }

    fn projects_loaded(&mut self, _graph: &ProjectGraph) -> anyhow::Result<()> {
        Ok(())
    }

    fn projects_evaluated(&mut self, _graph: &ProjectGraph) -> anyhow::Result<()> {
        Ok(())
    }

    fn build_finished(&mut self, _result: &BuildResult) -> anyhow::Result<()> {
        Ok(())
    }
}

pub trait ProjectEvaluationListener {
    fn before_evaluate(&mut self, _project: &Project) -> anyhow::Result<()> {
        Ok(())
    }

    fn after_evaluate(&mut self, _project: &Project, _state: &ProjectState) -> anyhow::Result<()> {
        Ok(())
    }
}

pub trait TaskExecutionListener {
    fn before_execute(&mut self, _task: &Task) -> anyhow::Result<()> {
        Ok(())
    }

    fn after_execute(&mut self, _task: &Task, _state: &TaskState) -> anyhow::Result<()> {
        Ok(())
    }
}

pub type SharedBuildListener = Arc<Mutex<dyn BuildListener + Send>>;
pub type SharedEvaluationListener = Arc<Mutex<dyn ProjectEvaluationListener + Send>>;
pub type SharedTaskListener = Arc<Mutex<dyn TaskExecutionListener + Send>>;

fn lock<T: ?Sized>(listener: &Mutex<T>) -> MutexGuard<'_, T> {
    listener.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Ordered listener registry. Notification is synchronous and follows
/// registration order; a failing listener does not stop delivery to the
/// ones after it, its error is kept until `take_failures`.
#[derive(Default)]
pub struct EventBus {
    build_listeners: Vec<SharedBuildListener>,
    evaluation_listeners: Vec<SharedEvaluationListener>,
    task_listeners: Vec<SharedTaskListener>,
    failures: Mutex<Vec<ListenerFailure>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_build_listener(&mut self, listener: SharedBuildListener) {
        self.build_listeners.push(listener);
    }

    pub fn add_evaluation_listener(&mut self, listener: SharedEvaluationListener) {
        self.evaluation_listeners.push(listener);
    }

    pub fn add_task_listener(&mut self, listener: SharedTaskListener) {
        self.task_listeners.push(listener);
    }

    /// Registers one listener under all three event families.
    pub fn add_listener<L>(&mut self, listener: Arc<Mutex<L>>)
    where
        L: BuildListener + ProjectEvaluationListener + TaskExecutionListener + Send + 'static,
    {
        self.build_listeners.push(listener.clone());
        self.evaluation_listeners.push(listener.clone());
        self.task_listeners.push(listener);
    }

    pub fn listener_count(&self) -> (usize, usize, usize) {
        (
            self.build_listeners.len(),
            self.evaluation_listeners.len(),
            self.task_listeners.len(),
        )
    }

    pub fn take_failures(&self) -> Vec<ListenerFailure> {
        std::mem::take(&mut *lock(&self.failures))
    }

    fn record(&self, event: &'static str, result: anyhow::Result<()>) {
        if let Err(error) = result {
            lock(&self.failures).push(ListenerFailure::new(event, error));
        }
    }

    pub fn build_started(&self, request: &InvocationRequest) {
        for listener in &self.build_listeners {
            let result = lock(listener).build_started(request);
            self.record("build_started", result);
        }
    }

    pub fn settings_evaluated(&self, settings: &ConfigurationSnapshot) {
        for listener in &self.build_listeners {
            let result = lock(listener).settings_evaluated(settings);
            self.record("settings_evaluated", result);
        }
    }

    pub fn projects_loaded(&self, graph: &ProjectGraph) {
        for listener in &self.build_listeners {
            let result = lock(listener).projects_loaded(graph);
            self.record("projects_loaded", result);
        }
    }

    pub fn projects_evaluated(&self, graph: &ProjectGraph) {
        for listener in &self.build_listeners {
            let result = lock(listener).projects_evaluated(graph);
            self.record("projects_evaluated", result);
        }
    }

    pub fn build_finished(&self, result: &BuildResult) {
        for listener in &self.build_listeners {
            let outcome = lock(listener).build_finished(result);
            self.record("build_finished", outcome);
        }
    }

    pub fn before_evaluate(&self, project: &Project) {
        for listener in &self.evaluation_listeners {
            let result = lock(listener).before_evaluate(project);
            self.record("before_evaluate", result);
        }
    }

    pub fn after_evaluate(&self, project: &Project, state: &ProjectState) {
        for listener in &self.evaluation_listeners {
            let result = lock(listener).after_evaluate(project, state);
            self.record("after_evaluate", result);
        }
    }

    pub fn before_execute(&self, task: &Task) {
        for listener in &self.task_listeners {
            let result = lock(listener).before_execute(task);
            self.record("before_execute", result);
        }
    }

    pub fn after_execute(&self, task: &Task, state: &TaskState) {
        for listener in &self.task_listeners {
            let result = lock(listener).after_execute(task, state);
            self.record("after_execute", result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail_on_start: bool,
    }

    impl BuildListener for Recorder {
        fn build_started(&mut self, _request: &InvocationRequest) -> anyhow::Result<()> {
            self.log.lock().unwrap().push(format!("{}:started", self.name));
            if self.fail_on_start {
                anyhow::bail!("{} refused", self.name);
            }
            Ok(())
        }
    }

    impl ProjectEvaluationListener for Recorder {}

    impl TaskExecutionListener for Recorder {
        fn before_execute(&mut self, task: &Task) -> anyhow::Result<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:before {}", self.name, task.path));
            Ok(())
        }
    }

    fn recorder(name: &'static str, log: &Arc<Mutex<Vec<String>>>, fail: bool) -> Arc<Mutex<Recorder>> {
        Arc::new(Mutex::new(Recorder {
            name,
            log: log.clone(),
            fail_on_start: fail,
        }))
    }

    #[test]
    fn test_notification_follows_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        bus.add_listener(recorder("first", &log, false));
        bus.add_listener(recorder("second", &log, false));

        bus.build_started(&InvocationRequest::new(PathBuf::from("/ws")));

        assert_eq!(
            *log.lock().unwrap(),
            vec!["first:started".to_string(), "second:started".to_string()]
        );
    }

    #[test]
    fn test_failing_listener_does_not_stop_delivery() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        bus.add_listener(recorder("broken", &log, true));
        bus.add_listener(recorder("healthy", &log, false));

        bus.build_started(&InvocationRequest::new(PathBuf::from("/ws")));

        assert_eq!(log.lock().unwrap().len(), 2);
        let failures = bus.take_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].event, "build_started");
        assert!(bus.take_failures().is_empty());
    }

    #[test]
    fn test_add_listener_registers_all_families() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        bus.add_listener(recorder("all", &log, false));
        bus.add_task_listener(recorder("tasks-only", &log, false));

        assert_eq!(bus.listener_count(), (1, 1, 2));
    }
}
