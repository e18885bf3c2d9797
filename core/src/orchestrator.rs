use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::build_executer::{BuildExecuter, TaskAction};
use crate::configurer::{BuildConfigurer, DefaultBuildConfigurer};
use crate::driver::{ExecutionContext, ExecutionDriver, TaskSelectionDriver};
use crate::error::{BuildError, ListenerFailure};
use crate::events::{BuildListener, EventBus, ProjectEvaluationListener, TaskExecutionListener};
use crate::loader::{DescriptorProjectsLoader, ProjectsLoader};
use crate::logger::Logger;
use crate::project::ProjectGraph;
use crate::settings::{ConfigurationSnapshot, FileSettingsResolver, InvocationRequest, SettingsResolver};

/// Terminal outcome of a run. Always produced, even when settings never
/// resolved.
#[derive(Debug)]
pub struct BuildResult {
    configuration: Option<ConfigurationSnapshot>,
    failure: Option<BuildError>,
    listener_failures: Vec<ListenerFailure>,
}

impl BuildResult {
    pub fn new(configuration: Option<ConfigurationSnapshot>, failure: Option<BuildError>) -> Self {
        Self {
            configuration,
            failure,
            listener_failures: Vec::new(),
        }
    }

    pub fn configuration(&self) -> Option<&ConfigurationSnapshot> {
        self.configuration.as_ref()
    }

    pub fn failure(&self) -> Option<&BuildError> {
        self.failure.as_ref()
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn listener_failures(&self) -> &[ListenerFailure] {
        &self.listener_failures
    }

    /// Root build directory, if settings resolved.
    pub fn build_dir(&self) -> Option<PathBuf> {
        self.configuration.as_ref().map(ConfigurationSnapshot::build_dir)
    }

    pub fn push_listener_failure(&mut self, failure: ListenerFailure) {
        self.listener_failures.push(failure);
    }

    fn with_listener_failures(mut self, failures: Vec<ListenerFailure>) -> Self {
        self.listener_failures.extend(failures);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GraphState {
    Stale,
    Valid,
}

/// Sequences a run: resolve settings, then load/configure/select/execute
/// until the driver runs dry, reusing the project graph while it stays valid.
pub struct Orchestrator {
    resolver: Box<dyn SettingsResolver>,
    loader: Box<dyn ProjectsLoader>,
    configurer: Box<dyn BuildConfigurer>,
    executer: BuildExecuter,
    bus: EventBus,
    logger: Logger,
}

impl Orchestrator {
    pub fn new(
        resolver: Box<dyn SettingsResolver>,
        loader: Box<dyn ProjectsLoader>,
        configurer: Box<dyn BuildConfigurer>,
        executer: BuildExecuter,
        bus: EventBus,
        logger: Logger,
    ) -> Self {
        Self {
            resolver,
            loader,
            configurer,
            executer,
            bus,
            logger,
        }
    }

    /// File-based settings, descriptor loading and the default configurer.
    pub fn with_defaults(action: Box<dyn TaskAction>, logger: Logger) -> Self {
        Self::new(
            Box::new(FileSettingsResolver::new(logger.clone())),
            Box::new(DescriptorProjectsLoader::new(logger.clone())),
            Box::new(DefaultBuildConfigurer::new(logger.clone())),
            BuildExecuter::new(action, logger.clone()),
            EventBus::new(),
            logger,
        )
    }

    pub fn bus_mut(&mut self) -> &mut EventBus {
        &mut self.bus
    }

    pub fn add_listener<L>(&mut self, listener: Arc<Mutex<L>>)
    where
        L: BuildListener + ProjectEvaluationListener + TaskExecutionListener + Send + 'static,
    {
        self.bus.add_listener(listener);
    }

    pub fn run(&mut self, request: &InvocationRequest) -> BuildResult {
        let mut driver = TaskSelectionDriver::from_request(request);
        self.run_with(request, &mut driver)
    }

    pub fn run_with(
        &mut self,
        request: &InvocationRequest,
        driver: &mut dyn ExecutionDriver,
    ) -> BuildResult {
        self.bus.build_started(request);

        let (configuration, failure) = match self.resolver.resolve(request) {
            Ok(settings) => {
                self.bus.settings_evaluated(&settings);
                let outcome = self.execute(&settings, request, driver);
                (Some(settings), outcome.err())
            }
            Err(e) => (None, Some(e)),
        };

        if let Some(failure) = &failure {
            self.logger.debug(&format!("Run failed: {}", failure));
        }

        let result = BuildResult::new(configuration, failure)
            .with_listener_failures(self.bus.take_failures());

        self.bus.build_finished(&result);

        result.with_listener_failures(self.bus.take_failures())
    }

    /// Resolves, loads and configures the project graph without running
    /// anything.
    pub fn load_graph(&mut self, request: &InvocationRequest) -> Result<ProjectGraph, BuildError> {
        let settings = self.resolver.resolve(request)?;
        self.rebuild_graph(&settings, request)
    }

    fn execute(
        &mut self,
        settings: &ConfigurationSnapshot,
        request: &InvocationRequest,
        driver: &mut dyn ExecutionDriver,
    ) -> Result<(), BuildError> {
        let mut state = GraphState::Stale;
        let mut graph: Option<ProjectGraph> = None;

        while driver.has_next() {
            if state == GraphState::Valid && driver.requires_project_reload() {
                state = GraphState::Stale;
            }

            let current = match (state, graph.take()) {
                (GraphState::Valid, Some(existing)) => {
                    self.logger
                        .info("Project graph is still valid; skipping reload");
                    existing
                }
                (_, previous) => {
                    drop(previous);
                    let rebuilt = self.rebuild_graph(settings, request)?;
                    state = GraphState::Valid;
                    rebuilt
                }
            };

            driver.select(&current)?;
            self.logger
                .info(&format!("Starting build for {}", driver.description()));

            let mut context = ExecutionContext {
                graph: &current,
                bus: &self.bus,
                executer: &mut self.executer,
            };
            driver.execute(&mut context)?;

            graph = Some(current);
        }

        Ok(())
    }

    fn rebuild_graph(
        &mut self,
        settings: &ConfigurationSnapshot,
        request: &InvocationRequest,
    ) -> Result<ProjectGraph, BuildError> {
        self.loader.reset();
        let mut graph = self.loader.load(settings, request)?;
        self.bus.projects_loaded(&graph);

        self.configurer.configure(&mut graph, &self.bus)?;
        self.bus.projects_evaluated(&graph);

        Ok(graph)
    }
}
