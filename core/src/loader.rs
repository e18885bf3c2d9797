use crate::error::BuildError;
use crate::logger::Logger;
use crate::project::{child_path, IdIssuer, Project, ProjectGraph, ProjectId, Task};
use crate::settings::{BuildFile, ConfigurationSnapshot, InvocationRequest, ProjectDescriptor};

/// Realizes the descriptor tree of a snapshot into a fresh project graph.
pub trait ProjectsLoader {
    /// Forgets the graph of the previous epoch.
    fn reset(&mut self);

    fn load(
        &mut self,
        settings: &ConfigurationSnapshot,
        request: &InvocationRequest,
    ) -> Result<ProjectGraph, BuildError>;
}

/// Reads every project's build file on each load, so a reload observes
/// whatever the previous graph epoch wrote to disk.
pub struct DescriptorProjectsLoader {
    ids: IdIssuer,
    loads: usize,
    logger: Logger,
}

impl DescriptorProjectsLoader {
    pub fn new(logger: Logger) -> Self {
        Self {
            ids: IdIssuer::new(),
            loads: 0,
            logger,
        }
    }

    pub fn loads(&self) -> usize {
        self.loads
    }

    fn realize(
        &mut self,
        graph: &mut ProjectGraph,
        descriptor: &ProjectDescriptor,
        project: &Project,
        file: BuildFile,
    ) -> Result<(), BuildError> {
        for section in file.tasks {
            if graph.task_in_project(project.id, &section.name).is_some() {
                return Err(BuildError::ProjectLoad {
                    project: project.path.clone(),
                    reason: format!("duplicate task '{}'", section.name),
                });
            }

            let mut task = Task::new(self.ids.next_task(), project, section.name);
            task.description = section.description;
            task.depends_on = section.depends_on;
            task.commands = section.commands;
            task.enabled = section.enabled;
            task.reconfigures = section.reconfigures;
            graph.add_task(task);
        }

        for child_descriptor in &descriptor.children {
            let child_file = BuildFile::load_optional(&child_descriptor.build_file)?;
            let child = self.project_from(child_descriptor, &child_file, Some(project));
            graph.add_project(child.clone());
            self.realize(graph, child_descriptor, &child, child_file)?;
        }

        Ok(())
    }

    fn project_from(
        &mut self,
        descriptor: &ProjectDescriptor,
        file: &BuildFile,
        parent: Option<&Project>,
    ) -> Project {
        let (path, parent_id): (String, Option<ProjectId>) = match parent {
            Some(parent) => (child_path(&parent.path, &descriptor.name), Some(parent.id)),
            None => (":".to_string(), None),
        };

        let mut project = Project::new(
            self.ids.next_project(),
            descriptor.name.clone(),
            path,
            descriptor.dir.clone(),
        );
        project.parent = parent_id;
        project.build_dir = descriptor.dir.join(&descriptor.build_dir);
        project.enabled = file.project.enabled;
        project.default_tasks = file.project.default_tasks.clone();
        project
    }
}

impl ProjectsLoader for DescriptorProjectsLoader {
    fn reset(&mut self) {
        self.logger.debug("Discarding project graph");
    }

    fn load(
        &mut self,
        settings: &ConfigurationSnapshot,
        _request: &InvocationRequest,
    ) -> Result<ProjectGraph, BuildError> {
        let file = BuildFile::load_optional(&settings.root.build_file)?;
        let root = self.project_from(&settings.root, &file, None);
        let mut graph = ProjectGraph::new(root.clone());
        self.realize(&mut graph, &settings.root, &root, file)?;
        self.loads += 1;

        self.logger.debug(&format!(
            "Loaded {} project(s) with {} task(s)",
            graph.projects().count(),
            graph.tasks().count()
        ));

        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::BUILD_FILE_NAME;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn write(dir: &Path, content: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(BUILD_FILE_NAME), content).unwrap();
    }

    fn snapshot(root_dir: &Path) -> ConfigurationSnapshot {
        let mut root = ProjectDescriptor::new("ws", root_dir.to_path_buf());
        let mut core = ProjectDescriptor::new("core", root_dir.join("core"));
        core.build_dir = "out".to_string();
        root.children.push(core);

        ConfigurationSnapshot {
            settings_file: root_dir.join(BUILD_FILE_NAME),
            root,
        }
    }

    fn workspace() -> TempDir {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "[settings]\ninclude = [\"core\"]\n\n[project]\ndefault_tasks = [\"build\"]\n\n[[tasks]]\nname = \"build\"\n",
        );
        write(
            &temp.path().join("core"),
            "[project]\nenabled = false\n\n[[tasks]]\nname = \"compile\"\ncommands = [[\"cc\"]]\n",
        );
        temp
    }

    #[test]
    fn test_load_builds_tree() {
        let temp = workspace();
        let mut loader = DescriptorProjectsLoader::new(Logger::new());
        let request = InvocationRequest::new(temp.path().to_path_buf());
        let graph = loader.load(&snapshot(temp.path()), &request).unwrap();

        assert_eq!(graph.root().path, ":");
        assert_eq!(graph.root().default_tasks, vec!["build".to_string()]);
        let core = graph.find_project(":core").unwrap();
        assert_eq!(core.parent, Some(graph.root_id()));
        assert_eq!(core.build_dir, temp.path().join("core").join("out"));
        assert!(!core.enabled);
        assert_eq!(
            graph.find_task(":core:compile").unwrap().commands,
            vec![vec!["cc".to_string()]]
        );
        assert!(graph.find_task(":build").is_some());
        assert_eq!(loader.loads(), 1);
    }

    #[test]
    fn test_missing_project_file_is_empty_project() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("core")).unwrap();

        let mut loader = DescriptorProjectsLoader::new(Logger::new());
        let request = InvocationRequest::new(temp.path().to_path_buf());
        let graph = loader.load(&snapshot(temp.path()), &request).unwrap();

        assert_eq!(graph.projects().count(), 2);
        assert_eq!(graph.tasks().count(), 0);
    }

    #[test]
    fn test_reload_issues_new_handles() {
        let temp = workspace();
        let mut loader = DescriptorProjectsLoader::new(Logger::new());
        let request = InvocationRequest::new(temp.path().to_path_buf());

        let first = loader.load(&snapshot(temp.path()), &request).unwrap();
        loader.reset();
        let second = loader.load(&snapshot(temp.path()), &request).unwrap();

        assert_ne!(first.root_id(), second.root_id());
        assert_ne!(
            first.find_task(":core:compile").unwrap().id,
            second.find_task(":core:compile").unwrap().id
        );
    }

    #[test]
    fn test_reload_reads_changed_build_files() {
        let temp = workspace();
        let settings = snapshot(temp.path());
        let mut loader = DescriptorProjectsLoader::new(Logger::new());
        let request = InvocationRequest::new(temp.path().to_path_buf());

        let first = loader.load(&settings, &request).unwrap();
        assert!(first.find_task(":core:package").is_none());

        write(
            &temp.path().join("core"),
            "[[tasks]]\nname = \"compile\"\n\n[[tasks]]\nname = \"package\"\ndepends_on = [\"compile\"]\n",
        );
        loader.reset();
        let second = loader.load(&settings, &request).unwrap();

        assert!(second.find_project(":core").unwrap().enabled);
        assert_eq!(
            second.find_task(":core:package").unwrap().depends_on,
            vec!["compile".to_string()]
        );
    }

    #[test]
    fn test_duplicate_task_rejected() {
        let temp = workspace();
        write(
            &temp.path().join("core"),
            "[[tasks]]\nname = \"compile\"\n\n[[tasks]]\nname = \"compile\"\n",
        );

        let mut loader = DescriptorProjectsLoader::new(Logger::new());
        let request = InvocationRequest::new(PathBuf::from(temp.path()));
        let result = loader.load(&snapshot(temp.path()), &request);

        assert!(matches!(result, Err(BuildError::ProjectLoad { .. })));
    }

    #[test]
    fn test_invalid_project_file_fails_load() {
        let temp = workspace();
        write(&temp.path().join("core"), "[[tasks]]\nname = \n");

        let mut loader = DescriptorProjectsLoader::new(Logger::new());
        let request = InvocationRequest::new(temp.path().to_path_buf());
        let result = loader.load(&snapshot(temp.path()), &request);

        assert!(matches!(result, Err(BuildError::InvalidSettings { .. })));
    }
}
