use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Stable handle issued when a project is realized. Reloading the graph issues
/// new handles, so two evaluations of the same directory never share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(u32);

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "project#{}", self.0)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Hands out monotonically increasing handles for the lifetime of a run.
#[derive(Debug, Default)]
pub struct IdIssuer {
    next_project: u32,
    next_task: u32,
}

impl IdIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_project(&mut self) -> ProjectId {
        let id = ProjectId(self.next_project);
        self.next_project += 1;
        id
    }

    pub fn next_task(&mut self) -> TaskId {
        let id = TaskId(self.next_task);
        self.next_task += 1;
        id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectState {
    Evaluated,
    Skipped,
    Failed(String),
}

impl ProjectState {
    pub fn label(&self) -> &'static str {
        match self {
            ProjectState::Evaluated => "evaluated",
            ProjectState::Skipped => "skipped",
            ProjectState::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Executed,
    UpToDate,
    Skipped,
    Failed(String),
}

impl TaskState {
    pub fn label(&self) -> &'static str {
        match self {
            TaskState::Executed => "executed",
            TaskState::UpToDate => "up-to-date",
            TaskState::Skipped => "skipped",
            TaskState::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub path: String,
    pub dir: PathBuf,
    pub build_dir: PathBuf,
    pub parent: Option<ProjectId>,
    pub children: Vec<ProjectId>,
    pub tasks: Vec<TaskId>,
    pub enabled: bool,
    pub default_tasks: Vec<String>,
    pub state: Option<ProjectState>,
}

impl Project {
    pub fn new(id: ProjectId, name: String, path: String, dir: PathBuf) -> Self {
        let build_dir = dir.join("build");
        Self {
            id,
            name,
            path,
            dir,
            build_dir,
            parent: None,
            children: Vec::new(),
            tasks: Vec::new(),
            enabled: true,
            default_tasks: Vec::new(),
            state: None,
        }
    }

    pub fn is_evaluated(&self) -> bool {
        matches!(self.state, Some(ProjectState::Evaluated))
    }
}

#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub project: ProjectId,
    pub project_path: String,
    pub name: String,
    pub path: String,
    pub description: Option<String>,
    pub depends_on: Vec<String>,
    pub commands: Vec<Vec<String>>,
    pub enabled: bool,
    pub reconfigures: bool,
}

impl Task {
    pub fn new(id: TaskId, project: &Project, name: String) -> Self {
        Self {
            id,
            project: project.id,
            project_path: project.path.clone(),
            path: child_path(&project.path, &name),
            name,
            description: None,
            depends_on: Vec::new(),
            commands: Vec::new(),
            enabled: true,
            reconfigures: false,
        }
    }
}

/// Joins a project path and a child name: `:` + `core` is `:core`,
/// `:libs` + `net` is `:libs:net`.
pub fn child_path(parent: &str, name: &str) -> String {
    if parent == ":" {
        format!(":{}", name)
    } else {
        format!("{}:{}", parent, name)
    }
}

/// The realized project tree of one graph epoch. Rebuilt wholesale on reload.
#[derive(Debug, Clone)]
pub struct ProjectGraph {
    root: ProjectId,
    projects: BTreeMap<ProjectId, Project>,
    tasks: BTreeMap<TaskId, Task>,
}

impl ProjectGraph {
    pub fn new(root: Project) -> Self {
        let root_id = root.id;
        let mut projects = BTreeMap::new();
        projects.insert(root_id, root);
        Self {
            root: root_id,
            projects,
            tasks: BTreeMap::new(),
        }
    }

    pub fn add_project(&mut self, project: Project) {
        if let Some(parent) = project.parent.and_then(|p| self.projects.get_mut(&p)) {
            parent.children.push(project.id);
        }
        self.projects.insert(project.id, project);
    }

    pub fn add_task(&mut self, task: Task) {
        if let Some(project) = self.projects.get_mut(&task.project) {
            project.tasks.push(task.id);
        }
        self.tasks.insert(task.id, task);
    }

    pub fn root(&self) -> &Project {
        &self.projects[&self.root]
    }

    pub fn root_id(&self) -> ProjectId {
        self.root
    }

    pub fn project(&self, id: ProjectId) -> Option<&Project> {
        self.projects.get(&id)
    }

    pub fn project_mut(&mut self, id: ProjectId) -> Option<&mut Project> {
        self.projects.get_mut(&id)
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    /// Projects in creation order; parents are always created before children.
    pub fn projects(&self) -> impl Iterator<Item = &Project> {
        self.projects.values()
    }

    pub fn project_ids(&self) -> Vec<ProjectId> {
        self.projects.keys().copied().collect()
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn project_tasks(&self, id: ProjectId) -> Vec<&Task> {
        self.project(id)
            .map(|p| p.tasks.iter().filter_map(|t| self.tasks.get(t)).collect())
            .unwrap_or_default()
    }

    pub fn find_project(&self, path: &str) -> Option<&Project> {
        self.projects.values().find(|p| p.path == path)
    }

    pub fn find_task(&self, path: &str) -> Option<&Task> {
        self.tasks.values().find(|t| t.path == path)
    }

    pub fn task_in_project(&self, project: ProjectId, name: &str) -> Option<&Task> {
        self.project_tasks(project).into_iter().find(|t| t.name == name)
    }

    /// The project itself followed by all of its descendants, depth first.
    pub fn subtree(&self, id: ProjectId) -> Vec<ProjectId> {
        let mut result = Vec::new();
        let mut stack = vec![id];

        while let Some(current) = stack.pop() {
            if let Some(project) = self.projects.get(&current) {
                result.push(current);
                for child in project.children.iter().rev() {
                    stack.push(*child);
                }
            }
        }

        result
    }

    /// Resolves a `depends_on` entry: qualified paths are absolute, bare
    /// names are looked up in the owning project.
    pub fn resolve_dependency(&self, task: &Task, dependency: &str) -> Option<TaskId> {
        if dependency.starts_with(':') {
            self.find_task(dependency).map(|t| t.id)
        } else {
            self.task_in_project(task.project, dependency).map(|t| t.id)
        }
    }
}
