use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use crate::project::{ProjectGraph, TaskId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    CircularDependency(Vec<String>),
    TaskNotFound(TaskId),
    UnresolvedDependency { task: String, dependency: String },
}

impl std::fmt::Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphError::CircularDependency(cycle) => {
                write!(f, "Circular dependency detected between: ")?;
                for (i, task) in cycle.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", task)?;
                }
                Ok(())
            }
            GraphError::TaskNotFound(task) => {
                write!(f, "Task not found in graph: {}", task)
            }
            GraphError::UnresolvedDependency { task, dependency } => {
                write!(f, "Task {} depends on unknown task '{}'", task, dependency)
            }
        }
    }
}

impl std::error::Error for GraphError {}

/// Execution order of a set of tasks: edges run from a dependency to the
/// tasks that need it.
pub struct TaskDependencyGraph {
    adjacency: BTreeMap<TaskId, Vec<TaskId>>,
    in_degree: BTreeMap<TaskId, usize>,
    tasks: BTreeSet<TaskId>,
}

impl TaskDependencyGraph {
    pub fn new() -> Self {
        Self {
            adjacency: BTreeMap::new(),
            in_degree: BTreeMap::new(),
            tasks: BTreeSet::new(),
        }
    }

    /// Collects the transitive dependency closure of `roots`. Tasks in
    /// `excluded` are left out together with whatever only they needed.
    pub fn from_tasks(
        graph: &ProjectGraph,
        roots: &[TaskId],
        excluded: &HashSet<TaskId>,
    ) -> Result<Self, GraphError> {
        let mut result = Self::new();
        let mut queue: VecDeque<TaskId> = roots
            .iter()
            .filter(|id| !excluded.contains(id))
            .copied()
            .collect();
        let mut visited: HashSet<TaskId> = HashSet::new();

        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }

            let task = graph.task(id).ok_or(GraphError::TaskNotFound(id))?;
            result.add_task(id);

            for dependency in &task.depends_on {
                let dep_id = graph.resolve_dependency(task, dependency).ok_or_else(|| {
                    GraphError::UnresolvedDependency {
                        task: task.path.clone(),
                        dependency: dependency.clone(),
                    }
                })?;

                if excluded.contains(&dep_id) {
                    continue;
                }

                result.add_dependency(dep_id, id);
                queue.push_back(dep_id);
            }
        }

        Ok(result)
    }

    pub fn add_task(&mut self, task: TaskId) {
        self.tasks.insert(task);
        self.adjacency.entry(task).or_default();
        self.in_degree.entry(task).or_insert(0);
    }

    pub fn add_dependency(&mut self, from: TaskId, to: TaskId) {
        self.add_task(from);
        self.add_task(to);

        let dependents = self.adjacency.entry(from).or_default();
        if dependents.contains(&to) {
            return;
        }
        dependents.push(to);

        *self.in_degree.entry(to).or_insert(0) += 1;
    }

    /// Layers of tasks whose dependencies are all in earlier layers. Each
    /// layer is sorted by handle.
    pub fn topological_sort(&self, graph: &ProjectGraph) -> Result<Vec<Vec<TaskId>>, GraphError> {
        let mut in_degree = self.in_degree.clone();
        let mut queue: VecDeque<TaskId> = VecDeque::new();
        let mut layers: Vec<Vec<TaskId>> = Vec::new();
        let mut processed = 0;

        for (task, &degree) in &in_degree {
            if degree == 0 {
                queue.push_back(*task);
            }
        }

        while !queue.is_empty() {
            let current_layer_size = queue.len();
            let mut current_layer = Vec::new();

            for _ in 0..current_layer_size {
                if let Some(task) = queue.pop_front() {
                    current_layer.push(task);
                    processed += 1;

                    if let Some(dependents) = self.adjacency.get(&task) {
                        for &dependent in dependents {
                            if let Some(degree) = in_degree.get_mut(&dependent) {
                                *degree -= 1;
                                if *degree == 0 {
                                    queue.push_back(dependent);
                                }
                            }
                        }
                    }
                }
            }

            if !current_layer.is_empty() {
                current_layer.sort();
                layers.push(current_layer);
            }
        }

        if processed != self.tasks.len() {
            let remaining: Vec<String> = self
                .tasks
                .iter()
                .filter(|t| in_degree.get(t).map_or(false, |&d| d > 0))
                .map(|t| graph.task(*t).map(|t| t.path.clone()).unwrap_or_else(|| t.to_string()))
                .collect();
            return Err(GraphError::CircularDependency(remaining));
        }

        Ok(layers)
    }
}

impl Default for TaskDependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}
