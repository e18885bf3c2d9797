use std::fmt::Write as _;

use crate::project::{ProjectGraph, ProjectState};

/// Every project in the tree, parent-first, with its tasks.
pub fn task_listing(graph: &ProjectGraph) -> String {
    let mut out = String::new();

    for id in graph.subtree(graph.root_id()) {
        let Some(project) = graph.project(id) else {
            continue;
        };

        let status = match &project.state {
            Some(ProjectState::Skipped) => " (disabled)",
            Some(ProjectState::Failed(_)) => " (failed to evaluate)",
            _ => "",
        };
        let _ = writeln!(out, "Project {} ({}){}", project.path, project.name, status);

        if !project.default_tasks.is_empty() {
            let _ = writeln!(out, "  default tasks: {}", project.default_tasks.join(", "));
        }

        let tasks = graph.project_tasks(id);
        if tasks.is_empty() {
            out.push_str("  (no tasks)\n");
        }
        for task in tasks {
            match &task.description {
                Some(description) => {
                    let _ = writeln!(out, "  {} - {}", task.name, description);
                }
                None => {
                    let _ = writeln!(out, "  {}", task.name);
                }
            }
        }
    }

    out
}
