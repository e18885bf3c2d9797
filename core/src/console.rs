use std::io::{self, Write};
use std::time::Instant;

use crate::events::{BuildListener, ProjectEvaluationListener, TaskExecutionListener};
use crate::orchestrator::BuildResult;
use crate::profile::format_duration;
use crate::project::{Project, ProjectState, Task, TaskState};
use crate::settings::InvocationRequest;

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const RESET: &str = "\x1b[0m";

/// Task progress and the closing build verdict, written to a terminal.
pub struct ConsoleListener<W: Write = io::Stdout> {
    out: W,
    use_colors: bool,
    started: Option<Instant>,
}

impl ConsoleListener<io::Stdout> {
    pub fn new() -> Self {
        Self::with_writer(io::stdout(), atty::is(atty::Stream::Stdout))
    }
}

impl Default for ConsoleListener<io::Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> ConsoleListener<W> {
    pub fn with_writer(out: W, use_colors: bool) -> Self {
        Self {
            out,
            use_colors,
            started: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.use_colors {
            format!("{}{}{}", color, text, RESET)
        } else {
            text.to_string()
        }
    }

    fn line(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "{}", text)?;
        self.out.flush()
    }
}

impl<W: Write> BuildListener for ConsoleListener<W> {
    fn build_started(&mut self, _request: &InvocationRequest) -> anyhow::Result<()> {
        self.started = Some(Instant::now());
        Ok(())
    }

    fn build_finished(&mut self, result: &BuildResult) -> anyhow::Result<()> {
        let elapsed = self
            .started
            .map(|s| s.elapsed().as_millis() as i64)
            .unwrap_or(0);

        for failure in result.listener_failures() {
            let warning = self.paint(YELLOW, &format!("warning: {}", failure));
            self.line(&warning)?;
        }

        match result.failure() {
            None => {
                let verdict = self.paint(GREEN, "BUILD SUCCESSFUL");
                self.line(&format!("\n{} in {}", verdict, format_duration(elapsed)))?;
            }
            Some(failure) => {
                self.line(&format!("\nFAILURE: {}", failure))?;
                let verdict = self.paint(RED, "BUILD FAILED");
                self.line(&format!("\n{} in {}", verdict, format_duration(elapsed)))?;
            }
        }

        Ok(())
    }
}

impl<W: Write> ProjectEvaluationListener for ConsoleListener<W> {
    fn after_evaluate(&mut self, project: &Project, state: &ProjectState) -> anyhow::Result<()> {
        if let ProjectState::Failed(reason) = state {
            let status = self.paint(RED, "FAILED");
            self.line(&format!("> Configure project {} {}: {}", project.path, status, reason))?;
        }
        Ok(())
    }
}

impl<W: Write> TaskExecutionListener for ConsoleListener<W> {
    fn after_execute(&mut self, task: &Task, state: &TaskState) -> anyhow::Result<()> {
        let suffix = match state {
            TaskState::Executed => String::new(),
            TaskState::UpToDate => " UP-TO-DATE".to_string(),
            TaskState::Skipped => " SKIPPED".to_string(),
            TaskState::Failed(_) => format!(" {}", self.paint(RED, "FAILED")),
        };
        self.line(&format!("> Task {}{}", task.path, suffix))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BuildError, ListenerFailure};
    use crate::project::IdIssuer;
    use std::path::PathBuf;

    fn tasks() -> Vec<Task> {
        let mut ids = IdIssuer::new();
        let app = Project::new(ids.next_project(), "app".to_string(), ":app".to_string(), PathBuf::from("/ws/app"));
        ["compile", "generate", "docs", "test"]
            .into_iter()
            .map(|name| Task::new(ids.next_task(), &app, name.to_string()))
            .collect()
    }

    fn output(console: ConsoleListener<Vec<u8>>) -> String {
        String::from_utf8(console.into_inner()).unwrap()
    }

    #[test]
    fn test_task_lines() {
        let mut console = ConsoleListener::with_writer(Vec::new(), false);
        let tasks = tasks();
        let states = [
            TaskState::Executed,
            TaskState::UpToDate,
            TaskState::Skipped,
            TaskState::Failed("Exit code 1".to_string()),
        ];
        for (task, state) in tasks.iter().zip(states.iter()) {
            console.after_execute(task, state).unwrap();
        }

        assert_eq!(
            output(console),
            "> Task :app:compile\n\
             > Task :app:generate UP-TO-DATE\n\
             > Task :app:docs SKIPPED\n\
             > Task :app:test FAILED\n"
        );
    }

    #[test]
    fn test_successful_verdict() {
        let mut console = ConsoleListener::with_writer(Vec::new(), false);
        console
            .build_started(&InvocationRequest::new(PathBuf::from("/ws")))
            .unwrap();
        console.build_finished(&BuildResult::new(None, None)).unwrap();

        let text = output(console);
        assert!(text.starts_with("\nBUILD SUCCESSFUL in "));
        assert!(text.trim_end().ends_with('s'));
    }

    #[test]
    fn test_failed_verdict_names_failure() {
        let mut console = ConsoleListener::with_writer(Vec::new(), false);
        let result = BuildResult::new(None, Some(BuildError::NoTasks));
        console.build_finished(&result).unwrap();

        let text = output(console);
        assert!(text.contains("FAILURE: no tasks specified and no default tasks defined"));
        assert!(text.contains("BUILD FAILED in 0.000s"));
    }

    #[test]
    fn test_colors_wrap_verdict() {
        let mut console = ConsoleListener::with_writer(Vec::new(), true);
        console.build_finished(&BuildResult::new(None, None)).unwrap();

        assert!(output(console).contains("\x1b[32mBUILD SUCCESSFUL\x1b[0m"));
    }

    #[test]
    fn test_listener_failures_shown_as_warnings() {
        let mut console = ConsoleListener::with_writer(Vec::new(), false);
        let mut result = BuildResult::new(None, None);
        result.push_listener_failure(ListenerFailure::new("after_execute", anyhow::anyhow!("disk full")));
        console.build_finished(&result).unwrap();

        assert!(output(console).starts_with("warning: listener failed during after_execute: disk full\n"));
    }
}
