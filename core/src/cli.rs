use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::logger::LogLevel;
use crate::settings::InvocationRequest;

#[derive(Parser, Debug)]
#[command(name = "anvil")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(value_name = "TASKS", help = "Tasks to run (defaults to the project's default tasks)")]
    pub tasks: Vec<String>,

    #[arg(
        short = 'x',
        long = "exclude-task",
        value_name = "TASK",
        help = "Task to leave out, along with what only it needs"
    )]
    pub exclude: Vec<String>,

    #[arg(
        short = 'C',
        long = "directory",
        value_name = "DIR",
        help = "Directory to run the build from"
    )]
    pub directory: Option<PathBuf>,

    #[arg(long, value_name = "FILE", help = "Settings file to use instead of searching for one")]
    pub settings_file: Option<PathBuf>,

    #[arg(long, help = "Run all requested tasks as a single unit of work")]
    pub merged: bool,

    #[arg(long, help = "Write profile reports under <build>/reports/profile")]
    pub profile: bool,

    #[arg(long, conflicts_with = "quiet", help = "Log debug output")]
    pub debug: bool,

    #[arg(short, long, help = "Log errors only")]
    pub quiet: bool,

    #[arg(long, value_name = "FILE", help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum HistoryCommands {
    #[command(about = "Show history")]
    Show {
        #[arg(short, long, help = "Number of entries to show")]
        count: Option<usize>,
    },

    #[command(about = "Clear history")]
    Clear,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "List projects and their tasks")]
    Tasks,

    #[command(about = "Manage build history")]
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },

    #[command(about = "Initialize a new anvil.toml build file")]
    Init {
        #[arg(long, help = "Project name")]
        name: Option<String>,
    },
}

impl Cli {
    pub fn working_directory(&self) -> anyhow::Result<PathBuf> {
        let cwd = std::env::current_dir()?;
        Ok(match &self.directory {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => cwd.join(dir),
            None => cwd,
        })
    }

    /// Level forced by `--debug`/`--quiet`, if any.
    pub fn log_level(&self) -> Option<LogLevel> {
        if self.debug {
            Some(LogLevel::Debug)
        } else if self.quiet {
            Some(LogLevel::Error)
        } else {
            None
        }
    }

    pub fn request(&self, current_dir: PathBuf) -> InvocationRequest {
        let mut request = InvocationRequest::new(current_dir)
            .with_tasks(self.tasks.iter().cloned())
            .with_excluded(self.exclude.iter().cloned())
            .merged(self.merged);
        if let Some(path) = &self.settings_file {
            request = request.with_settings_file(path.clone());
        }
        request
    }
}
