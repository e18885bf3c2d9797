use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anvil_core::cli::{Commands, HistoryCommands};
use anvil_core::listing::task_listing;
use anvil_core::settings::{BuildFile, BUILD_FILE_NAME};
use anvil_core::{
    BuildHistory, BuildResult, Cli, Config, ConsoleListener, FileSettingsResolver,
    HistoryListener, Logger, Orchestrator, ProfileListener, ShellTaskAction,
};

fn run_build(
    cli: &Cli,
    cwd: &Path,
    config: &Config,
    logger: &Logger,
    profiler: Option<ProfileListener>,
) -> Result<BuildResult> {
    let action = ShellTaskAction::new(logger.clone())?;
    let mut orchestrator = Orchestrator::with_defaults(Box::new(action), logger.clone());

    // Listeners hear `build_finished` in registration order; the console goes
    // last so the verdict is the final line.
    if let Some(profiler) = profiler {
        orchestrator.add_listener(Arc::new(Mutex::new(
            profiler
                .with_outputs(config.profile.outputs())
                .with_logger(logger.clone()),
        )));
    }

    if config.history.enabled {
        let history = BuildHistory::new(config.storage_path(), config.history.max_builds)
            .context("Failed to load history")?;
        orchestrator.add_listener(Arc::new(Mutex::new(HistoryListener::new(history))));
    }

    orchestrator.add_listener(Arc::new(Mutex::new(ConsoleListener::new())));

    let result = orchestrator.run(&cli.request(cwd.to_path_buf()));

    // The console has already reported everything raised before the run finished.
    for failure in result
        .listener_failures()
        .iter()
        .filter(|f| f.event == "build_finished")
    {
        logger.warn(&format!("warning: {}", failure));
    }

    Ok(result)
}

fn list_tasks(cli: &Cli, cwd: &Path, logger: &Logger) -> Result<()> {
    let action = ShellTaskAction::new(logger.clone())?;
    let mut orchestrator = Orchestrator::with_defaults(Box::new(action), logger.clone());

    let graph = orchestrator
        .load_graph(&cli.request(cwd.to_path_buf()))
        .context("Failed to load the project graph")?;

    print!("{}", task_listing(&graph));
    Ok(())
}

fn show_history(config: &Config, logger: &Logger, count: Option<usize>) -> Result<()> {
    let history = BuildHistory::new(config.storage_path(), config.history.max_builds)
        .context("Failed to load history")?;

    let entries = history.entries();
    let count = count.unwrap_or(10).min(entries.len());

    if entries.is_empty() {
        logger.info("No build history found.");
        return Ok(());
    }

    logger.info(&format!("Build History (last {} entries):", count));
    logger.info("");

    for entry in history.recent(count) {
        let status = if entry.success { "✓" } else { "✗" };
        logger.info(&format!(
            "{} {} | {} | {:.1}s | {} executed, {} failed",
            status,
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.task_label(),
            entry.duration,
            entry.tasks_executed,
            entry.tasks_failed
        ));
        if let Some(failure) = &entry.failure {
            logger.info(&format!("    {}", failure));
        }
    }

    Ok(())
}

fn clear_history(config: &Config) -> Result<()> {
    let mut history = BuildHistory::new(config.storage_path(), config.history.max_builds)
        .context("Failed to load build history")?;
    history.clear()?;
    println!("Build history cleared.");
    Ok(())
}

fn init_build_file(cwd: &Path, name: Option<String>) -> Result<()> {
    let path = cwd.join(BUILD_FILE_NAME);

    if path.exists() {
        anyhow::bail!(
            "{} already exists at {}. Remove it first if you want to reinitialize.",
            BUILD_FILE_NAME,
            path.display()
        );
    }

    BuildFile::starter(name)
        .save_to_file(&path)
        .with_context(|| format!("Failed to save {}", BUILD_FILE_NAME))?;

    println!("Created {} at {}", BUILD_FILE_NAME, path.display());

    Ok(())
}

/// Directory holding the settings file, where the project-local config lives.
fn build_root(cli: &Cli, cwd: &Path) -> PathBuf {
    let settings = match &cli.settings_file {
        Some(path) => Some(cwd.join(path)),
        None => FileSettingsResolver::find_settings_file(cwd),
    };

    settings
        .and_then(|path| path.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| cwd.to_path_buf())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Profiling starts as early as possible; it is dropped if not wanted.
    let profiler = ProfileListener::new(Logger::new());

    let cwd = cli.working_directory()?;

    if let Some(Commands::Init { name }) = &cli.command {
        return init_build_file(&cwd, name.clone());
    }

    let config = Config::load(&build_root(&cli, &cwd), cli.config.as_deref())?;
    let logger = Logger::new()
        .with_level(cli.log_level().unwrap_or(config.log.level))
        .with_colors(config.log.colors);

    match &cli.command {
        Some(Commands::History { command }) => {
            return match command {
                HistoryCommands::Show { count } => show_history(&config, &logger, *count),
                HistoryCommands::Clear => clear_history(&config),
            };
        }
        Some(Commands::Tasks) => return list_tasks(&cli, &cwd, &logger),
        Some(Commands::Init { .. }) | None => {}
    }

    let profiler = (cli.profile || config.profile.enabled).then_some(profiler);
    let result = run_build(&cli, &cwd, &config, &logger, profiler)?;

    if !result.is_success() {
        std::process::exit(1);
    }

    Ok(())
}
