use anyhow::Context;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub success: bool,
    pub duration: f64,
    pub stderr: Vec<String>,
    pub exit_code: Option<i32>,
}

impl ExecutionResult {
    /// Exit code or signal, followed by the last line the command wrote to
    /// stderr. `None` when the command succeeded.
    pub fn failure_reason(&self) -> Option<String> {
        if self.success {
            return None;
        }

        let status = self
            .exit_code
            .map(|code| format!("Exit code {}", code))
            .unwrap_or_else(|| "Terminated by signal".to_string());

        match self.stderr.iter().rev().find(|line| !line.trim().is_empty()) {
            Some(line) => Some(format!("{}: {}", status, line.trim())),
            None => Some(status),
        }
    }
}

/// Runs one command in `working_dir`, forwarding every output line to
/// `output_callback` as it arrives.
pub async fn execute_step<F>(
    command: &[String],
    working_dir: &Path,
    mut output_callback: F,
) -> anyhow::Result<ExecutionResult>
where
    F: FnMut(String) + Send + 'static,
{
    let start = Instant::now();

    let (program, args) = command.split_first().context("Empty command")?;

    let mut child = Command::new(program)
        .args(args)
        .current_dir(working_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to spawn command: {}", program))?;

    let stdout = child.stdout.take().context("Failed to capture stdout")?;
    let stderr = child.stderr.take().context("Failed to capture stderr")?;

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let tx_clone = tx.clone();
    let stdout_task = tokio::spawn(async move {
        let mut reader = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = reader.next_line().await {
            let _ = tx_clone.send(line);
        }
    });

    let stderr_task = tokio::spawn(async move {
        let mut lines = Vec::new();
        let mut reader = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = reader.next_line().await {
            lines.push(line.clone());
            let _ = tx.send(line);
        }
        lines
    });

    let callback_task = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            output_callback(line);
        }
    });

    let status = child
        .wait()
        .await
        .context("Failed to wait for child process")?;

    stdout_task.await.context("stdout task panicked")?;
    let stderr_lines = stderr_task.await.context("stderr task panicked")?;

    // Both senders are gone once the readers finish, so the callback drains and exits.
    callback_task.await.context("output task panicked")?;

    Ok(ExecutionResult {
        success: status.success(),
        duration: start.elapsed().as_secs_f64(),
        stderr: stderr_lines,
        exit_code: status.code(),
    })
}

/// Runs commands in order, stopping after the first failure.
pub async fn execute_steps<F>(
    commands: &[Vec<String>],
    working_dir: &Path,
    output_callback: F,
) -> anyhow::Result<Vec<ExecutionResult>>
where
    F: FnMut(String) + Send + 'static + Clone,
{
    let mut results = Vec::new();

    for command in commands {
        let result = execute_step(command, working_dir, output_callback.clone()).await?;
        let success = result.success;
        results.push(result);

        if !success {
            break;
        }
    }

    Ok(results)
}
