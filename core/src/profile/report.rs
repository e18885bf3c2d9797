use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};

use super::BuildProfile;
use crate::error::ReportError;

pub const REPORT_DIR: &str = "reports/profile";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";
pub const DEFAULT_PREFIX: &str = "profile";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileFormat {
    Html,
    #[serde(rename = "txt")]
    Text,
    Csv,
}

impl ProfileFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ProfileFormat::Html => ".html",
            ProfileFormat::Text => ".txt",
            ProfileFormat::Csv => ".csv",
        }
    }

    pub fn render(&self, profile: &BuildProfile) -> String {
        match self {
            ProfileFormat::Html => render_html(profile),
            ProfileFormat::Text => render_text(profile),
            ProfileFormat::Csv => render_csv(profile),
        }
    }
}

/// One report file per run: `<prefix>-<timestamp><extension>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileOutput {
    pub prefix: String,
    pub format: ProfileFormat,
}

impl ProfileOutput {
    pub fn new(prefix: impl Into<String>, format: ProfileFormat) -> Self {
        Self {
            prefix: prefix.into(),
            format,
        }
    }

    pub fn defaults() -> Vec<Self> {
        [ProfileFormat::Html, ProfileFormat::Text, ProfileFormat::Csv]
            .into_iter()
            .map(|format| Self::new(DEFAULT_PREFIX, format))
            .collect()
    }

    pub fn report_path(&self, build_dir: &Path, profiling_started: i64) -> PathBuf {
        build_dir.join(REPORT_DIR).join(format!(
            "{}-{}{}",
            self.prefix,
            format_timestamp(profiling_started),
            self.format.extension()
        ))
    }
}

#[derive(Debug, Default)]
pub struct ReportOutcome {
    pub written: Vec<PathBuf>,
    pub failures: Vec<ReportError>,
}

pub fn format_timestamp(millis: i64) -> String {
    Local
        .timestamp_millis_opt(millis)
        .single()
        .map(|at| at.format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_else(|| millis.to_string())
}

/// `0.200s` below a minute, `1m 3.450s` above.
pub fn format_duration(millis: i64) -> String {
    let sign = if millis < 0 { "-" } else { "" };
    let millis = millis.unsigned_abs();
    let minutes = millis / 60_000;
    let seconds = (millis % 60_000) / 1000;
    let fraction = millis % 1000;

    if minutes > 0 {
        format!("{}{}m {}.{:03}s", sign, minutes, seconds, fraction)
    } else {
        format!("{}{}.{:03}s", sign, seconds, fraction)
    }
}

/// Writes every output, carrying on past failures.
pub fn write_reports(profile: &BuildProfile, build_dir: &Path, outputs: &[ProfileOutput]) -> ReportOutcome {
    let mut outcome = ReportOutcome::default();

    for output in outputs {
        let path = output.report_path(build_dir, profile.profiling_started());
        match write_report(&path, &output.format.render(profile)) {
            Ok(()) => outcome.written.push(path),
            Err(e) => outcome.failures.push(e),
        }
    }

    outcome
}

fn write_report(path: &Path, content: &str) -> Result<(), ReportError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ReportError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let io_error = |source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = BufWriter::new(File::create(path).map_err(io_error)?);
    writer.write_all(content.as_bytes()).map_err(io_error)?;
    writer.flush().map_err(io_error)
}

fn outcome_label(profile: &BuildProfile) -> &'static str {
    match profile.successful() {
        Some(true) => "SUCCESSFUL",
        Some(false) => "FAILED",
        None => "UNKNOWN",
    }
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn escape_csv(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn bar_width(value: i64, max: i64) -> i64 {
    if max <= 0 {
        0
    } else {
        (value.max(0) * 100) / max
    }
}

// `write!` into a String cannot fail, so the results below are discarded.

fn render_html(profile: &BuildProfile) -> String {
    let mut out = String::new();
    let title = format!(
        "Profile report for '{}' at {}",
        profile.task_description(),
        format_timestamp(profile.profiling_started())
    );
    let max = profile.max_project_execution();

    out.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    let _ = writeln!(out, "<title>{}</title>", escape_html(&title));
    out.push_str(
        "<style>\n\
         body { font-family: sans-serif; }\n\
         td.numeric { text-align: right; }\n\
         .bar { background: #4a90d9; height: 0.8em; }\n\
         </style>\n</head>\n<body>\n",
    );
    let _ = writeln!(out, "<h1>{}</h1>", escape_html(&title));
    let _ = writeln!(
        out,
        "<p>Build {} in {}</p>",
        outcome_label(profile),
        format_duration(profile.elapsed_total())
    );

    out.push_str("<h2>Summary</h2>\n<table>\n<tr><th>Phase</th><th>Duration</th></tr>\n");
    for (label, elapsed) in profile.phases() {
        let _ = writeln!(
            out,
            "<tr><td>{}</td><td class=\"numeric\">{}</td></tr>",
            label,
            format_duration(elapsed)
        );
    }
    let _ = writeln!(
        out,
        "<tr><th>Total</th><th class=\"numeric\">{}</th></tr>\n</table>",
        format_duration(profile.elapsed_total())
    );

    out.push_str("<h2>Project evaluation</h2>\n<table>\n<tr><th>Project</th><th>Duration</th><th>Result</th></tr>\n");
    for project in profile.projects() {
        let _ = writeln!(
            out,
            "<tr><td>{}</td><td class=\"numeric\">{}</td><td>{}</td></tr>",
            escape_html(&project.path),
            format_duration(project.elapsed_evaluation()),
            project.state_label()
        );
    }
    out.push_str("</table>\n");

    out.push_str("<h2>Task execution</h2>\n<table>\n<tr><th>Task</th><th>Duration</th><th>Result</th><th></th></tr>\n");
    for project in profile.projects() {
        let total = project.elapsed_task_execution();
        let _ = writeln!(
            out,
            "<tr><th>{}</th><th class=\"numeric\">{}</th><th>(total)</th>\
             <th><div class=\"bar\" style=\"width: {}%\"></div></th></tr>",
            escape_html(&project.path),
            format_duration(total),
            bar_width(total, max)
        );
        for task in project.tasks() {
            let _ = writeln!(
                out,
                "<tr><td>{}</td><td class=\"numeric\">{}</td><td>{}</td><td></td></tr>",
                escape_html(&task.path),
                format_duration(task.elapsed()),
                task.state_label()
            );
        }
    }
    let _ = writeln!(
        out,
        "<tr><th>All tasks</th><th class=\"numeric\">{}</th><th></th><th></th></tr>\n</table>",
        format_duration(profile.total_task_execution())
    );

    out.push_str("</body>\n</html>\n");
    out
}

fn render_text(profile: &BuildProfile) -> String {
    const WIDTH: usize = 48;
    let mut out = String::new();

    let _ = writeln!(
        out,
        "Profile report for '{}' at {}",
        profile.task_description(),
        format_timestamp(profile.profiling_started())
    );
    let _ = writeln!(out, "Build {}\n", outcome_label(profile));

    let _ = writeln!(out, "{:<WIDTH$}{:>14}", "Phase", "Duration");
    for (label, elapsed) in profile.phases() {
        let _ = writeln!(out, "{:<WIDTH$}{:>14}", label, format_duration(elapsed));
    }
    let _ = writeln!(out, "{:<WIDTH$}{:>14}\n", "Total", format_duration(profile.elapsed_total()));

    let _ = writeln!(out, "{:<WIDTH$}{:>14}  {}", "Project evaluation", "Duration", "Result");
    for project in profile.projects() {
        let _ = writeln!(
            out,
            "{:<WIDTH$}{:>14}  {}",
            project.path,
            format_duration(project.elapsed_evaluation()),
            project.state_label()
        );
    }
    out.push('\n');

    let _ = writeln!(out, "{:<WIDTH$}{:>14}  {}", "Task execution", "Duration", "Result");
    for project in profile.projects() {
        let _ = writeln!(
            out,
            "{:<WIDTH$}{:>14}  (total)",
            project.path,
            format_duration(project.elapsed_task_execution())
        );
        for task in project.tasks() {
            let _ = writeln!(
                out,
                "  {:<w$}{:>14}  {}",
                task.path,
                format_duration(task.elapsed()),
                task.state_label(),
                w = WIDTH - 2
            );
        }
    }
    let _ = writeln!(
        out,
        "{:<WIDTH$}{:>14}",
        "All tasks",
        format_duration(profile.total_task_execution())
    );

    out
}

fn render_csv(profile: &BuildProfile) -> String {
    let mut out = String::from("project,task,state,start,finish,duration_ms\n");

    for project in profile.projects() {
        for task in project.tasks() {
            let _ = writeln!(
                out,
                "{},{},{},{},{},{}",
                escape_csv(&project.path),
                escape_csv(&task.path),
                task.state_label(),
                task.start(),
                task.finish(),
                task.elapsed()
            );
        }
    }

    out
}
