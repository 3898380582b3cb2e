//! CLI output formatting.
//!
//! # Output Format
//!
//! ## Build
//!
//! ```text
//! ==> copy
//!     favicon.ico → favicon.ico (1.1 KB, copied)
//! ==> styles
//!     sass/style.scss → css/styles.min.css (6.2 KB)
//!     sass/style.scss → css/styles.min.css.map (9.8 KB)
//! ==> js
//!     js/menu.js, js/slider.js → js/app.min.js (1.4 KB, -52%)
//! ==> images
//!     img/hero.jpg → img/hero.jpg (84.0 KB, encoded, -31%)
//!     img/logo.png → img/logo.png (3.1 KB, kept)
//!     Cache: 4 cached, 1 encoded (5 total)
//! ```
//!
//! ## Check
//!
//! ```text
//! copy (3 files)
//!     favicon.ico
//!     fonts/open-sans-bold.woff2
//! styles (1 file)
//!     sass/style.scss
//! ```
//!
//! # Architecture
//!
//! Every `format_*` function returns `Vec<String>` (or `String`) and does no
//! I/O, so tests assert on exact lines. `print_*` wrappers write to stdout.

use crate::pipeline::{PipelineError, PipelineEvent};
use crate::sources::SourceFile;
use crate::tasks::{OutputRecord, OutputStatus, Task, TaskReport};
use std::net::SocketAddr;
use std::path::Path;

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Human-readable byte count.
///
/// ```text
/// 512       → 512 B
/// 1536      → 1.5 KB
/// 3_670_016 → 3.5 MB
/// ```
pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    let b = bytes as f64;
    if b >= MB {
        format!("{:.1} MB", b / MB)
    } else if b >= KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{bytes} B")
    }
}

/// Relative size change, `None` when there is nothing to report.
fn format_savings(original: u64, size: u64) -> Option<String> {
    if original == 0 || size >= original {
        return None;
    }
    let percent = ((original - size) as f64 / original as f64 * 100.0).round() as u64;
    if percent == 0 {
        return None;
    }
    Some(format!("-{percent}%"))
}

/// One output line: sources, arrow, output and a parenthesised detail list.
fn output_line(record: &OutputRecord) -> String {
    let mut details = vec![format_size(record.size)];
    match record.status {
        OutputStatus::Written => {}
        status => details.push(status.label().to_string()),
    }
    if let Some(savings) = record
        .original_size
        .and_then(|original| format_savings(original, record.size))
    {
        details.push(savings);
    }
    format!(
        "{}{} → {} ({})",
        indent(1),
        record.sources.join(", "),
        record.output,
        details.join(", ")
    )
}

/// Header printed when a task begins.
pub fn format_task_started(task: Task) -> Vec<String> {
    vec![format!("==> {task}")]
}

/// Lines describing a finished task.
pub fn format_task_report(report: &TaskReport) -> Vec<String> {
    let mut lines = Vec::new();
    if report.outputs.is_empty() {
        let note = match report.task {
            Task::Clean => "build directory removed",
            _ => "no matching sources",
        };
        lines.push(format!("{}{}", indent(1), note));
    }
    lines.extend(report.outputs.iter().map(output_line));
    if let Some(stats) = &report.cache
        && stats.total() > 0
    {
        lines.push(format!("{}Cache: {}", indent(1), stats));
    }
    lines
}

/// Format a single pipeline progress event as display lines.
pub fn format_pipeline_event(event: &PipelineEvent) -> Vec<String> {
    match event {
        PipelineEvent::TaskStarted(task) => format_task_started(*task),
        PipelineEvent::TaskFinished(report) => format_task_report(report),
    }
}

pub fn print_pipeline_event(event: &PipelineEvent) {
    for line in format_pipeline_event(event) {
        println!("{}", line);
    }
}

/// Closing line of a build.
pub fn format_build_summary(reports: &[TaskReport], build_dir: &Path) -> String {
    let files: usize = reports.iter().map(|r| r.outputs.len()).sum();
    let noun = if files == 1 { "file" } else { "files" };
    format!(
        "==> Build complete: {} {} in {}",
        files,
        noun,
        build_dir.display()
    )
}

/// A failed task, as shown while watching (the process keeps running).
pub fn format_task_error(error: &PipelineError) -> Vec<String> {
    vec![format!("!!  {error}")]
}

pub fn print_task_error(error: &PipelineError) {
    for line in format_task_error(error) {
        eprintln!("{}", line);
    }
}

// ============================================================================
// Check
// ============================================================================

/// Source files each task would read.
pub fn format_check_output(inputs: &[(Task, Vec<SourceFile>)]) -> Vec<String> {
    let mut lines = Vec::new();
    for (task, files) in inputs {
        let noun = if files.len() == 1 { "file" } else { "files" };
        lines.push(format!("{} ({} {})", task, files.len(), noun));
        for file in files {
            lines.push(format!("{}{}", indent(1), file.source_relative));
        }
    }
    lines
}

pub fn print_check_output(inputs: &[(Task, Vec<SourceFile>)]) {
    for line in format_check_output(inputs) {
        println!("{}", line);
    }
}

// ============================================================================
// Dev server and watcher
// ============================================================================

pub fn format_serve_notice(addr: SocketAddr, build_dir: &Path) -> Vec<String> {
    vec![
        format!("==> Serving {} at http://{}", build_dir.display(), addr),
        format!("{}Live reload: /__livereload", indent(1)),
    ]
}

pub fn print_serve_notice(addr: SocketAddr, build_dir: &Path) {
    for line in format_serve_notice(addr, build_dir) {
        println!("{}", line);
    }
}

pub fn format_watch_notice(source_dir: &Path) -> Vec<String> {
    vec![format!(
        "==> Watching {} for changes (Ctrl+C to stop)",
        source_dir.display()
    )]
}

pub fn print_watch_notice(source_dir: &Path) {
    for line in format_watch_notice(source_dir) {
        println!("{}", line);
    }
}

/// Which changed files triggered which tasks.
///
/// ```text
/// ==> Changed: sass/_buttons.scss, index.html
///     Running: html, styles
/// ```
pub fn format_rebuild_notice(changed: &[String], tasks: &[Task]) -> Vec<String> {
    let names: Vec<&str> = tasks.iter().map(|t| t.name()).collect();
    vec![
        format!("==> Changed: {}", changed.join(", ")),
        format!("{}Running: {}", indent(1), names.join(", ")),
    ]
}

pub fn print_rebuild_notice(changed: &[String], tasks: &[Task]) {
    for line in format_rebuild_notice(changed, tasks) {
        println!("{}", line);
    }
}
