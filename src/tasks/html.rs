//! HTML whitespace collapse.
//!
//! Only whitespace is touched: closing tags, `<html>`/`<head>` and (by
//! default) comments survive, and inline CSS/JS is left alone.

use super::{
    OutputRecord, OutputStatus, Task, TaskContext, TaskError, TaskReport, plan_outputs,
    write_output,
};
use crate::config::HtmlConfig;
use crate::sources::{self, SourceSet};

fn minify_cfg(config: &HtmlConfig) -> minify_html::Cfg {
    minify_html::Cfg {
        keep_comments: config.keep_comments,
        keep_closing_tags: true,
        keep_html_and_head_opening_tags: true,
        ..minify_html::Cfg::default()
    }
}

/// Collapse whitespace in one document.
pub fn minify(html: &[u8], config: &HtmlConfig) -> Vec<u8> {
    minify_html::minify(html, &minify_cfg(config))
}

pub fn run(ctx: &TaskContext) -> Result<TaskReport, TaskError> {
    let html = &ctx.config.html;
    let set = SourceSet::new(&html.patterns, html.base.dir());
    let files = sources::resolve(&ctx.paths.source, &set)?;
    let planned = plan_outputs(&files, |file| file.relative.clone())?;

    let mut report = TaskReport::new(Task::Html);
    for (file, relative) in files.into_iter().zip(planned) {
        let input = std::fs::read(&file.path)?;
        let output = minify(&input, html);
        write_output(&ctx.paths.build, &relative, &output)?;
        report.outputs.push(OutputRecord {
            sources: vec![file.source_relative],
            output: relative,
            size: output.len() as u64,
            status: OutputStatus::Written,
            original_size: Some(input.len() as u64),
        });
    }
    Ok(report)
}
