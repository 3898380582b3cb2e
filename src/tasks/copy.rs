//! Byte-for-byte copy of static files (fonts, favicon).

use super::{OutputRecord, OutputStatus, Task, TaskContext, TaskError, TaskReport, plan_outputs};
use crate::sources::{self, SourceSet};

pub fn run(ctx: &TaskContext) -> Result<TaskReport, TaskError> {
    let set = SourceSet::new(&ctx.config.copy.patterns, ctx.config.copy.base.dir());
    let files = sources::resolve(&ctx.paths.source, &set)?;
    let planned = plan_outputs(&files, |file| file.relative.clone())?;

    let mut report = TaskReport::new(Task::Copy);
    for (file, output) in files.into_iter().zip(planned) {
        let dest = ctx.paths.build.join(&output);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let size = std::fs::copy(&file.path, &dest)?;
        report.outputs.push(OutputRecord {
            sources: vec![file.source_relative],
            output,
            size,
            status: OutputStatus::Copied,
            original_size: None,
        });
    }
    Ok(report)
}
