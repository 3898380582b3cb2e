//! Remove the build directory.

use super::{Task, TaskContext, TaskError, TaskReport};

/// Delete the build tree. A missing build directory is not an error.
pub fn run(ctx: &TaskContext) -> Result<TaskReport, TaskError> {
    let build = &ctx.paths.build;
    if !build.exists() {
        tracing::debug!(dir = %build.display(), "nothing to clean");
        return Ok(TaskReport::new(Task::Clean));
    }

    let build_abs = build.canonicalize()?;
    let source_abs = ctx
        .paths
        .source
        .canonicalize()
        .unwrap_or_else(|_| ctx.paths.source.clone());
    if source_abs.starts_with(&build_abs) {
        return Err(TaskError::UnsafeClean {
            build: build.clone(),
            source_dir: ctx.paths.source.clone(),
        });
    }

    std::fs::remove_dir_all(build)?;
    tracing::debug!(dir = %build.display(), "removed build directory");
    Ok(TaskReport::new(Task::Clean))
}
