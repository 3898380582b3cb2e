//! Task orchestration.
//!
//! A [`Pipeline`] owns the resolved configuration, the project paths and the
//! image backend, and runs tasks one after another. Progress is reported as
//! [`PipelineEvent`]s over an optional channel so the caller decides how (and
//! on which thread) to print it.
//!
//! ```text
//! run([clean, copy, …])
//!   ├─ TaskStarted(clean)  → TaskFinished(report)
//!   ├─ TaskStarted(copy)   → TaskFinished(report)
//!   └─ …stops at the first failing task
//! ```

use crate::config::{self, Paths, PipelineConfig, ProcessingConfig};
use crate::imaging::ImageBackend;
use crate::tasks::{self, Task, TaskContext, TaskError, TaskReport};
use std::sync::mpsc::Sender;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("task '{task}' failed: {source}")]
pub struct PipelineError {
    pub task: Task,
    #[source]
    pub source: TaskError,
}

/// Progress notifications, in the order they happen.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    TaskStarted(Task),
    TaskFinished(TaskReport),
}

pub struct Pipeline<B: ImageBackend> {
    config: PipelineConfig,
    paths: Paths,
    backend: B,
    use_cache: bool,
    events: Option<Sender<PipelineEvent>>,
}

impl<B: ImageBackend> Pipeline<B> {
    pub fn new(config: PipelineConfig, paths: Paths, backend: B) -> Self {
        Self {
            config,
            paths,
            backend,
            use_cache: true,
            events: None,
        }
    }

    /// `false` re-encodes every image regardless of the cache.
    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn with_events(mut self, events: Sender<PipelineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.events {
            // Receiver gone means nobody is listening; the build goes on.
            tx.send(event).ok();
        }
    }

    /// Run a single task.
    pub fn run_task(&self, task: Task) -> Result<TaskReport, PipelineError> {
        self.emit(PipelineEvent::TaskStarted(task));
        let ctx = TaskContext {
            config: &self.config,
            paths: &self.paths,
        };
        let result = match task {
            Task::Clean => tasks::clean::run(&ctx),
            Task::Copy => tasks::copy::run(&ctx),
            Task::Html => tasks::html::run(&ctx),
            Task::Styles => tasks::styles::run(&ctx),
            Task::Js => tasks::js::run(&ctx),
            Task::Images => tasks::images::run(&ctx, &self.backend, self.use_cache),
            Task::Webp => tasks::webp::run(&ctx, &self.backend, self.use_cache),
            Task::Sprite => tasks::sprite::run(&ctx),
        };
        let report = result.map_err(|source| PipelineError { task, source })?;
        tracing::debug!(task = %task, outputs = report.outputs.len(), "task finished");
        self.emit(PipelineEvent::TaskFinished(report.clone()));
        Ok(report)
    }

    /// Run tasks in the given order, stopping at the first failure.
    pub fn run(&self, tasks: &[Task]) -> Result<Vec<TaskReport>, PipelineError> {
        tasks.iter().map(|&task| self.run_task(task)).collect()
    }

    /// Full build in [`Task::BUILD_ORDER`].
    pub fn build(&self) -> Result<Vec<TaskReport>, PipelineError> {
        self.run(&Task::BUILD_ORDER)
    }
}

/// Initialize the rayon thread pool based on processing config.
///
/// Capped at the number of available CPU cores.
/// Only the first call configures the global pool.
pub fn init_thread_pool(processing: &ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
