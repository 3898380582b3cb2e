//! The `dev` and `serve` commands: serve the build tree with live reload
//! and, for `dev`, rebuild on source changes.
//!
//! The server runs on a tokio runtime; the watcher blocks on its own thread
//! (`spawn_blocking`) and calls into the synchronous [`Pipeline`]. A failed
//! rebuild is printed and the loop keeps watching; browsers are only told to
//! reload after a rebuild succeeds.

use crate::imaging::ImageBackend;
use crate::output;
use crate::pipeline::Pipeline;
use crate::server::{self, LiveReload, ServerError};
use crate::watch::{self, ReloadKind, WatchError, WatchPlan};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

#[derive(Error, Debug)]
pub enum DevError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error(transparent)]
    Watch(#[from] WatchError),
    #[error("watcher thread failed: {0}")]
    Join(String),
}

/// Rebuild for one batch of changed paths and notify browsers.
///
/// Returns the reload that was sent, if any.
pub fn handle_changes<B: ImageBackend>(
    pipeline: &Pipeline<B>,
    plan: &WatchPlan,
    live: &LiveReload,
    changed: &[String],
) -> Option<ReloadKind> {
    let rebuild = plan.plan(changed);
    if rebuild.is_empty() {
        tracing::debug!(?changed, "no task affected");
        return None;
    }
    output::print_rebuild_notice(changed, &rebuild.tasks);
    if let Err(e) = pipeline.run(&rebuild.tasks) {
        output::print_task_error(&e);
        return None;
    }
    let kind = rebuild.reload?;
    let clients = live.notify(kind);
    tracing::debug!(event = kind.event_name(), clients, "reload sent");
    Some(kind)
}

/// Serve `pipeline`'s build directory until Ctrl+C. With `watch`, source
/// changes trigger rebuilds and browser reloads.
pub fn run<B>(pipeline: Arc<Pipeline<B>>, watch: bool) -> Result<(), DevError>
where
    B: ImageBackend + Send + 'static,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve_and_watch(pipeline, watch))
}

async fn serve_and_watch<B>(pipeline: Arc<Pipeline<B>>, watch: bool) -> Result<(), DevError>
where
    B: ImageBackend + Send + 'static,
{
    let server_config = &pipeline.config().server;
    let listener = server::bind(
        &server_config.host,
        server_config.port,
        server_config.port_attempts,
    )
    .await?;
    let addr = listener.local_addr()?;
    let live = LiveReload::new();
    let app = server::router(&pipeline.paths().build, live.clone(), server_config.cors);
    output::print_serve_notice(addr, &pipeline.paths().build);

    let running = Arc::new(AtomicBool::new(true));
    let mut watcher = None;
    let mut watcher_done = None;
    if watch {
        let plan = WatchPlan::from_config(pipeline.config())?;
        let debounce = Duration::from_millis(pipeline.config().watch.debounce_ms);
        output::print_watch_notice(&pipeline.paths().source);

        let (done_tx, done_rx) = oneshot::channel::<()>();
        watcher_done = Some(done_rx);
        let pipeline = Arc::clone(&pipeline);
        let running = Arc::clone(&running);
        let live = live.clone();
        watcher = Some(tokio::task::spawn_blocking(move || {
            let result = watch::watch(&pipeline.paths().source, debounce, running, |changed| {
                handle_changes(&pipeline, &plan, &live, &changed);
            });
            done_tx.send(()).ok();
            result
        }));
    }

    let shutdown_running = Arc::clone(&running);
    let shutdown_live = live.clone();
    let shutdown = async move {
        let watcher_stopped = async {
            match watcher_done {
                Some(rx) => {
                    rx.await.ok();
                }
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
            _ = watcher_stopped => tracing::warn!("watcher stopped, shutting down"),
        }
        shutdown_running.store(false, Ordering::SeqCst);
        shutdown_live.close();
    };
    server::serve(listener, app, shutdown).await?;

    running.store(false, Ordering::SeqCst);
    if let Some(handle) = watcher {
        handle.await.map_err(|e| DevError::Join(e.to_string()))??;
    }
    Ok(())
}
