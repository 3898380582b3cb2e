//! Source tree watching.
//!
//! Two halves:
//!
//! - [`WatchPlan`] decides what a batch of changed files means: which tasks
//!   to re-run and what kind of browser reload follows.
//! - [`watch`] turns raw `notify` events into debounced batches of
//!   source-relative paths until the shared `running` flag is cleared.
//!
//! | Changed file matches | Tasks | Reload |
//! |----------------------|-------|--------|
//! | `styles.watch` | `styles` | CSS only |
//! | `html.patterns` | `html` | full page |
//! | `js.patterns` | `js` | full page |
//!
//! Anything else is ignored. Tasks run at most once per batch, in build
//! order.

use crate::config::PipelineConfig;
use crate::sources::{self, SourcesError};
use crate::tasks::Task;
use globset::GlobSet;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::channel;
use std::time::{Duration, Instant};
use thiserror::Error;

/// How often the loop wakes up to check the running flag.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("file watcher error: {0}")]
    Notify(String),
    #[error(transparent)]
    Sources(#[from] SourcesError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// What connected browsers should do after a rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReloadKind {
    /// Swap stylesheets in place.
    Css,
    /// Reload the page.
    Full,
}

impl ReloadKind {
    /// SSE event name sent to the browser.
    pub fn event_name(self) -> &'static str {
        match self {
            ReloadKind::Css => "css",
            ReloadKind::Full => "reload",
        }
    }
}

struct WatchRule {
    globs: GlobSet,
    task: Task,
    reload: ReloadKind,
}

/// Tasks and reload to perform for one batch of changes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Rebuild {
    pub tasks: Vec<Task>,
    pub reload: Option<ReloadKind>,
}

impl Rebuild {
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Maps changed source files to tasks.
pub struct WatchPlan {
    rules: Vec<WatchRule>,
}

impl WatchPlan {
    pub fn from_config(config: &PipelineConfig) -> Result<Self, WatchError> {
        let rules = vec![
            WatchRule {
                globs: sources::glob_set(&config.styles.watch)?,
                task: Task::Styles,
                reload: ReloadKind::Css,
            },
            WatchRule {
                globs: sources::glob_set(&config.html.patterns)?,
                task: Task::Html,
                reload: ReloadKind::Full,
            },
            WatchRule {
                globs: sources::glob_set(&config.js.patterns)?,
                task: Task::Js,
                reload: ReloadKind::Full,
            },
        ];
        Ok(Self { rules })
    }

    /// Decide what to do about `changed` (paths relative to the source root).
    ///
    /// A full reload wins over a CSS refresh when both are triggered.
    pub fn plan(&self, changed: &[String]) -> Rebuild {
        let mut tasks = BTreeSet::new();
        let mut reload = None;
        for path in changed {
            for rule in &self.rules {
                if rule.globs.is_match(path) {
                    tasks.insert(rule.task);
                    reload = reload.max(Some(rule.reload));
                }
            }
        }
        Rebuild {
            tasks: tasks.into_iter().collect(),
            reload,
        }
    }
}

/// Pending changes and the time of the most recent one.
pub struct WatcherState {
    pending: BTreeSet<String>,
    last_change: Option<Instant>,
    debounce: Duration,
}

impl WatcherState {
    pub fn new(debounce: Duration) -> Self {
        Self {
            pending: BTreeSet::new(),
            last_change: None,
            debounce,
        }
    }

    pub fn add_change(&mut self, path: String) {
        self.add_change_at(path, Instant::now());
    }

    fn add_change_at(&mut self, path: String, at: Instant) {
        self.pending.insert(path);
        self.last_change = Some(at);
    }

    /// True once changes are pending and the quiet period has passed.
    pub fn should_flush(&self) -> bool {
        self.should_flush_at(Instant::now())
    }

    fn should_flush_at(&self, now: Instant) -> bool {
        match self.last_change {
            Some(last) => !self.pending.is_empty() && now.duration_since(last) >= self.debounce,
            None => false,
        }
    }

    /// Take all pending changes (sorted), resetting state.
    pub fn take_changes(&mut self) -> Vec<String> {
        self.last_change = None;
        std::mem::take(&mut self.pending).into_iter().collect()
    }
}

/// `path` relative to `root`, trying the canonical root as well since some
/// platforms report resolved paths.
fn relative_to(roots: &[PathBuf], path: &Path) -> Option<String> {
    roots
        .iter()
        .find_map(|root| sources::relative_path(root, path))
        .filter(|rel| !rel.is_empty())
}

/// Watch `source_root` until `running` is cleared, calling `on_batch` with
/// each debounced batch of changed source-relative paths.
pub fn watch<F>(
    source_root: &Path,
    debounce: Duration,
    running: Arc<AtomicBool>,
    mut on_batch: F,
) -> Result<(), WatchError>
where
    F: FnMut(Vec<String>),
{
    let (tx, rx) = channel();
    let mut watcher = RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| match res {
            Ok(event) if !event.kind.is_access() => {
                for path in event.paths {
                    tx.send(path).ok();
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "file watcher reported an error"),
        },
        Config::default(),
    )
    .map_err(|e| WatchError::Notify(e.to_string()))?;

    watcher
        .watch(source_root, RecursiveMode::Recursive)
        .map_err(|e| WatchError::Notify(e.to_string()))?;

    let roots = vec![source_root.to_path_buf(), source_root.canonicalize()?];
    let mut state = WatcherState::new(debounce);

    while running.load(Ordering::SeqCst) {
        if let Ok(path) = rx.recv_timeout(POLL_INTERVAL) {
            match relative_to(&roots, &path) {
                Some(rel) => state.add_change(rel),
                None => tracing::trace!(path = %path.display(), "ignoring event outside source root"),
            }
        }
        if state.should_flush() {
            on_batch(state.take_changes());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn scss_change_rebuilds_styles_with_css_reload() {
        let plan = WatchPlan::from_config(&PipelineConfig::default()).unwrap();
        let rebuild = plan.plan(&paths(&["sass/blocks/_header.scss"]));
        assert_eq!(rebuild.tasks, vec![Task::Styles]);
        assert_eq!(rebuild.reload, Some(ReloadKind::Css));
    }

    #[test]
    fn html_and_js_trigger_full_reload() {
        let plan = WatchPlan::from_config(&PipelineConfig::default()).unwrap();
        assert_eq!(
            plan.plan(&paths(&["index.html"])),
            Rebuild {
                tasks: vec![Task::Html],
                reload: Some(ReloadKind::Full)
            }
        );
        assert_eq!(
            plan.plan(&paths(&["js/menu.js"])).reload,
            Some(ReloadKind::Full)
        );
    }

    #[test]
    fn mixed_batch_runs_tasks_once_in_build_order() {
        let plan = WatchPlan::from_config(&PipelineConfig::default()).unwrap();
        let rebuild = plan.plan(&paths(&[
            "js/slider.js",
            "sass/style.scss",
            "catalog.html",
            "index.html",
        ]));
        assert_eq!(rebuild.tasks, vec![Task::Html, Task::Styles, Task::Js]);
        assert_eq!(rebuild.reload, Some(ReloadKind::Full));
    }

    #[test]
    fn unrelated_files_are_ignored() {
        let plan = WatchPlan::from_config(&PipelineConfig::default()).unwrap();
        let rebuild = plan.plan(&paths(&["img/hero.jpg", "partials/nav.html", "notes.txt"]));
        assert!(rebuild.is_empty());
        assert_eq!(rebuild.reload, None);
    }

    #[test]
    fn invalid_watch_glob_is_error() {
        let mut config = PipelineConfig::default();
        config.styles.watch = vec!["sass/[".to_string()];
        assert!(matches!(
            WatchPlan::from_config(&config),
            Err(WatchError::Sources(_))
        ));
    }

    #[test]
    fn reload_event_names() {
        assert_eq!(ReloadKind::Css.event_name(), "css");
        assert_eq!(ReloadKind::Full.event_name(), "reload");
    }

    #[test]
    fn watcher_state_debounces() {
        let mut state = WatcherState::new(Duration::from_millis(100));
        assert!(!state.should_flush());

        let t0 = Instant::now();
        state.add_change_at("a.scss".to_string(), t0);
        state.add_change_at("a.scss".to_string(), t0);
        state.add_change_at("b.html".to_string(), t0);
        assert!(!state.should_flush_at(t0 + Duration::from_millis(50)));
        assert!(state.should_flush_at(t0 + Duration::from_millis(100)));

        assert_eq!(state.take_changes(), vec!["a.scss", "b.html"]);
        assert!(!state.should_flush_at(t0 + Duration::from_secs(10)));
    }

    #[test]
    fn relative_to_tries_each_root() {
        let roots = vec![PathBuf::from("/project/source"), PathBuf::from("/real/source")];
        assert_eq!(
            relative_to(&roots, Path::new("/real/source/sass/a.scss")),
            Some("sass/a.scss".to_string())
        );
        assert_eq!(relative_to(&roots, Path::new("/project/source")), None);
        assert_eq!(relative_to(&roots, Path::new("/elsewhere/a.scss")), None);
    }
}
