//! The build tasks.
//!
//! Each task selects its inputs with a [`SourceSet`](crate::sources::SourceSet),
//! transforms them, writes into the build tree and returns a [`TaskReport`]
//! listing every file it wrote.
//!
//! | Task | Module | Output |
//! |------|--------|--------|
//! | `clean` | [`clean`] | removes the build directory |
//! | `copy` | [`copy`] | fonts, favicon, … byte for byte |
//! | `html` | [`html`] | whitespace-collapsed HTML |
//! | `styles` | [`styles`] | `css/styles.min.css` + source map |
//! | `js` | [`js`] | `js/app.min.js` |
//! | `images` | [`images`] | recompressed JPEG/PNG, cleaned SVG |
//! | `webp` | [`webp`] | `.webp` sibling per raster image |
//! | `sprite` | [`sprite`] | `img/sprite.svg` |
//!
//! Tasks never read each other's output, so any one of them can run on its
//! own; [`Task::BUILD_ORDER`] is the order a full build uses.

pub mod clean;
pub mod copy;
pub mod html;
pub mod images;
pub mod js;
pub mod sprite;
pub mod styles;
pub mod webp;

use crate::cache::CacheStats;
use crate::config::{Paths, PipelineConfig};
use crate::imaging::BackendError;
use crate::sources::{self, SourceFile, SourceSet, SourcesError};
use crate::svg::SvgError;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Sources(#[from] SourcesError),
    #[error("Image processing failed for {path}: {source}")]
    Imaging {
        path: String,
        #[source]
        source: BackendError,
    },
    #[error("SVG error in {path}: {source}")]
    Svg {
        path: String,
        #[source]
        source: SvgError,
    },
    #[error("Sass compilation failed: {0}")]
    Sass(String),
    #[error("CSS processing failed: {0}")]
    Css(String),
    #[error("Styles entry not found: {0}")]
    MissingEntry(PathBuf),
    #[error("{first} and {second} would both be written to {output}")]
    OutputCollision {
        output: String,
        first: String,
        second: String,
    },
    #[error("Refusing to clean {build}: it contains the source directory {source_dir}")]
    UnsafeClean { build: PathBuf, source_dir: PathBuf },
}

/// A named, independently runnable unit of the build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {
    Clean,
    Copy,
    Html,
    Styles,
    Js,
    Images,
    Webp,
    Sprite,
}

impl Task {
    /// Order of a full build.
    pub const BUILD_ORDER: [Task; 8] = [
        Task::Clean,
        Task::Copy,
        Task::Html,
        Task::Styles,
        Task::Js,
        Task::Images,
        Task::Webp,
        Task::Sprite,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Task::Clean => "clean",
            Task::Copy => "copy",
            Task::Html => "html",
            Task::Styles => "styles",
            Task::Js => "js",
            Task::Images => "images",
            Task::Webp => "webp",
            Task::Sprite => "sprite",
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Task {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Task::BUILD_ORDER
            .into_iter()
            .find(|task| task.name() == s)
            .ok_or_else(|| format!("unknown task '{s}'"))
    }
}

/// How an output file came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStatus {
    /// Produced by a text transformation.
    Written,
    /// Source bytes passed through.
    Copied,
    /// Produced by an image encoder.
    Encoded,
    /// Restored from the encode cache.
    Cached,
    /// Restored from a cache object stored under another path.
    Relocated,
    /// The encoder did not beat the source; source bytes written.
    Kept,
}

impl OutputStatus {
    pub fn label(self) -> &'static str {
        match self {
            OutputStatus::Written => "written",
            OutputStatus::Copied => "copied",
            OutputStatus::Encoded => "encoded",
            OutputStatus::Cached => "cached",
            OutputStatus::Relocated => "relocated",
            OutputStatus::Kept => "kept",
        }
    }
}

/// One file written into the build tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRecord {
    /// Inputs, relative to the source root.
    pub sources: Vec<String>,
    /// Output, relative to the build root.
    pub output: String,
    pub size: u64,
    pub status: OutputStatus,
    /// Source size, for optimised images.
    pub original_size: Option<u64>,
}

/// Everything one task run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub task: Task,
    pub outputs: Vec<OutputRecord>,
    /// Encode cache performance (`images` and `webp` only).
    pub cache: Option<CacheStats>,
}

impl TaskReport {
    pub fn new(task: Task) -> Self {
        Self {
            task,
            outputs: Vec::new(),
            cache: None,
        }
    }
}

/// What every task needs to know about the project.
pub struct TaskContext<'a> {
    pub config: &'a PipelineConfig,
    pub paths: &'a Paths,
}

/// Source files a task would read, without running it.
///
/// `clean` has none; `styles` lists its entry file and fails when it is
/// missing, like the task itself.
pub fn inputs(task: Task, ctx: &TaskContext) -> Result<Vec<SourceFile>, TaskError> {
    let config = ctx.config;
    let set = match task {
        Task::Clean => return Ok(Vec::new()),
        Task::Styles => {
            let entry = ctx.paths.source.join(&config.styles.entry);
            if !entry.is_file() {
                return Err(TaskError::MissingEntry(entry));
            }
            return Ok(vec![SourceFile {
                path: entry,
                source_relative: config.styles.entry.clone(),
                relative: config.styles.entry.clone(),
            }]);
        }
        Task::Copy => SourceSet::new(&config.copy.patterns, config.copy.base.dir()),
        Task::Html => SourceSet::new(&config.html.patterns, config.html.base.dir()),
        Task::Js => SourceSet::new(&config.js.patterns, None),
        Task::Images => SourceSet::new(&config.images.patterns, None),
        Task::Webp => SourceSet::new(&config.webp.patterns, None),
        Task::Sprite => SourceSet::new(&config.sprite.patterns, None),
    };
    Ok(sources::resolve(&ctx.paths.source, &set)?)
}

/// Pair every file with its build-relative output, rejecting two sources
/// that would write the same file. Runs before any output is written.
pub(crate) fn plan_outputs(
    files: &[SourceFile],
    output_for: impl Fn(&SourceFile) -> String,
) -> Result<Vec<String>, TaskError> {
    let mut claimed: BTreeMap<String, &str> = BTreeMap::new();
    let mut outputs = Vec::with_capacity(files.len());
    for file in files {
        let output = output_for(file);
        if let Some(first) = claimed.insert(output.clone(), &file.source_relative) {
            return Err(TaskError::OutputCollision {
                output,
                first: first.to_string(),
                second: file.source_relative.clone(),
            });
        }
        outputs.push(output);
    }
    Ok(outputs)
}

/// Join a build-relative directory and a relative file path.
pub(crate) fn build_relative(dir: &str, relative: &str) -> String {
    let dir = dir.trim_matches('/');
    if dir.is_empty() {
        relative.to_string()
    } else {
        format!("{dir}/{relative}")
    }
}

/// Write `bytes` to `build_root/relative`, creating parent directories.
pub(crate) fn write_output(build_root: &Path, relative: &str, bytes: &[u8]) -> std::io::Result<()> {
    let path = build_root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)
}
