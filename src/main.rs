use assetpipe::config::{self, Paths, PipelineConfig};
use assetpipe::imaging::RustBackend;
use assetpipe::pipeline::{self, Pipeline, PipelineEvent};
use assetpipe::tasks::{self, Task, TaskContext};
use assetpipe::{dev, output};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "assetpipe")]
#[command(about = "Asset build pipeline and live-reload dev server for static sites")]
#[command(long_about = "\
Asset build pipeline and live-reload dev server for static sites

Reads source/, writes build/. With no command, runs a full build, serves
build/ with live reload and rebuilds on every change.

Project layout (defaults, all configurable in assets.toml):

  assets.toml
  source/
  ├── *.html                 → minified into build/
  ├── favicon.ico, fonts/    → copied as-is
  ├── sass/style.scss        → build/css/styles.min.css (+ source map)
  ├── js/*.js                → build/js/app.min.js
  └── img/
      ├── **/*.{jpg,png}     → recompressed, plus a .webp sibling
      ├── **/*.svg           → cleaned
      └── **/icon-*.svg,
          **/logo-*.svg      → build/img/sprite.svg

Encoded images are cached in .assets-cache/, so unchanged images are never
re-encoded.

Run 'assetpipe gen-config' to generate a documented assets.toml.")]
#[command(version)]
struct Cli {
    /// Config file; its directory is the project root
    #[arg(long, default_value = config::CONFIG_FILENAME, global = true)]
    config: PathBuf,

    /// Source directory (overrides `source_dir`)
    #[arg(long, global = true)]
    source: Option<PathBuf>,

    /// Build directory (overrides `build_dir`)
    #[arg(long, global = true)]
    build: Option<PathBuf>,

    /// Encode cache directory (overrides `cache_dir`)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Ignore cached encodes; every image is encoded again
    #[arg(long, global = true)]
    no_cache: bool,

    /// More diagnostics on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Build, then serve with live reload and rebuild on change (default)
    Dev,
    /// Run every task: clean → copy → html → styles → js → images → webp → sprite
    Build,
    /// Serve the existing build directory with live reload
    Serve,
    /// Remove the build directory
    Clean,
    /// Copy fonts and other static files
    Copy,
    /// Minify HTML pages
    Html,
    /// Compile Sass, prefix and minify CSS
    Styles,
    /// Bundle and minify JavaScript
    Js,
    /// Recompress JPEG/PNG and clean SVG images
    Images,
    /// Create WebP versions of raster images
    Webp,
    /// Assemble the SVG sprite
    Sprite,
    /// List the source files each task would read, without building
    Check,
    /// Print a stock assets.toml with all options documented
    GenConfig,
}

impl Command {
    fn task(self) -> Option<Task> {
        match self {
            Command::Clean => Some(Task::Clean),
            Command::Copy => Some(Task::Copy),
            Command::Html => Some(Task::Html),
            Command::Styles => Some(Task::Styles),
            Command::Js => Some(Task::Js),
            Command::Images => Some(Task::Images),
            Command::Webp => Some(Task::Webp),
            Command::Sprite => Some(Task::Sprite),
            _ => None,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let command = cli.command.unwrap_or(Command::Dev);
    if let Command::GenConfig = command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let config = load_config(&cli)?;
    let root = project_root(&cli.config);
    let paths = config.paths(&root);
    tracing::debug!(
        source = %paths.source.display(),
        build = %paths.build.display(),
        cache = %paths.cache.display(),
        "resolved paths"
    );

    if let Command::Check = command {
        println!("==> Checking {}", paths.source.display());
        let ctx = TaskContext {
            config: &config,
            paths: &paths,
        };
        let inputs = Task::BUILD_ORDER
            .into_iter()
            .filter(|&task| task != Task::Clean)
            .map(|task| tasks::inputs(task, &ctx).map(|files| (task, files)))
            .collect::<Result<Vec<_>, _>>()?;
        output::print_check_output(&inputs);
        println!("==> Sources are valid");
        return Ok(());
    }

    pipeline::init_thread_pool(&config.processing);
    match command {
        Command::Build => build(config, paths, cli.no_cache)?,
        Command::Dev => {
            build(config.clone(), paths.clone(), cli.no_cache)?;
            let (pipeline, printer) = start_pipeline(config, paths, cli.no_cache);
            dev::run(Arc::new(pipeline), true)?;
            join_printer(printer)?;
        }
        Command::Serve => {
            let (pipeline, printer) = start_pipeline(config, paths, cli.no_cache);
            dev::run(Arc::new(pipeline), false)?;
            join_printer(printer)?;
        }
        other => {
            if let Some(task) = other.task() {
                let (pipeline, printer) = start_pipeline(config, paths, cli.no_cache);
                let result = pipeline.run_task(task);
                drop(pipeline);
                join_printer(printer)?;
                result?;
            }
        }
    }

    Ok(())
}

/// Full build; the summary is printed after every task line.
fn build(
    config: PipelineConfig,
    paths: Paths,
    no_cache: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let build_dir = paths.build.clone();
    let (pipeline, printer) = start_pipeline(config, paths, no_cache);
    let result = pipeline.build();
    drop(pipeline);
    join_printer(printer)?;
    let reports = result?;
    println!("{}", output::format_build_summary(&reports, &build_dir));
    Ok(())
}

/// A pipeline whose events are printed on a separate thread. The thread
/// ends once the pipeline is dropped.
fn start_pipeline(
    config: PipelineConfig,
    paths: Paths,
    no_cache: bool,
) -> (Pipeline<RustBackend>, JoinHandle<()>) {
    let (tx, rx) = std::sync::mpsc::channel::<PipelineEvent>();
    let printer = std::thread::spawn(move || {
        for event in rx {
            output::print_pipeline_event(&event);
        }
    });
    let pipeline = Pipeline::new(config, paths, RustBackend::new())
        .with_cache(!no_cache)
        .with_events(tx);
    (pipeline, printer)
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Directory holding the config file; relative config paths resolve to `.`.
fn project_root(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Load the config file and apply command-line directory overrides.
fn load_config(cli: &Cli) -> Result<PipelineConfig, config::ConfigError> {
    let mut config = config::load_config(&cli.config)?;
    if let Some(source) = &cli.source {
        config.source_dir = source.to_string_lossy().into_owned();
    }
    if let Some(build) = &cli.build {
        config.build_dir = build.to_string_lossy().into_owned();
    }
    if let Some(cache_dir) = &cli.cache_dir {
        config.cache_dir = cache_dir.to_string_lossy().into_owned();
    }
    config.validate()?;
    Ok(config)
}

fn join_printer(printer: JoinHandle<()>) -> Result<(), Box<dyn std::error::Error>> {
    printer.join().map_err(|_| "output thread panicked")?;
    Ok(())
}
