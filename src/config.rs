//! Pipeline configuration module.
//!
//! Handles loading, validating, and merging `assets.toml`. The stock defaults
//! reproduce the classic `source/` → `build/` layout; a project file only
//! needs the keys it wants to change.
//!
//! ## Config File Location
//!
//! `assets.toml` lives in the project root, next to the `source/` tree:
//!
//! ```text
//! project/
//! ├── assets.toml          # optional, overrides stock defaults
//! ├── source/
//! │   ├── index.html
//! │   ├── sass/style.scss
//! │   ├── js/*.js
//! │   ├── img/**
//! │   └── fonts/**
//! └── build/               # fully regenerated by `assetpipe build`
//! ```
//!
//! ## Partial Configuration
//!
//! ```toml
//! # Only change the dev server port and WebP quality
//! [server]
//! port = 8080
//!
//! [webp]
//! quality = 80
//! ```
//!
//! Tables are merged key-by-key; arrays and scalars replace the default.
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default config file name, resolved against the working directory.
pub const CONFIG_FILENAME: &str = "assets.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Pipeline configuration loaded from `assets.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Directory holding the untransformed assets.
    pub source_dir: String,
    /// Output directory. Deleted and regenerated by a full build.
    pub build_dir: String,
    /// Where encoded images are kept between builds.
    pub cache_dir: String,
    pub styles: StylesConfig,
    pub images: ImagesConfig,
    pub webp: WebpConfig,
    pub sprite: SpriteConfig,
    pub copy: CopyConfig,
    pub html: HtmlConfig,
    pub js: JsConfig,
    pub server: ServerConfig,
    pub watch: WatchConfig,
    pub processing: ProcessingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_dir: "source".to_string(),
            build_dir: "build".to_string(),
            cache_dir: ".assets-cache".to_string(),
            styles: StylesConfig::default(),
            images: ImagesConfig::default(),
            webp: WebpConfig::default(),
            sprite: SpriteConfig::default(),
            copy: CopyConfig::default(),
            html: HtmlConfig::default(),
            js: JsConfig::default(),
            server: ServerConfig::default(),
            watch: WatchConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_quality("images.jpeg_quality", self.images.jpeg_quality)?;
        check_quality("webp.quality", self.webp.quality)?;
        if self.images.png_level > 6 {
            return Err(ConfigError::Validation(
                "images.png_level must be 0-6".into(),
            ));
        }
        for (key, patterns) in [
            ("images.patterns", &self.images.patterns),
            ("webp.patterns", &self.webp.patterns),
            ("sprite.patterns", &self.sprite.patterns),
            ("copy.patterns", &self.copy.patterns),
            ("html.patterns", &self.html.patterns),
            ("js.patterns", &self.js.patterns),
        ] {
            if patterns.is_empty() {
                return Err(ConfigError::Validation(format!("{key} must not be empty")));
            }
        }
        for (key, base) in [("copy.base", &self.copy.base), ("html.base", &self.html.base)] {
            if *base == OutputBase::GlobParent(true) {
                return Err(ConfigError::Validation(format!(
                    "{key} must be a directory or false"
                )));
            }
        }
        for (key, value) in [
            ("source_dir", &self.source_dir),
            ("build_dir", &self.build_dir),
            ("styles.entry", &self.styles.entry),
            ("styles.output", &self.styles.output),
            ("sprite.output", &self.sprite.output),
            ("js.output", &self.js.output),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Validation(format!("{key} must not be empty")));
            }
        }
        if normalize(&self.source_dir) == normalize(&self.build_dir) {
            return Err(ConfigError::Validation(
                "build_dir must differ from source_dir".into(),
            ));
        }
        if self.server.port_attempts == 0 {
            return Err(ConfigError::Validation(
                "server.port_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Resolve the source, build and cache directories against `root`.
    pub fn paths(&self, root: &Path) -> Paths {
        Paths {
            source: root.join(&self.source_dir),
            build: root.join(&self.build_dir),
            cache: root.join(&self.cache_dir),
        }
    }
}

fn check_quality(key: &str, value: u32) -> Result<(), ConfigError> {
    if value == 0 || value > 100 {
        return Err(ConfigError::Validation(format!("{key} must be 1-100")));
    }
    Ok(())
}

fn normalize(dir: &str) -> String {
    dir.trim_start_matches("./").trim_end_matches('/').to_string()
}

/// Absolute locations of the three directories the pipeline touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub source: PathBuf,
    pub build: PathBuf,
    pub cache: PathBuf,
}

/// Sass compilation and CSS post-processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StylesConfig {
    /// Sass entry point, relative to the source root.
    pub entry: String,
    /// Minified stylesheet path, relative to the build root.
    pub output: String,
    /// Write `<output>.map` and reference it from the stylesheet.
    pub sourcemap: bool,
    /// Browserslist queries driving vendor prefixes.
    pub browsers: Vec<String>,
    /// Files whose change triggers a rebuild of the stylesheet.
    pub watch: Vec<String>,
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self {
            entry: "sass/style.scss".to_string(),
            output: "css/styles.min.css".to_string(),
            sourcemap: true,
            browsers: vec!["defaults".to_string()],
            watch: vec!["sass/**/*.scss".to_string()],
        }
    }
}

/// Lossy/lossless recompression of raster and vector images.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    pub patterns: Vec<String>,
    /// Output directory, relative to the build root.
    pub dest: String,
    /// JPEG re-encode quality (1-100).
    pub jpeg_quality: u32,
    /// PNG optimisation preset (0 = fast, 6 = exhaustive).
    pub png_level: u8,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            patterns: vec!["img/**/*.{jpg,png,svg}".to_string()],
            dest: "img".to_string(),
            jpeg_quality: 85,
            png_level: 3,
        }
    }
}

/// WebP siblings for raster images.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WebpConfig {
    pub patterns: Vec<String>,
    pub dest: String,
    /// Lossy WebP quality (1-100).
    pub quality: u32,
}

impl Default for WebpConfig {
    fn default() -> Self {
        Self {
            patterns: vec!["img/**/*.{png,jpg}".to_string()],
            dest: "img".to_string(),
            quality: 75,
        }
    }
}

/// SVG sprite assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpriteConfig {
    pub patterns: Vec<String>,
    /// Sprite path, relative to the build root.
    pub output: String,
}

impl Default for SpriteConfig {
    fn default() -> Self {
        Self {
            patterns: vec![
                "img/**/icon-*.svg".to_string(),
                "img/**/logo-*.svg".to_string(),
                "img/**/htmlacademy.svg".to_string(),
            ],
            output: "img/sprite.svg".to_string(),
        }
    }
}

/// What output paths of `copy` and `html` are relative to.
///
/// ```toml
/// base = ""        # the source root (default)
/// base = "pages"   # a directory under the source root
/// base = false     # each pattern's glob parent
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputBase {
    Dir(String),
    /// Only `false` is accepted; see [`PipelineConfig::validate`].
    GlobParent(bool),
}

impl OutputBase {
    /// The explicit directory, or `None` for glob-parent mode.
    pub fn dir(&self) -> Option<&str> {
        match self {
            OutputBase::Dir(dir) => Some(dir),
            OutputBase::GlobParent(_) => None,
        }
    }
}

impl Default for OutputBase {
    fn default() -> Self {
        OutputBase::Dir(String::new())
    }
}

/// Passthrough copy of fonts, favicons and the like.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CopyConfig {
    pub patterns: Vec<String>,
    pub base: OutputBase,
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            patterns: vec!["fonts/**/*.woff*".to_string(), "*.ico".to_string()],
            base: OutputBase::default(),
        }
    }
}

/// HTML minification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HtmlConfig {
    pub patterns: Vec<String>,
    pub base: OutputBase,
    /// Keep `<!-- -->` comments; only whitespace is collapsed.
    pub keep_comments: bool,
}

impl Default for HtmlConfig {
    fn default() -> Self {
        Self {
            patterns: vec!["*.html".to_string()],
            base: OutputBase::default(),
            keep_comments: true,
        }
    }
}

/// JavaScript concatenation and minification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JsConfig {
    pub patterns: Vec<String>,
    /// Bundle path, relative to the build root.
    pub output: String,
}

impl Default for JsConfig {
    fn default() -> Self {
        Self {
            patterns: vec!["js/*.js".to_string()],
            output: "js/app.min.js".to_string(),
        }
    }
}

/// Development server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Send permissive CORS headers.
    pub cors: bool,
    /// How many consecutive ports to try when `port` is taken.
    pub port_attempts: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            cors: true,
            port_attempts: 10,
        }
    }
}

/// File watcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchConfig {
    /// Quiet period before a batch of changes is acted upon.
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 100 }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel image encoding workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(PipelineConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// Tables merge key-by-key; any other overlay value replaces the base value.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value. `Ok(None)` when it does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto the stock defaults, then deserialize and validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<PipelineConfig, ConfigError> {
    let base = stock_defaults_value();
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: PipelineConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the config file at `path`, falling back to stock defaults when absent.
pub fn load_config(path: &Path) -> Result<PipelineConfig, ConfigError> {
    resolve_config(load_raw_config(path)?)
}

/// Returns a fully-commented stock `assets.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# assetpipe configuration
# ======================
# All settings are optional. Values shown below are the defaults.
# Tables are merged with the defaults key-by-key; lists replace them.
# Unknown keys cause an error.

# Untransformed assets.
source_dir = "source"
# Output directory, deleted and regenerated by `assetpipe build`.
build_dir = "build"
# Encoded images are kept here between builds (`--no-cache` ignores it).
cache_dir = ".assets-cache"

# ---------------------------------------------------------------------------
# Styles: Sass -> autoprefix -> minify
# ---------------------------------------------------------------------------
[styles]
entry = "sass/style.scss"
output = "css/styles.min.css"
sourcemap = true
# Browserslist queries used for vendor prefixes.
browsers = ["defaults"]
# Changes to these files rebuild the stylesheet in watch mode.
watch = ["sass/**/*.scss"]

# ---------------------------------------------------------------------------
# Images: JPEG re-encode, lossless PNG, SVG clean-up
# ---------------------------------------------------------------------------
[images]
patterns = ["img/**/*.{jpg,png,svg}"]
dest = "img"
jpeg_quality = 85
# 0 (fast) to 6 (exhaustive).
png_level = 3

# ---------------------------------------------------------------------------
# WebP siblings for raster images
# ---------------------------------------------------------------------------
[webp]
patterns = ["img/**/*.{png,jpg}"]
dest = "img"
quality = 75

# ---------------------------------------------------------------------------
# SVG sprite: one <symbol> per file, id = file name
# ---------------------------------------------------------------------------
[sprite]
patterns = ["img/**/icon-*.svg", "img/**/logo-*.svg", "img/**/htmlacademy.svg"]
output = "img/sprite.svg"

# ---------------------------------------------------------------------------
# Passthrough copy. `base` is the directory output paths are relative to
# ("" = source root). Set it to false to use each pattern's own directory,
# e.g. "fonts/*.woff2" then writes build/<name>.woff2.
# ---------------------------------------------------------------------------
[copy]
patterns = ["fonts/**/*.woff*", "*.ico"]
base = ""

# ---------------------------------------------------------------------------
# HTML whitespace collapse. `base` works as in [copy].
# ---------------------------------------------------------------------------
[html]
patterns = ["*.html"]
base = ""
keep_comments = true

# ---------------------------------------------------------------------------
# JavaScript: concatenate in path order, then minify
# ---------------------------------------------------------------------------
[js]
patterns = ["js/*.js"]
output = "js/app.min.js"

# ---------------------------------------------------------------------------
# Development server with live reload
# ---------------------------------------------------------------------------
[server]
host = "127.0.0.1"
port = 3000
cors = true
# Try port, port+1, ... when the port is taken.
port_attempts = 10

[watch]
debounce_ms = 100

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel image-encoding workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
