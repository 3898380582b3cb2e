//! Glob resolution for task inputs.
//!
//! Every task names its inputs as glob patterns relative to the source root.
//! A matched file keeps a *relative path* that decides where its output lands
//! in the build tree:
//!
//! - with an explicit `base`, the path is relative to that directory
//!   (`base = ""` keeps the full path from the source root);
//! - without one, it is relative to the *glob parent* of the pattern that
//!   matched, i.e. the literal directories before the first wildcard.
//!
//! ```text
//! pattern                base    source file               relative
//! img/**/*.png           -       img/icons/cart.png        icons/cart.png
//! fonts/**/*.woff*       ""      fonts/sans.woff2          fonts/sans.woff2
//! ```
//!
//! A file matched by several patterns is listed once (first matching pattern
//! wins) and results are sorted by source path so every run sees the same
//! order. Two *different* files may still share a relative path; tasks that
//! write one output per input reject that as a collision.

use globset::{Glob, GlobBuilder, GlobMatcher, GlobSet, GlobSetBuilder};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum SourcesError {
    #[error("invalid glob pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
    #[error("IO error while scanning {path}: {message}")]
    Walk { path: PathBuf, message: String },
}

/// A set of glob patterns plus an optional base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSet {
    pub patterns: Vec<String>,
    pub base: Option<String>,
}

impl SourceSet {
    pub fn new(patterns: &[String], base: Option<&str>) -> Self {
        Self {
            patterns: patterns.to_vec(),
            base: base.map(str::to_string),
        }
    }
}

/// A file selected by a [`SourceSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Absolute (or root-joined) path on disk.
    pub path: PathBuf,
    /// Forward-slash path relative to the source root.
    pub source_relative: String,
    /// Forward-slash path used to place the output.
    pub relative: String,
}

/// Literal directory prefix of a glob pattern.
///
/// ```text
/// img/**/*.png      → img
/// fonts/*.woff*     → fonts
/// *.html            → ""
/// sass/style.scss   → sass
/// ```
pub fn glob_parent(pattern: &str) -> String {
    let components: Vec<&str> = pattern.split('/').collect();
    let mut literal = Vec::new();
    // The last component is always the file part, even without wildcards.
    for component in &components[..components.len().saturating_sub(1)] {
        if has_glob_meta(component) {
            break;
        }
        literal.push(*component);
    }
    literal.join("/")
}

fn has_glob_meta(component: &str) -> bool {
    component.contains(['*', '?', '[', '{'])
}

fn glob(pattern: &str) -> Result<Glob, SourcesError> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|e| SourcesError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })
}

fn compile(pattern: &str) -> Result<GlobMatcher, SourcesError> {
    glob(pattern).map(|g| g.compile_matcher())
}

/// Forward-slash relative path of `path` under `root`.
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

fn strip_dir_prefix<'a>(path: &'a str, dir: &str) -> &'a str {
    if dir.is_empty() {
        return path;
    }
    path.strip_prefix(dir)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(path)
}

/// Resolve a source set against the source root.
///
/// Missing directories match nothing; only files are returned.
pub fn resolve(source_root: &Path, set: &SourceSet) -> Result<Vec<SourceFile>, SourcesError> {
    let mut found: BTreeMap<String, SourceFile> = BTreeMap::new();

    for pattern in &set.patterns {
        let matcher = compile(pattern)?;
        let parent = glob_parent(pattern);
        let walk_root = if parent.is_empty() {
            source_root.to_path_buf()
        } else {
            source_root.join(&parent)
        };
        if !walk_root.is_dir() {
            tracing::debug!(pattern = %pattern, dir = %walk_root.display(), "glob parent missing");
            continue;
        }

        for entry in WalkDir::new(&walk_root).sort_by_file_name() {
            let entry = entry.map_err(|e| SourcesError::Walk {
                path: walk_root.clone(),
                message: e.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(source_relative) = relative_path(source_root, entry.path()) else {
                continue;
            };
            if !matcher.is_match(&source_relative) {
                continue;
            }
            let base = set.base.as_deref().unwrap_or(&parent);
            let relative = strip_dir_prefix(&source_relative, base).to_string();
            found
                .entry(source_relative.clone())
                .or_insert_with(|| SourceFile {
                    path: entry.path().to_path_buf(),
                    source_relative,
                    relative,
                });
        }
    }

    Ok(found.into_values().collect())
}

/// Compile `patterns` into one set, with the same rules as [`resolve`].
pub fn glob_set(patterns: &[String]) -> Result<GlobSet, SourcesError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(glob(pattern)?);
    }
    builder.build().map_err(|e| SourcesError::InvalidPattern {
        pattern: patterns.join(", "),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, rel).unwrap();
    }

    fn relatives(files: &[SourceFile]) -> Vec<&str> {
        files.iter().map(|f| f.relative.as_str()).collect()
    }

    #[test]
    fn glob_parent_examples() {
        assert_eq!(glob_parent("img/**/*.png"), "img");
        assert_eq!(glob_parent("fonts/*.woff*"), "fonts");
        assert_eq!(glob_parent("*.html"), "");
        assert_eq!(glob_parent("sass/style.scss"), "sass");
        assert_eq!(glob_parent("a/b/{c,d}/*.js"), "a/b");
    }

    #[test]
    fn star_does_not_cross_directories() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "index.html");
        touch(tmp.path(), "partials/nav.html");

        let set = SourceSet::new(&["*.html".to_string()], Some(""));
        let files = resolve(tmp.path(), &set).unwrap();
        assert_eq!(relatives(&files), vec!["index.html"]);
    }

    #[test]
    fn relative_to_glob_parent_without_base() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "img/hero.jpg");
        touch(tmp.path(), "img/icons/cart.png");
        touch(tmp.path(), "img/readme.txt");

        let set = SourceSet::new(&["img/**/*.{jpg,png}".to_string()], None);
        let files = resolve(tmp.path(), &set).unwrap();
        assert_eq!(relatives(&files), vec!["hero.jpg", "icons/cart.png"]);
        assert_eq!(files[1].source_relative, "img/icons/cart.png");
    }

    #[test]
    fn relative_to_explicit_base() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "fonts/sans.woff2");
        touch(tmp.path(), "fonts/sans.woff");
        touch(tmp.path(), "fonts/sans.ttf");
        touch(tmp.path(), "favicon.ico");

        let set = SourceSet::new(
            &["fonts/**/*.woff*".to_string(), "*.ico".to_string()],
            Some(""),
        );
        let files = resolve(tmp.path(), &set).unwrap();
        assert_eq!(
            relatives(&files),
            vec!["favicon.ico", "fonts/sans.woff", "fonts/sans.woff2"]
        );
    }

    #[test]
    fn overlapping_patterns_are_deduplicated() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "img/icon-cart.svg");

        let set = SourceSet::new(
            &["img/**/icon-*.svg".to_string(), "img/**/*.svg".to_string()],
            None,
        );
        let files = resolve(tmp.path(), &set).unwrap();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn same_name_under_different_patterns_keeps_both() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "vendor/util.js");
        touch(tmp.path(), "js/util.js");

        let set = SourceSet::new(&["vendor/*.js".to_string(), "js/*.js".to_string()], None);
        let files = resolve(tmp.path(), &set).unwrap();
        let sources: Vec<&str> = files.iter().map(|f| f.source_relative.as_str()).collect();
        assert_eq!(sources, vec!["js/util.js", "vendor/util.js"]);
        assert_eq!(relatives(&files), vec!["util.js", "util.js"]);
    }

    #[test]
    fn sorted_by_source_path_not_output_path() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "js/b.js");
        touch(tmp.path(), "vendor/a.js");

        let set = SourceSet::new(&["js/*.js".to_string(), "vendor/*.js".to_string()], None);
        let files = resolve(tmp.path(), &set).unwrap();
        assert_eq!(relatives(&files), vec!["b.js", "a.js"]);
    }

    #[test]
    fn missing_directory_matches_nothing() {
        let tmp = TempDir::new().unwrap();
        let set = SourceSet::new(&["js/*.js".to_string()], None);
        assert!(resolve(tmp.path(), &set).unwrap().is_empty());
    }

    #[test]
    fn invalid_pattern_is_error() {
        let tmp = TempDir::new().unwrap();
        let set = SourceSet::new(&["img/[".to_string()], None);
        let err = resolve(tmp.path(), &set).unwrap_err();
        assert!(matches!(err, SourcesError::InvalidPattern { .. }));
    }

    #[test]
    fn glob_set_checks_all_patterns() {
        let patterns = vec!["sass/**/*.scss".to_string(), "*.html".to_string()];
        let set = glob_set(&patterns).unwrap();
        assert!(set.is_match("sass/blocks/_header.scss"));
        assert!(set.is_match("index.html"));
        assert!(!set.is_match("partials/nav.html"));
        assert!(!set.is_match("js/app.js"));
    }
}
