//! # assetpipe
//!
//! An asset build pipeline for static sites. A `source/` tree of HTML, Sass,
//! JavaScript, fonts and images is turned into a deployable `build/` tree,
//! and a development server rebuilds and live-reloads the browser while you
//! edit.
//!
//! # Architecture: Independent Tasks
//!
//! The build is a fixed series of tasks. Each one selects its inputs from
//! `source/` with globs, transforms them and writes into `build/`. No task
//! reads another task's output, so every task can also be run on its own.
//!
//! ```text
//! clean → copy → html → styles → js → images → webp → sprite
//!
//! source/sass/style.scss ──styles──► build/css/styles.min.css (+ .map)
//! source/js/*.js         ──js──────► build/js/app.min.js
//! source/img/**/*.jpg    ──images──► build/img/**/*.jpg
//!                        ──webp────► build/img/**/*.webp
//! source/img/**/icon-*.svg ─sprite─► build/img/sprite.svg
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | `assets.toml` loading, merging onto stock defaults, validation |
//! | [`sources`] | Glob patterns → sorted, de-duplicated source files with output-relative paths |
//! | [`tasks`] | One module per task; `TaskReport` describes what each wrote |
//! | [`pipeline`] | Runs tasks in order and emits progress events |
//! | [`imaging`] | `ImageBackend` trait and the pure-Rust JPEG/PNG/WebP implementation |
//! | [`svg`] | SVG clean-up and sprite assembly on a `quick-xml` event stream |
//! | [`cache`] | Content-addressed cache of encoded images |
//! | [`watch`] | Debounced file watching and change → task mapping |
//! | [`server`] | axum static server with Server-Sent-Events live reload |
//! | [`dev`] | Ties the server, the watcher and the pipeline together |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Delegate Every Transformation
//!
//! Sass is compiled by `grass`, CSS is prefixed and minified by
//! `lightningcss`, images go through `image`, `oxipng` and `webp`. This crate
//! only decides which files go where, in what order, and whether the work
//! can be skipped.
//!
//! ## Encode Cache
//!
//! Image encoding dominates build time. Encoded outputs are stored under
//! `.assets-cache/` keyed by the SHA-256 of the source bytes and of the
//! encoder parameters, so a clean build re-encodes nothing that has not
//! changed, and a renamed image is restored from its old cache entry.
//!
//! ## Live Reload Without a Browser Extension
//!
//! The dev server injects a small script into every HTML page it serves.
//! The script listens on `/__livereload`; stylesheet changes swap the CSS
//! in place, everything else reloads the page.

pub mod cache;
pub mod config;
pub mod dev;
pub mod imaging;
pub mod output;
pub mod pipeline;
pub mod server;
pub mod sources;
pub mod svg;
pub mod tasks;
pub mod watch;

#[cfg(test)]
pub(crate) mod test_helpers;
