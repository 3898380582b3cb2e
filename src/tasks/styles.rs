//! Sass → autoprefixed, minified CSS.
//!
//! ```text
//! sass/style.scss ──grass──► CSS ──lightningcss (targets, minify)──► css/styles.min.css
//!                                                                └─► css/styles.min.css.map
//! ```
//!
//! `grass` does not emit source maps, so the map describes the compiled CSS
//! (embedded as `sourcesContent`) rather than the individual `.scss`
//! partials.

use super::{OutputRecord, OutputStatus, Task, TaskContext, TaskError, TaskReport, write_output};
use crate::config::StylesConfig;
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use parcel_sourcemap::SourceMap;
use std::path::Path;

/// Name the compiled CSS goes by inside the source map.
const COMPILED_NAME: &str = "style.css";

/// Minified stylesheet plus its optional source map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledStyles {
    pub css: String,
    pub map: Option<String>,
}

/// Compile a Sass entry file to plain CSS.
pub fn compile_sass(entry: &Path) -> Result<String, TaskError> {
    let mut options = grass::Options::default();
    if let Some(dir) = entry.parent() {
        options = options.load_path(dir);
    }
    grass::from_path(entry, &options).map_err(|e| TaskError::Sass(e.to_string()))
}

fn targets(browsers: &[String]) -> Result<Targets, TaskError> {
    let browsers = Browsers::from_browserslist(browsers.iter().map(String::as_str))
        .map_err(|e| TaskError::Css(e.to_string()))?;
    Ok(Targets {
        browsers,
        ..Targets::default()
    })
}

/// Prefix and minify plain CSS. `map_url` is the file name written into the
/// `sourceMappingURL` comment; `None` skips the source map.
pub fn postprocess(
    css: &str,
    config: &StylesConfig,
    map_url: Option<&str>,
) -> Result<CompiledStyles, TaskError> {
    let targets = targets(&config.browsers)?;

    let mut sheet = StyleSheet::parse(
        css,
        ParserOptions {
            filename: COMPILED_NAME.to_string(),
            ..ParserOptions::default()
        },
    )
    .map_err(|e| TaskError::Css(e.to_string()))?;

    sheet
        .minify(MinifyOptions {
            targets,
            ..MinifyOptions::default()
        })
        .map_err(|e| TaskError::Css(e.to_string()))?;

    let mut source_map = match map_url {
        Some(_) => {
            let mut map = SourceMap::new("/");
            map.add_source(COMPILED_NAME);
            map.set_source_content(0, css)
                .map_err(|e| TaskError::Css(e.to_string()))?;
            Some(map)
        }
        None => None,
    };

    let printed = sheet
        .to_css(PrinterOptions {
            minify: true,
            targets,
            source_map: source_map.as_mut(),
            ..PrinterOptions::default()
        })
        .map_err(|e| TaskError::Css(e.to_string()))?;

    match (map_url, source_map.as_mut()) {
        (Some(url), Some(map)) => {
            let json = map
                .to_json(None)
                .map_err(|e| TaskError::Css(e.to_string()))?;
            Ok(CompiledStyles {
                css: format!("{}\n/*# sourceMappingURL={url} */", printed.code),
                map: Some(json),
            })
        }
        _ => Ok(CompiledStyles {
            css: printed.code,
            map: None,
        }),
    }
}

pub fn run(ctx: &TaskContext) -> Result<TaskReport, TaskError> {
    let styles = &ctx.config.styles;
    let entry = ctx.paths.source.join(&styles.entry);
    if !entry.is_file() {
        return Err(TaskError::MissingEntry(entry));
    }

    let compiled = compile_sass(&entry)?;
    let map_output = format!("{}.map", styles.output);
    let map_url = Path::new(&map_output)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());
    let result = postprocess(
        &compiled,
        styles,
        map_url.as_deref().filter(|_| styles.sourcemap),
    )?;

    let mut report = TaskReport::new(Task::Styles);
    write_output(&ctx.paths.build, &styles.output, result.css.as_bytes())?;
    report.outputs.push(OutputRecord {
        sources: vec![styles.entry.clone()],
        output: styles.output.clone(),
        size: result.css.len() as u64,
        status: OutputStatus::Written,
        original_size: None,
    });

    if let Some(map) = result.map {
        write_output(&ctx.paths.build, &map_output, map.as_bytes())?;
        report.outputs.push(OutputRecord {
            sources: vec![styles.entry.clone()],
            output: map_output,
            size: map.len() as u64,
            status: OutputStatus::Written,
            original_size: None,
        });
    }
    Ok(report)
}
