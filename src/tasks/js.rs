//! Concatenate and minify JavaScript.

use super::{OutputRecord, OutputStatus, Task, TaskContext, TaskError, TaskReport, write_output};
use crate::sources::{self, SourceSet};

/// Separator between concatenated scripts, so a file without a trailing
/// semicolon cannot run into the next one.
const SEPARATOR: &str = ";\n";

/// Join scripts in order and minify the bundle.
pub fn bundle(scripts: &[String]) -> String {
    let joined = scripts.join(SEPARATOR);
    minifier::js::minify(&joined).to_string()
}

pub fn run(ctx: &TaskContext) -> Result<TaskReport, TaskError> {
    let js = &ctx.config.js;
    let files = sources::resolve(&ctx.paths.source, &SourceSet::new(&js.patterns, None))?;

    let mut report = TaskReport::new(Task::Js);
    if files.is_empty() {
        tracing::debug!("no scripts matched; skipping bundle");
        return Ok(report);
    }

    let mut scripts = Vec::with_capacity(files.len());
    let mut original_size = 0u64;
    for file in &files {
        let script = std::fs::read_to_string(&file.path)?;
        original_size += script.len() as u64;
        scripts.push(script);
    }
    let output = bundle(&scripts);
    write_output(&ctx.paths.build, &js.output, output.as_bytes())?;

    report.outputs.push(OutputRecord {
        sources: files.into_iter().map(|f| f.source_relative).collect(),
        output: js.output.clone(),
        size: output.len() as u64,
        status: OutputStatus::Written,
        original_size: Some(original_size),
    });
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::test_helpers::setup_fixtures;
    use tempfile::TempDir;

    #[test]
    fn bundle_keeps_order_and_shrinks() {
        let scripts = vec![
            "var first = 1;\n\n// comment\nconsole.log(first)\n".to_string(),
            "var second = 2;\nconsole.log(second);\n".to_string(),
        ];
        let out = bundle(&scripts);
        let first = out.find("first").unwrap();
        let second = out.find("second").unwrap();
        assert!(first < second);
        assert!(!out.contains("// comment"));
        assert!(out.len() < scripts.iter().map(String::len).sum::<usize>());
    }

    #[test]
    fn run_concatenates_fixture_scripts() {
        let tmp = setup_fixtures();
        let config = PipelineConfig::default();
        let paths = config.paths(tmp.path());

        let report = run(&TaskContext {
            config: &config,
            paths: &paths,
        })
        .unwrap();

        assert_eq!(report.outputs.len(), 1);
        let record = &report.outputs[0];
        assert_eq!(record.output, "js/app.min.js");
        assert_eq!(record.sources, vec!["js/menu.js", "js/slider.js"]);
        let bundle = std::fs::read_to_string(paths.build.join("js/app.min.js")).unwrap();
        assert!(bundle.find("main-nav").unwrap() < bundle.find("slider").unwrap());
    }

    #[test]
    fn same_file_name_in_two_directories_is_bundled_twice() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("source");
        std::fs::create_dir_all(source.join("js")).unwrap();
        std::fs::create_dir_all(source.join("vendor")).unwrap();
        std::fs::write(source.join("vendor/util.js"), "window.fromVendor = 1;\n").unwrap();
        std::fs::write(source.join("js/util.js"), "window.fromJs = 1;\n").unwrap();

        let mut config = PipelineConfig::default();
        config.js.patterns = vec!["vendor/*.js".to_string(), "js/*.js".to_string()];
        let paths = config.paths(tmp.path());

        let report = run(&TaskContext {
            config: &config,
            paths: &paths,
        })
        .unwrap();

        assert_eq!(report.outputs[0].sources, vec!["js/util.js", "vendor/util.js"]);
        let bundle = std::fs::read_to_string(paths.build.join("js/app.min.js")).unwrap();
        let from_js = bundle.find("fromJs").unwrap();
        let from_vendor = bundle.find("fromVendor").unwrap();
        assert!(from_js < from_vendor);
    }

    #[test]
    fn no_scripts_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let config = PipelineConfig::default();
        let paths = config.paths(tmp.path());

        let report = run(&TaskContext {
            config: &config,
            paths: &paths,
        })
        .unwrap();

        assert!(report.outputs.is_empty());
        assert!(!paths.build.join("js/app.min.js").exists());
    }
}
