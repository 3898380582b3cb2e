//! SVG sprite assembly.

use super::{OutputRecord, OutputStatus, Task, TaskContext, TaskError, TaskReport, write_output};
use crate::sources::{self, SourceSet};
use crate::svg::{self, SpriteSymbol};

pub fn run(ctx: &TaskContext) -> Result<TaskReport, TaskError> {
    let sprite = &ctx.config.sprite;
    let files = sources::resolve(&ctx.paths.source, &SourceSet::new(&sprite.patterns, None))?;

    let mut report = TaskReport::new(Task::Sprite);
    if files.is_empty() {
        tracing::debug!("no sprite inputs matched");
        return Ok(report);
    }

    let mut symbols = Vec::with_capacity(files.len());
    for file in &files {
        let id = file
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        symbols.push(SpriteSymbol {
            id,
            svg: std::fs::read_to_string(&file.path)?,
        });
    }

    let output = svg::build_sprite(&symbols).map_err(|source| TaskError::Svg {
        path: sprite.output.clone(),
        source,
    })?;
    write_output(&ctx.paths.build, &sprite.output, output.as_bytes())?;

    report.outputs.push(OutputRecord {
        sources: files.into_iter().map(|f| f.source_relative).collect(),
        output: sprite.output.clone(),
        size: output.len() as u64,
        status: OutputStatus::Written,
        original_size: None,
    });
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::svg::SvgError;
    use crate::test_helpers::setup_fixtures;
    use tempfile::TempDir;

    #[test]
    fn builds_sprite_from_matching_svgs() {
        let tmp = setup_fixtures();
        let config = PipelineConfig::default();
        let paths = config.paths(tmp.path());

        let report = run(&TaskContext {
            config: &config,
            paths: &paths,
        })
        .unwrap();

        let record = &report.outputs[0];
        assert_eq!(record.output, "img/sprite.svg");
        assert!(record.sources.contains(&"img/htmlacademy.svg".to_string()));
        assert!(!record.sources.iter().any(|s| s.ends_with("photo-frame.svg")));

        let sprite = std::fs::read_to_string(paths.build.join("img/sprite.svg")).unwrap();
        assert!(sprite.contains("<symbol id=\"icon-cart\""));
        assert!(sprite.contains("<symbol id=\"logo-header\""));
        assert!(sprite.contains("<symbol id=\"htmlacademy\""));
        assert!(!sprite.contains("photo-frame"));
    }

    #[test]
    fn no_inputs_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let config = PipelineConfig::default();
        let paths = config.paths(tmp.path());
        let report = run(&TaskContext {
            config: &config,
            paths: &paths,
        })
        .unwrap();
        assert!(report.outputs.is_empty());
        assert!(!paths.build.exists());
    }

    #[test]
    fn duplicate_stems_are_rejected() {
        let tmp = setup_fixtures();
        let dup = tmp.path().join("source/img/extra");
        std::fs::create_dir_all(&dup).unwrap();
        std::fs::write(dup.join("icon-cart.svg"), "<svg viewBox=\"0 0 1 1\"/>").unwrap();

        let config = PipelineConfig::default();
        let paths = config.paths(tmp.path());
        let result = run(&TaskContext {
            config: &config,
            paths: &paths,
        });
        assert!(matches!(
            result,
            Err(TaskError::Svg {
                source: SvgError::DuplicateId(_),
                ..
            })
        ));
    }
}
