//! Image optimisation.
//!
//! Each matched file is handled by extension:
//!
//! | Input | Treatment | Cached |
//! |-------|-----------|--------|
//! | `.jpg` / `.jpeg` | re-encode at `images.jpeg_quality` | yes |
//! | `.png` | lossless recompression at `images.png_level` | yes |
//! | `.svg` | [`svg::optimize`](crate::svg::optimize) | no |
//! | anything else | copied | no |
//!
//! Two sources that land on the same output path are an error, raised before
//! anything is written. Files are processed in parallel on the rayon pool.
//! Output order in the report follows the (sorted) input order regardless of
//! scheduling.

use super::{
    OutputRecord, OutputStatus, Task, TaskContext, TaskError, TaskReport, build_relative,
    plan_outputs, write_output,
};
use crate::cache::{self, CacheStats, EncodeCache, EncodeKind, Restored};
use crate::imaging::{ImageBackend, PngLevel, Quality, RasterKind, optimize_raster, raster_kind};
use crate::sources::{self, SourceFile, SourceSet};
use crate::svg;
use rayon::prelude::*;
use std::path::Path;

/// Settings shared by every worker.
struct Settings<'a> {
    build_root: &'a Path,
    quality: Quality,
    level: PngLevel,
}

fn is_svg(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("svg"))
}

/// Look up the cache, or encode and store.
///
/// Shared with the `webp` task; `encode` is only called on a miss.
pub(crate) fn cached_encode(
    cache: &EncodeCache,
    file: &SourceFile,
    output: &str,
    dest: &Path,
    params_hash: &str,
    encode: impl FnOnce() -> Result<(Vec<u8>, OutputStatus), TaskError>,
) -> Result<OutputStatus, TaskError> {
    let source_hash = cache::hash_file(&file.path)?;
    match cache.restore(output, &source_hash, params_hash, dest)? {
        Some(Restored::Exact) => return Ok(OutputStatus::Cached),
        Some(Restored::Relocated) => return Ok(OutputStatus::Relocated),
        None => {}
    }

    let (bytes, status) = encode()?;
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(dest, &bytes)?;
    cache.store(output, &bytes, &source_hash, params_hash)?;
    Ok(status)
}

/// Tally cache outcomes from a finished report.
pub(crate) fn cache_stats(outputs: &[OutputRecord]) -> CacheStats {
    let mut stats = CacheStats::default();
    for record in outputs {
        match record.status {
            OutputStatus::Cached => stats.hit(),
            OutputStatus::Relocated => stats.relocate(),
            OutputStatus::Encoded | OutputStatus::Kept => stats.miss(),
            OutputStatus::Written | OutputStatus::Copied => {}
        }
    }
    stats
}

fn process_raster(
    backend: &impl ImageBackend,
    cache: &EncodeCache,
    settings: &Settings,
    file: &SourceFile,
    output: &str,
    kind: RasterKind,
) -> Result<OutputRecord, TaskError> {
    let dest = settings.build_root.join(output);
    let params_hash = match kind {
        RasterKind::Jpeg => cache::hash_encode_params(EncodeKind::Jpeg, settings.quality.value()),
        RasterKind::Png => {
            cache::hash_encode_params(EncodeKind::Png, u32::from(settings.level.value()))
        }
    };

    let original_size = std::fs::metadata(&file.path)?.len();
    let status = cached_encode(cache, file, output, &dest, &params_hash, || {
        let optimized = optimize_raster(backend, &file.path, kind, settings.quality, settings.level)
            .map_err(|source| TaskError::Imaging {
                path: file.source_relative.clone(),
                source,
            })?;
        let status = if optimized.kept_original {
            OutputStatus::Kept
        } else {
            OutputStatus::Encoded
        };
        Ok((optimized.bytes, status))
    })?;

    Ok(OutputRecord {
        sources: vec![file.source_relative.clone()],
        size: std::fs::metadata(&dest)?.len(),
        output: output.to_string(),
        status,
        original_size: Some(original_size),
    })
}

fn process_svg(
    settings: &Settings,
    file: &SourceFile,
    output: &str,
) -> Result<OutputRecord, TaskError> {
    let input = std::fs::read_to_string(&file.path)?;
    let cleaned = svg::optimize(&input).map_err(|source| TaskError::Svg {
        path: file.source_relative.clone(),
        source,
    })?;
    write_output(settings.build_root, output, cleaned.as_bytes())?;
    Ok(OutputRecord {
        sources: vec![file.source_relative.clone()],
        output: output.to_string(),
        size: cleaned.len() as u64,
        status: OutputStatus::Written,
        original_size: Some(input.len() as u64),
    })
}

fn process_other(
    settings: &Settings,
    file: &SourceFile,
    output: &str,
) -> Result<OutputRecord, TaskError> {
    let dest = settings.build_root.join(output);
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let size = std::fs::copy(&file.path, &dest)?;
    Ok(OutputRecord {
        sources: vec![file.source_relative.clone()],
        output: output.to_string(),
        size,
        status: OutputStatus::Copied,
        original_size: None,
    })
}

pub fn run(
    ctx: &TaskContext,
    backend: &impl ImageBackend,
    use_cache: bool,
) -> Result<TaskReport, TaskError> {
    let images = &ctx.config.images;
    let files = sources::resolve(&ctx.paths.source, &SourceSet::new(&images.patterns, None))?;
    let planned = plan_outputs(&files, |file| build_relative(&images.dest, &file.relative))?;
    let settings = Settings {
        build_root: &ctx.paths.build,
        quality: Quality::new(images.jpeg_quality),
        level: PngLevel::new(images.png_level),
    };
    let cache = EncodeCache::open(&ctx.paths.cache.join(Task::Images.name()), use_cache);

    let outputs = files
        .par_iter()
        .zip(planned.par_iter())
        .map(|(file, output)| match raster_kind(&file.path) {
            Some(kind) => process_raster(backend, &cache, &settings, file, output, kind),
            None if is_svg(&file.path) => process_svg(&settings, file, output),
            None => process_other(&settings, file, output),
        })
        .collect::<Result<Vec<_>, TaskError>>()?;

    cache.save()?;

    let stats = cache_stats(&outputs);
    tracing::debug!(%stats, "images done");
    Ok(TaskReport {
        task: Task::Images,
        outputs,
        cache: Some(stats),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};
    use crate::test_helpers::{find_output, setup_fixtures, write_png};

    fn run_fixture(backend: &MockBackend, config: &PipelineConfig, root: &Path) -> TaskReport {
        let paths = config.paths(root);
        run(
            &TaskContext {
                config,
                paths: &paths,
            },
            backend,
            true,
        )
        .unwrap()
    }

    #[test]
    fn dispatches_by_extension() {
        let tmp = setup_fixtures();
        let backend = MockBackend::new();
        let config = PipelineConfig::default();
        let report = run_fixture(&backend, &config, tmp.path());

        assert_eq!(find_output(&report, "img/hero.jpg").status, OutputStatus::Encoded);
        assert_eq!(
            find_output(&report, "img/icons/icon-cart.png").status,
            OutputStatus::Encoded
        );
        assert_eq!(
            find_output(&report, "img/logo-header.svg").status,
            OutputStatus::Written
        );

        let ops = backend.get_operations();
        assert!(ops.iter().any(|op| matches!(op, RecordedOp::Jpeg { quality: 85, .. })));
        assert!(ops.iter().any(|op| matches!(op, RecordedOp::Png { level: 3, .. })));
        assert!(!ops.iter().any(|op| matches!(op, RecordedOp::Webp { .. })));
    }

    #[test]
    fn svg_output_is_cleaned() {
        let tmp = setup_fixtures();
        let config = PipelineConfig::default();
        run_fixture(&MockBackend::new(), &config, tmp.path());

        let svg = std::fs::read_to_string(tmp.path().join("build/img/logo-header.svg")).unwrap();
        assert!(!svg.contains("<?xml"));
        assert!(!svg.contains("sketch:"));
    }

    #[test]
    fn larger_encode_keeps_source() {
        let tmp = setup_fixtures();
        let config = PipelineConfig::default();
        let report = run_fixture(&MockBackend::with_output_len(10_000_000), &config, tmp.path());

        let record = find_output(&report, "img/hero.jpg");
        assert_eq!(record.status, OutputStatus::Kept);
        assert_eq!(record.size, record.original_size.unwrap());
        assert_eq!(
            std::fs::read(tmp.path().join("build/img/hero.jpg")).unwrap(),
            std::fs::read(tmp.path().join("source/img/hero.jpg")).unwrap()
        );
    }

    #[test]
    fn second_run_hits_cache() {
        let tmp = setup_fixtures();
        let config = PipelineConfig::default();
        let first = run_fixture(&MockBackend::new(), &config, tmp.path());
        let encoded = first.cache.unwrap().misses;
        assert!(encoded > 0);

        std::fs::remove_dir_all(tmp.path().join("build")).unwrap();
        let backend = MockBackend::new();
        let second = run_fixture(&backend, &config, tmp.path());

        assert!(backend.get_operations().is_empty());
        let stats = second.cache.unwrap();
        assert_eq!(stats.hits, encoded);
        assert_eq!(stats.misses, 0);
        assert_eq!(
            find_output(&second, "img/hero.jpg").status,
            OutputStatus::Cached
        );
        assert!(tmp.path().join("build/img/hero.jpg").is_file());
    }

    #[test]
    fn changed_quality_reencodes_only_jpegs() {
        let tmp = setup_fixtures();
        let mut config = PipelineConfig::default();
        run_fixture(&MockBackend::new(), &config, tmp.path());

        config.images.jpeg_quality = 60;
        let backend = MockBackend::new();
        let report = run_fixture(&backend, &config, tmp.path());

        assert_eq!(find_output(&report, "img/hero.jpg").status, OutputStatus::Encoded);
        assert_eq!(
            find_output(&report, "img/icons/icon-cart.png").status,
            OutputStatus::Cached
        );
        assert!(
            backend
                .get_operations()
                .iter()
                .all(|op| matches!(op, RecordedOp::Jpeg { quality: 60, .. }))
        );
    }

    #[test]
    fn renamed_source_is_relocated() {
        let tmp = setup_fixtures();
        let config = PipelineConfig::default();
        run_fixture(&MockBackend::new(), &config, tmp.path());

        std::fs::rename(
            tmp.path().join("source/img/hero.jpg"),
            tmp.path().join("source/img/hero-wide.jpg"),
        )
        .unwrap();
        let backend = MockBackend::new();
        let report = run_fixture(&backend, &config, tmp.path());

        assert_eq!(
            find_output(&report, "img/hero-wide.jpg").status,
            OutputStatus::Relocated
        );
        assert!(backend.get_operations().is_empty());

        let objects = tmp.path().join(".assets-cache/images/img");
        assert!(objects.join("hero-wide.jpg").is_file());
        assert!(!objects.join("hero.jpg").exists());
    }

    #[test]
    fn identical_sources_are_both_cached_on_rebuild() {
        let tmp = setup_fixtures();
        std::fs::copy(
            tmp.path().join("source/img/hero.jpg"),
            tmp.path().join("source/img/hero-copy.jpg"),
        )
        .unwrap();
        let config = PipelineConfig::default();
        run_fixture(&MockBackend::new(), &config, tmp.path());

        for _ in 0..2 {
            let report = run_fixture(&MockBackend::new(), &config, tmp.path());
            for output in ["img/hero.jpg", "img/hero-copy.jpg"] {
                assert_eq!(find_output(&report, output).status, OutputStatus::Cached);
            }
            assert_eq!(report.cache.unwrap().relocations, 0);
        }
    }

    #[test]
    fn backend_failure_names_the_file() {
        let tmp = setup_fixtures();
        let config = PipelineConfig::default();
        let paths = config.paths(tmp.path());
        let result = run(
            &TaskContext {
                config: &config,
                paths: &paths,
            },
            &MockBackend::failing_on("hero.jpg"),
            false,
        );
        match result {
            Err(TaskError::Imaging { path, .. }) => assert_eq!(path, "img/hero.jpg"),
            other => panic!("expected imaging error, got {other:?}"),
        }
    }

    #[test]
    fn same_output_from_two_patterns_is_error() {
        let tmp = setup_fixtures();
        write_png(&tmp.path().join("source/img/a.png"), 8, 8);
        write_png(&tmp.path().join("source/photos/a.png"), 8, 8);
        let mut config = PipelineConfig::default();
        config.images.patterns = vec!["img/*.png".to_string(), "photos/*.png".to_string()];
        let paths = config.paths(tmp.path());
        let backend = MockBackend::new();

        let result = run(
            &TaskContext {
                config: &config,
                paths: &paths,
            },
            &backend,
            true,
        );

        match result {
            Err(TaskError::OutputCollision {
                output,
                first,
                second,
            }) => {
                assert_eq!(output, "img/a.png");
                assert_eq!((first.as_str(), second.as_str()), ("img/a.png", "photos/a.png"));
            }
            other => panic!("expected collision, got {other:?}"),
        }
        assert!(backend.get_operations().is_empty());
        assert!(!paths.build.join("img/a.png").exists());
    }

    #[test]
    fn cache_stats_count_statuses() {
        let record = |status| OutputRecord {
            sources: vec![],
            output: String::new(),
            size: 0,
            status,
            original_size: None,
        };
        let stats = cache_stats(&[
            record(OutputStatus::Cached),
            record(OutputStatus::Relocated),
            record(OutputStatus::Encoded),
            record(OutputStatus::Kept),
            record(OutputStatus::Written),
        ]);
        assert_eq!((stats.hits, stats.relocations, stats.misses), (1, 1, 2));
    }
}
