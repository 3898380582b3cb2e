//! WebP siblings for raster images.
//!
//! `img/hero.jpg` becomes `img/hero.webp` under `webp.dest`. Because the
//! extension is dropped, `hero.jpg` and `hero.png` side by side would both
//! produce `hero.webp`; that is rejected before anything is encoded, as is
//! the same name matched under two patterns (`img/a.png`, `photos/a.png`).

use super::images::{cache_stats, cached_encode};
use super::{
    OutputRecord, OutputStatus, Task, TaskContext, TaskError, TaskReport, build_relative,
    plan_outputs,
};
use crate::cache::{self, EncodeCache, EncodeKind};
use crate::imaging::{ImageBackend, Quality, convert_to_webp};
use crate::sources::{self, SourceSet};
use rayon::prelude::*;

/// `icons/cart.png` → `icons/cart.webp`.
pub fn webp_name(relative: &str) -> String {
    let (dir, file) = match relative.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, relative),
    };
    let stem = match file.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file,
    };
    match dir {
        Some(dir) => format!("{dir}/{stem}.webp"),
        None => format!("{stem}.webp"),
    }
}

pub fn run(
    ctx: &TaskContext,
    backend: &impl ImageBackend,
    use_cache: bool,
) -> Result<TaskReport, TaskError> {
    let webp = &ctx.config.webp;
    let files = sources::resolve(&ctx.paths.source, &SourceSet::new(&webp.patterns, None))?;
    let planned = plan_outputs(&files, |file| {
        build_relative(&webp.dest, &webp_name(&file.relative))
    })?;

    let quality = Quality::new(webp.quality);
    let params_hash = cache::hash_encode_params(EncodeKind::Webp, quality.value());
    let cache = EncodeCache::open(&ctx.paths.cache.join(Task::Webp.name()), use_cache);

    let outputs = files
        .par_iter()
        .zip(planned.par_iter())
        .map(|(file, output)| -> Result<OutputRecord, TaskError> {
            let dest = ctx.paths.build.join(output);
            let status = cached_encode(&cache, file, output, &dest, &params_hash, || {
                let bytes = convert_to_webp(backend, &file.path, quality).map_err(|source| {
                    TaskError::Imaging {
                        path: file.source_relative.clone(),
                        source,
                    }
                })?;
                Ok((bytes, OutputStatus::Encoded))
            })?;
            Ok(OutputRecord {
                sources: vec![file.source_relative.clone()],
                output: output.clone(),
                size: std::fs::metadata(&dest)?.len(),
                status,
                original_size: Some(std::fs::metadata(&file.path)?.len()),
            })
        })
        .collect::<Result<Vec<_>, TaskError>>()?;

    cache.save()?;

    let stats = cache_stats(&outputs);
    tracing::debug!(%stats, "webp done");
    Ok(TaskReport {
        task: Task::Webp,
        outputs,
        cache: Some(stats),
    })
}
