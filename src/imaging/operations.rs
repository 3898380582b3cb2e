//! High-level image operations.
//!
//! These functions pick the encoder for a file, call the backend, and apply
//! the keep-smaller rule: an "optimised" file that came out larger than its
//! source is discarded in favour of the original bytes.

use super::backend::{BackendError, ImageBackend};
use super::params::{JpegParams, PngLevel, PngParams, Quality, WebpParams};
use std::path::Path;

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Raster formats the images task re-encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterKind {
    Jpeg,
    Png,
}

/// Classify a path by extension (case-insensitive).
pub fn raster_kind(path: &Path) -> Option<RasterKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some(RasterKind::Jpeg),
        "png" => Some(RasterKind::Png),
        _ => None,
    }
}

/// Outcome of optimising one raster file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Optimized {
    pub bytes: Vec<u8>,
    pub original_size: u64,
    /// True when the encoder did not beat the source and the source was kept.
    pub kept_original: bool,
}

/// Re-encode a JPEG at `quality` or losslessly recompress a PNG at `level`.
pub fn optimize_raster(
    backend: &impl ImageBackend,
    source: &Path,
    kind: RasterKind,
    quality: Quality,
    level: PngLevel,
) -> Result<Optimized> {
    let original = std::fs::read(source)?;
    let encoded = match kind {
        RasterKind::Jpeg => backend.optimize_jpeg(&JpegParams {
            source: source.to_path_buf(),
            quality,
        })?,
        RasterKind::Png => backend.optimize_png(&PngParams {
            source: source.to_path_buf(),
            level,
        })?,
    };

    let original_size = original.len() as u64;
    if encoded.len() >= original.len() {
        tracing::debug!(
            source = %source.display(),
            original = original.len(),
            encoded = encoded.len(),
            "optimised output not smaller; keeping source bytes"
        );
        return Ok(Optimized {
            bytes: original,
            original_size,
            kept_original: true,
        });
    }
    Ok(Optimized {
        bytes: encoded,
        original_size,
        kept_original: false,
    })
}

/// Encode a raster file as WebP.
pub fn convert_to_webp(
    backend: &impl ImageBackend,
    source: &Path,
    quality: Quality,
) -> Result<Vec<u8>> {
    backend.encode_webp(&WebpParams {
        source: source.to_path_buf(),
        quality,
    })
}
