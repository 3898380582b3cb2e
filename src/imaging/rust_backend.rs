//! Default image backend.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG) | `image` crate (pure Rust decoders) |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` (baseline) |
//! | Optimise PNG | `oxipng::optimize_from_memory` with a numeric preset |
//! | Encode → WebP | `webp::Encoder` (libwebp, lossy) |

use super::backend::{BackendError, ImageBackend};
use super::params::{JpegParams, PngParams, WebpParams};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageReader};
use std::path::Path;

/// Backend built on `image`, `oxipng` and `webp`.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Load and decode an image from disk, sniffing the format from content.
fn load_image(path: &Path) -> Result<DynamicImage, BackendError> {
    ImageReader::open(path)
        .map_err(BackendError::Io)?
        .with_guessed_format()
        .map_err(BackendError::Io)?
        .decode()
        .map_err(|e| {
            BackendError::ProcessingFailed(format!("Failed to decode {}: {}", path.display(), e))
        })
}

/// JPEG has no alpha channel; flatten to RGB (or keep grayscale).
fn to_jpeg_compatible(img: DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => img,
        DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLuma16(_) => {
            DynamicImage::ImageLuma8(img.to_luma8())
        }
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

/// libwebp only accepts 8-bit RGB or RGBA.
fn to_webp_compatible(img: DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => img,
        other if other.color().has_alpha() => DynamicImage::ImageRgba8(other.to_rgba8()),
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

impl ImageBackend for RustBackend {
    fn optimize_jpeg(&self, params: &JpegParams) -> Result<Vec<u8>, BackendError> {
        let img = to_jpeg_compatible(load_image(&params.source)?);
        let mut buf = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut buf, params.quality.value() as u8);
        img.write_with_encoder(encoder)
            .map_err(|e| BackendError::ProcessingFailed(format!("JPEG encode failed: {}", e)))?;
        Ok(buf)
    }

    fn optimize_png(&self, params: &PngParams) -> Result<Vec<u8>, BackendError> {
        let data = std::fs::read(&params.source)?;
        let options = oxipng::Options::from_preset(params.level.value());
        oxipng::optimize_from_memory(&data, &options).map_err(|e| {
            BackendError::ProcessingFailed(format!(
                "PNG optimisation failed for {}: {}",
                params.source.display(),
                e
            ))
        })
    }

    fn encode_webp(&self, params: &WebpParams) -> Result<Vec<u8>, BackendError> {
        let img = to_webp_compatible(load_image(&params.source)?);
        let encoder = webp::Encoder::from_image(&img).map_err(|e| {
            BackendError::ProcessingFailed(format!(
                "WebP encoder rejected {}: {}",
                params.source.display(),
                e
            ))
        })?;
        let encoded = encoder.encode(params.quality.value() as f32);
        Ok(encoded.to_vec())
    }
}
