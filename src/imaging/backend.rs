//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the three encoders the pipeline needs:
//! JPEG re-encode, lossless PNG optimisation, and WebP conversion. Each one
//! returns the encoded bytes; deciding where (and whether) to write them is
//! left to [`operations`](super::operations) and the tasks.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend).

use super::params::{JpegParams, PngParams, WebpParams};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Trait for image encoding backends.
///
/// `Sync` so a single backend can be shared across rayon workers.
pub trait ImageBackend: Sync {
    /// Decode a JPEG and encode it again at the requested quality.
    fn optimize_jpeg(&self, params: &JpegParams) -> Result<Vec<u8>, BackendError>;

    /// Losslessly recompress a PNG.
    fn optimize_png(&self, params: &PngParams) -> Result<Vec<u8>, BackendError>;

    /// Decode a raster image and encode it as lossy WebP.
    fn encode_webp(&self, params: &WebpParams) -> Result<Vec<u8>, BackendError>;
}
