//! Raster image encoding.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **JPEG re-encode** | `image::codecs::jpeg::JpegEncoder` |
//! | **PNG optimise** | `oxipng::optimize_from_memory` (lossless) |
//! | **WebP convert** | `webp::Encoder` (lossy) |
//!
//! The module is split into:
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: High-level functions combining parameters + backend
//!
//! SVG files never reach this module; they are text and handled by
//! [`crate::svg`].

pub mod backend;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, ImageBackend};
pub use operations::{Optimized, RasterKind, convert_to_webp, optimize_raster, raster_kind};
pub use params::{JpegParams, PngLevel, PngParams, Quality, WebpParams};
pub use rust_backend::RustBackend;
