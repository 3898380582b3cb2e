//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the high-level [`operations`](super::operations) module
//! (which decides what to encode) and the [`backend`](super::backend)
//! (which does the actual pixel work).
//!
//! ## Types
//!
//! - [`Quality`]: lossy encoding quality (1–100). Clamped on construction.
//! - [`PngLevel`]: lossless optimisation preset (0–6). Clamped on construction.
//! - [`JpegParams`], [`PngParams`], [`WebpParams`]: one source file plus its settings.

use std::path::PathBuf;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(85)
    }
}

/// PNG optimisation preset, from 0 (fast) to 6 (exhaustive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PngLevel(u8);

impl PngLevel {
    pub fn new(value: u8) -> Self {
        Self(value.min(6))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for PngLevel {
    fn default() -> Self {
        Self(3)
    }
}

/// Re-encode a JPEG.
#[derive(Debug, Clone, PartialEq)]
pub struct JpegParams {
    pub source: PathBuf,
    pub quality: Quality,
}

/// Losslessly shrink a PNG.
#[derive(Debug, Clone, PartialEq)]
pub struct PngParams {
    pub source: PathBuf,
    pub level: PngLevel,
}

/// Convert any decodable raster to lossy WebP.
#[derive(Debug, Clone, PartialEq)]
pub struct WebpParams {
    pub source: PathBuf,
    pub quality: Quality,
}
