//! Shared test utilities.
//!
//! `setup_fixtures()` gives each test its own copy of `fixtures/` laid out
//! as a project root:
//!
//! ```text
//! tmp/
//! └── source/
//!     ├── index.html, catalog.html, favicon.ico
//!     ├── fonts/   sass/   js/
//!     └── img/
//!         ├── hero.jpg              (generated)
//!         ├── icons/icon-cart.png   (generated)
//!         └── *.svg
//! ```
//!
//! Raster images are generated rather than checked in so their content is
//! known and small.

use crate::tasks::{OutputRecord, TaskReport};
use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use std::path::Path;
use tempfile::TempDir;

/// Copy `fixtures/` to a temp directory and add the generated images.
pub fn setup_fixtures() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures");
    copy_dir_recursive(&fixtures, tmp.path()).unwrap();
    write_jpeg(&tmp.path().join("source/img/hero.jpg"), 64, 48);
    write_png(&tmp.path().join("source/img/icons/icon-cart.png"), 24, 24);
    tmp
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            std::fs::create_dir_all(&dst_path)?;
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            std::fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

fn ensure_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
}

/// Write an RGBA gradient PNG.
pub fn write_png(path: &Path, width: u32, height: u32) {
    ensure_parent(path);
    let img = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x * 255 / width.max(1)) as u8, (y * 255 / height.max(1)) as u8, 128, 255])
    });
    img.save_with_format(path, ImageFormat::Png).unwrap();
}

/// Write an RGB gradient JPEG.
pub fn write_jpeg(path: &Path, width: u32, height: u32) {
    ensure_parent(path);
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 255 / width.max(1)) as u8, 96, (y * 255 / height.max(1)) as u8])
    });
    img.save_with_format(path, ImageFormat::Jpeg).unwrap();
}

/// The record for `output`, panicking with the available outputs if absent.
pub fn find_output<'a>(report: &'a TaskReport, output: &str) -> &'a OutputRecord {
    report
        .outputs
        .iter()
        .find(|o| o.output == output)
        .unwrap_or_else(|| {
            let names: Vec<&str> = report.outputs.iter().map(|o| o.output.as_str()).collect();
            panic!("output '{output}' not found in {names:?}")
        })
}
