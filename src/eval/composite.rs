//! Side-by-side comparison images.
//!
//! Outputs are scaled to a common height and laid out left to right in model
//! order on a white canvas.

use std::io::Cursor;
use std::path::Path;

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::eval::report::{CompositeRecord, RunManifest, write_atomic};
use crate::layout::RunLayout;
use crate::queue::ImageRef;

/// Tile height used when none is configured.
pub const DEFAULT_TILE_HEIGHT: u32 = 768;

/// Horizontal gap between tiles, in pixels.
pub const TILE_GAP: u32 = 16;

const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Lay images out left to right, each scaled to `tile_height`.
pub fn side_by_side(images: &[DynamicImage], tile_height: u32, gap: u32) -> Result<RgbaImage> {
    if images.is_empty() {
        return Err(Error::Composite("no images to compose".to_string()));
    }
    let tile_height = tile_height.max(1);

    let tiles: Vec<RgbaImage> = images
        .iter()
        .map(|img| {
            let (w, h) = (img.width().max(1), img.height().max(1));
            let width = ((u64::from(w) * u64::from(tile_height)) / u64::from(h)).max(1) as u32;
            imageops::resize(&img.to_rgba8(), width, tile_height, FilterType::Triangle)
        })
        .collect();

    let total_width = tiles.iter().map(|t| t.width()).sum::<u32>() + gap * (tiles.len() as u32 - 1);
    let mut canvas = RgbaImage::from_pixel(total_width, tile_height, BACKGROUND);

    let mut x = 0i64;
    for tile in &tiles {
        imageops::overlay(&mut canvas, tile, x, 0);
        x += i64::from(tile.width() + gap);
    }

    Ok(canvas)
}

/// Build and write the comparison image for one source of a run.
///
/// Models that failed, or whose output cannot be decoded, are listed as
/// skipped. When nothing succeeded no file is written.
pub fn compose_source(
    manifest: &RunManifest,
    source: &ImageRef,
    layout: &RunLayout,
    tile_height: u32,
) -> Result<CompositeRecord> {
    let mut record = CompositeRecord::new(source.clone());
    let mut images = Vec::new();

    for result in manifest.results_for(source) {
        let loaded = match (&result.output, result.is_success()) {
            (Some(path), true) => load(path),
            _ => None,
        };
        match loaded {
            Some(img) => {
                images.push(img);
                record.included.push(result.item.model.clone());
            }
            None => record.skipped.push(result.item.model.clone()),
        }
    }

    if !record.skipped.is_empty() {
        warn!(source = %source, skipped = ?record.skipped, "models left out of comparison");
    }
    if images.is_empty() {
        return Ok(record);
    }

    let canvas = side_by_side(&images, tile_height, TILE_GAP)?;
    let mut png = Vec::new();
    canvas.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

    let path = layout.comparison_path(source);
    write_atomic(&path, &png)?;
    info!(source = %source, path = %path.display(), models = ?record.included, "wrote comparison");

    record.path = Some(path);
    Ok(record)
}

fn load(path: &Path) -> Option<DynamicImage> {
    match image::open(path) {
        Ok(img) => Some(img),
        Err(e) => {
            warn!(path = %path.display(), %e, "cannot decode output for comparison");
            None
        }
    }
}
