//! Image discovery in queue folders and source directories.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::warn;

use super::{ImageRef, ScanWarning};
use crate::error::{Error, Result};

/// Supported image extensions (compared case-insensitively).
pub const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "gif", "bmp"];

/// Bytes read from each file to recognize its format.
const HEADER_LEN: usize = 32;

/// Whether the path has a supported image extension.
#[must_use]
pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

/// List the valid images directly inside `dir`, sorted by file name.
///
/// Unreadable or unrecognized files are skipped with a logged warning.
pub fn list_images(dir: &Path) -> Result<Vec<ImageRef>> {
    let mut warnings = Vec::new();
    let images = scan_folder(dir, &mut warnings)?;
    for warning in &warnings {
        warn!("{warning}");
    }
    Ok(images)
}

/// Sorted entries of a directory.
pub(crate) fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| {
        Error::Queue(format!("Failed to read directory {}: {}", dir.display(), e))
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| {
            Error::Queue(format!("Failed to read entry in {}: {}", dir.display(), e))
        })?;
        paths.push(entry.path());
    }
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths)
}

/// Collect valid images in one folder, recording problems as warnings.
pub(crate) fn scan_folder(dir: &Path, warnings: &mut Vec<ScanWarning>) -> Result<Vec<ImageRef>> {
    let mut images = Vec::new();

    for path in sorted_entries(dir)? {
        if !path.is_file() || !has_image_extension(&path) {
            continue;
        }
        match check_header(&path) {
            Ok(()) => images.push(ImageRef::new(path)),
            Err(reason) => warnings.push(ScanWarning::Unreadable { path, reason }),
        }
    }

    Ok(images)
}

/// Read the file header and check it is a recognizable raster image.
fn check_header(path: &Path) -> std::result::Result<(), String> {
    let mut header = Vec::with_capacity(HEADER_LEN);
    File::open(path)
        .and_then(|f| f.take(HEADER_LEN as u64).read_to_end(&mut header))
        .map_err(|e| e.to_string())?;

    if header.is_empty() {
        return Err("file is empty".to_string());
    }
    image::guess_format(&header)
        .map(|_| ())
        .map_err(|_| "not a recognizable image".to_string())
}

/// FNV-1a 64-bit checksum of file contents, hex encoded.
#[must_use]
pub fn content_checksum(data: &[u8]) -> String {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    let hash = data.iter().fold(FNV_OFFSET, |hash, &byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    });
    format!("{hash:016x}")
}
