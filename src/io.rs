use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, ImageError, RgbaImage};
use rfd::FileDialog;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::canvas::Surface;

/// File name every export is offered under.
pub const EXPORT_FILE_NAME: &str = "edited-image.png";

/// Extensions offered by the upload picker (lowercase).
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp", "tga", "tif", "tiff"];

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("file is empty")]
    Empty,
    #[error("unsupported or corrupt image: {0}")]
    Image(#[from] ImageError),
    #[error("decoder crashed: {0}")]
    Panicked(String),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("nothing to export: no image has been rendered")]
    NoImage,
    #[error("PNG encoding failed: {0}")]
    Encode(#[from] ImageError),
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Read a file fully into memory. Decoding happens later, off the UI thread.
pub fn read_image_bytes(path: &Path) -> Result<Vec<u8>, DecodeError> {
    let bytes = std::fs::read(path).map_err(|source| DecodeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    Ok(bytes)
}

/// Decode any supported raster format to straight-alpha RGBA8.
pub fn decode_image(bytes: &[u8]) -> Result<RgbaImage, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}

/// Lossless RGBA8 PNG bytes of `image`.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, ExportError> {
    let mut out = Vec::new();
    PngEncoder::new(&mut out).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        ColorType::Rgba8,
    )?;
    Ok(out)
}

/// Encode the rendered surface and write it to `path`. With no surface nothing
/// is written. The file is only created once encoding has succeeded.
pub fn export_png(surface: Option<&Surface>, path: &Path) -> Result<(), ExportError> {
    let surface = surface.ok_or(ExportError::NoImage)?;
    let bytes = encode_png(surface.pixels())?;

    let io_err = |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&bytes).map_err(io_err)?;
    writer.flush().map_err(io_err)?;
    log::info!("Exported {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

/// Default export target inside `dir` (or the working directory).
pub fn default_export_path(dir: Option<&Path>) -> PathBuf {
    match dir {
        Some(d) => d.join(EXPORT_FILE_NAME),
        None => PathBuf::from(EXPORT_FILE_NAME),
    }
}

/// Native picker for the source image.
pub fn pick_image_path(start_dir: Option<&Path>) -> Option<PathBuf> {
    let mut dialog = FileDialog::new()
        .add_filter("Images", IMAGE_EXTENSIONS)
        .add_filter("All Files", &["*"]);
    if let Some(dir) = start_dir {
        dialog = dialog.set_directory(dir);
    }
    dialog.pick_file()
}

/// Native save dialog pre-filled with the export file name.
pub fn pick_export_path(start_dir: Option<&Path>) -> Option<PathBuf> {
    let mut dialog = FileDialog::new()
        .add_filter("PNG", &["png"])
        .set_file_name(EXPORT_FILE_NAME);
    if let Some(dir) = start_dir {
        dialog = dialog.set_directory(dir);
    }
    dialog.save_file()
}
