//! 打包输出 - ZIP 压缩包或目录

use std::fs::{self, File};
use std::io::{Cursor, Seek, Write};
use std::path::{Path, PathBuf};

use log::info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::core::error::ExtractError;
use crate::page_extractor::ExtractedImage;

pub const DEFAULT_ARCHIVE_NAME: &str = "extracted_faces.zip";

fn write_entries<W: Write + Seek>(writer: W, images: &[ExtractedImage]) -> Result<W, ExtractError> {
    let mut zip = ZipWriter::new(writer);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    // entry order follows the sequence order
    for image in images {
        zip.start_file(image.filename.as_str(), options)?;
        zip.write_all(&image.bytes)?;
    }

    Ok(zip.finish()?)
}

/// In-memory archive, one entry per image.
pub fn zip_bytes(images: &[ExtractedImage]) -> Result<Vec<u8>, ExtractError> {
    let cursor = write_entries(Cursor::new(Vec::new()), images)?;
    Ok(cursor.into_inner())
}

pub fn write_zip<P: AsRef<Path>>(path: P, images: &[ExtractedImage]) -> Result<(), ExtractError> {
    let path = path.as_ref();
    let file = File::create(path)?;
    write_entries(file, images)?;
    info!("📦 Wrote {} images to {}", images.len(), path.display());
    Ok(())
}

/// Write each PNG under `dir`, creating it if needed. Returns the written paths.
pub fn write_dir<P: AsRef<Path>>(
    dir: P,
    images: &[ExtractedImage],
) -> Result<Vec<PathBuf>, ExtractError> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    let mut written = Vec::with_capacity(images.len());
    for image in images {
        let path = dir.join(&image.filename);
        fs::write(&path, &image.bytes)?;
        written.push(path);
    }

    info!("📁 Wrote {} images to {}", images.len(), dir.display());
    Ok(written)
}
