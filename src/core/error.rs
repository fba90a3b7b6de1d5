use thiserror::Error;

use super::document::Xref;

/// Errors that abort a whole run.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("Document has no pages")]
    NoPages,
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

/// Errors confined to a single image (or a single page layout). The pipeline
/// logs them and moves on.
#[derive(Debug, Error)]
pub enum PixmapError {
    #[error("object {0} not found")]
    MissingObject(Xref),
    #[error("object {0} is not an image XObject")]
    NotAnImage(Xref),
    #[error("unsupported filter: {0}")]
    UnsupportedFilter(String),
    #[error("unsupported color space: {0}")]
    UnsupportedColorSpace(String),
    #[error("invalid image dimensions {width}x{height}")]
    InvalidDimensions { width: i64, height: i64 },
    #[error("unsupported bits per component: {0}")]
    UnsupportedBitDepth(i64),
    #[error("image data truncated: got {actual} bytes, expected {expected}")]
    TruncatedData { expected: usize, actual: usize },
    #[error("stream error: {0}")]
    Stream(String),
    #[error("decode failed: {0}")]
    Decode(#[source] image::ImageError),
    #[error("PNG encode failed: {0}")]
    Encode(#[source] image::ImageError),
    #[error("page layout unavailable: {0}")]
    Layout(String),
}

impl PixmapError {
    /// Pipeline stage the failure belongs to.
    pub fn stage(&self) -> &'static str {
        match self {
            PixmapError::Encode(_) => "encode",
            PixmapError::UnsupportedColorSpace(_) => "convert",
            PixmapError::Layout(_) => "layout",
            _ => "decode",
        }
    }
}
