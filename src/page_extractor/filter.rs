//! 提取过滤 - 解码、色彩空间归一化、尺寸过滤、PNG 编码与命名

use std::io::Cursor;

use image::{DynamicImage, ImageOutputFormat};
use log::{debug, warn};
use rayon::prelude::*;
use rayon::ThreadPool;

use super::layout::ImageRef;
use crate::core::document::{ImageSource, Xref};
use crate::core::error::PixmapError;

/// One image that survived the filter.
#[derive(Debug, Clone)]
pub struct ExtractedImage {
    /// `img_{sequence:03}_page{page_number}.png`
    pub filename: String,
    /// PNG, RGB or RGBA.
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub page_number: usize,
    pub sequence: u32,
}

#[derive(Debug)]
pub enum SkipReason {
    /// Decoded fine but below the minimum size; not an error.
    TooSmall { width: u32, height: u32 },
    Failed(PixmapError),
}

#[derive(Debug)]
pub enum ImageStatus {
    Extracted { filename: String },
    Skipped(SkipReason),
}

/// Why each considered image was kept or dropped.
#[derive(Debug)]
pub struct ImageAudit {
    pub page_number: usize,
    pub xref: Xref,
    pub x: f32,
    pub y: f32,
    pub status: ImageStatus,
}

impl ImageAudit {
    pub fn is_extracted(&self) -> bool {
        matches!(self.status, ImageStatus::Extracted { .. })
    }
}

/// Inclusive minimum pixel dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeFilter {
    pub min_width: u32,
    pub min_height: u32,
}

impl SizeFilter {
    pub fn accepts(&self, width: u32, height: u32) -> bool {
        width >= self.min_width && height >= self.min_height
    }
}

pub fn image_filename(sequence: u32, page_number: usize) -> String {
    format!("img_{:03}_page{}.png", sequence, page_number)
}

/// Anything with fewer than three color channels (alpha excluded) becomes RGB,
/// keeping alpha if present. Dimensions are unchanged.
pub fn normalize_color(image: DynamicImage) -> DynamicImage {
    let color = image.color();
    let channels = color.channel_count() - u8::from(color.has_alpha());
    if channels >= 3 {
        return image;
    }
    if color.has_alpha() {
        DynamicImage::ImageRgba8(image.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(image.to_rgb8())
    }
}

pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, PixmapError> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageOutputFormat::Png)
        .map_err(PixmapError::Encode)?;
    Ok(buffer.into_inner())
}

/// PNG bytes awaiting a sequence number.
#[derive(Debug)]
struct EncodedImage {
    bytes: Vec<u8>,
    width: u32,
    height: u32,
}

/// Decode, normalize, size-check and encode one placement. The pixel buffer
/// is dropped as soon as the PNG exists.
fn render(
    source: &dyn ImageSource,
    image_ref: &ImageRef,
    size: SizeFilter,
) -> Result<EncodedImage, SkipReason> {
    let image = source
        .load_image(image_ref.xref)
        .map_err(SkipReason::Failed)?;
    let image = normalize_color(image);

    let (width, height) = (image.width(), image.height());
    if !size.accepts(width, height) {
        return Err(SkipReason::TooSmall { width, height });
    }

    let bytes = encode_png(&image).map_err(SkipReason::Failed)?;
    drop(image);

    Ok(EncodedImage {
        bytes,
        width,
        height,
    })
}

/// Extraction output for one page.
#[derive(Debug, Default)]
pub struct PageOutput {
    pub images: Vec<ExtractedImage>,
    pub audits: Vec<ImageAudit>,
}

pub struct ExtractionFilter {
    size: SizeFilter,
}

impl ExtractionFilter {
    pub fn new(min_width: u32, min_height: u32) -> Self {
        Self {
            size: SizeFilter {
                min_width,
                min_height,
            },
        }
    }

    pub fn size(&self) -> SizeFilter {
        self.size
    }

    /// Extract `ordered` (already in reading order) from page `page_number`
    /// (1-based). `counter` is the number of images emitted so far in the
    /// document; the advanced counter is returned.
    ///
    /// With a pool the per-image work runs in parallel, but sequence numbers
    /// are still handed out here in `ordered` order.
    pub fn extract_page(
        &self,
        source: &dyn ImageSource,
        page_number: usize,
        ordered: &[ImageRef],
        counter: u32,
        pool: Option<&ThreadPool>,
    ) -> (PageOutput, u32) {
        let size = self.size;
        let rendered: Vec<Result<EncodedImage, SkipReason>> = match pool {
            Some(pool) => pool.install(|| {
                ordered
                    .par_iter()
                    .map(|r| render(source, r, size))
                    .collect()
            }),
            None => ordered.iter().map(|r| render(source, r, size)).collect(),
        };

        let mut counter = counter;
        let mut output = PageOutput::default();

        for (image_ref, result) in ordered.iter().zip(rendered) {
            let status = match result {
                Ok(encoded) => {
                    counter += 1;
                    let filename = image_filename(counter, page_number);
                    output.images.push(ExtractedImage {
                        filename: filename.clone(),
                        bytes: encoded.bytes,
                        width: encoded.width,
                        height: encoded.height,
                        page_number,
                        sequence: counter,
                    });
                    ImageStatus::Extracted { filename }
                }
                Err(SkipReason::TooSmall { width, height }) => {
                    debug!(
                        "page {}: {} is {}x{}, below {}x{}",
                        page_number, image_ref.xref, width, height, size.min_width, size.min_height
                    );
                    ImageStatus::Skipped(SkipReason::TooSmall { width, height })
                }
                Err(SkipReason::Failed(e)) => {
                    warn!(
                        "⚠️ page {}: skipping {} ({}): {}",
                        page_number,
                        image_ref.xref,
                        e.stage(),
                        e
                    );
                    ImageStatus::Skipped(SkipReason::Failed(e))
                }
            };

            output.audits.push(ImageAudit {
                page_number,
                xref: image_ref.xref,
                x: image_ref.x,
                y: image_ref.y,
                status,
            });
        }

        (output, counter)
    }
}
