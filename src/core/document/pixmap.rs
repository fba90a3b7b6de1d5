//! 图片 XObject 解码 - 将 PDF 图片流还原为 `DynamicImage`
//!
//! Handles sample data behind any chain of Flate, LZW, ASCIIHex, ASCII85 and
//! RunLength filters (with predictors) in Gray, RGB, CMYK, ICCBased and Indexed
//! color spaces at 1/2/4/8/16 bits per component, plus DCT (JPEG) streams
//! through the `image` crate. CMYK is folded into RGB here so nothing
//! downstream ever sees four-channel color.

use image::{DynamicImage, GrayImage, ImageFormat, RgbImage, RgbaImage};
use log::{debug, warn};
use lopdf::{Dictionary, Document, Object, Stream};

use super::filters::{apply_filters, filter_chain, FilterKind};
use super::scanner::{as_number, resolve};
use super::Xref;
use crate::core::error::PixmapError;

/// Upper bound on decoded samples per image (256 Mi).
const MAX_SAMPLES: usize = 1 << 28;

#[derive(Debug, Clone, PartialEq)]
enum ColorSpace {
    Gray,
    Rgb,
    Cmyk,
    Indexed {
        base: Box<ColorSpace>,
        hival: usize,
        lookup: Vec<u8>,
    },
}

impl ColorSpace {
    fn components(&self) -> usize {
        match self {
            ColorSpace::Gray | ColorSpace::Indexed { .. } => 1,
            ColorSpace::Rgb => 3,
            ColorSpace::Cmyk => 4,
        }
    }

    fn parse(doc: &Document, obj: &Object) -> Result<Self, PixmapError> {
        let obj = resolve(doc, obj)
            .ok_or_else(|| PixmapError::UnsupportedColorSpace("dangling reference".into()))?;

        match obj {
            Object::Name(name) => Self::from_family(name),
            Object::Array(arr) => {
                let family = arr
                    .first()
                    .and_then(|o| resolve(doc, o))
                    .and_then(|o| o.as_name().ok())
                    .ok_or_else(|| PixmapError::UnsupportedColorSpace("empty array".into()))?;

                match family {
                    b"ICCBased" => Self::parse_icc(doc, arr.get(1)),
                    b"Indexed" | b"I" => Self::parse_indexed(doc, arr),
                    b"CalGray" => Ok(ColorSpace::Gray),
                    b"CalRGB" => Ok(ColorSpace::Rgb),
                    other => Self::from_family(other),
                }
            }
            other => Err(PixmapError::UnsupportedColorSpace(format!("{:?}", other))),
        }
    }

    fn from_family(name: &[u8]) -> Result<Self, PixmapError> {
        match name {
            b"DeviceGray" | b"G" | b"CalGray" => Ok(ColorSpace::Gray),
            b"DeviceRGB" | b"RGB" | b"CalRGB" => Ok(ColorSpace::Rgb),
            b"DeviceCMYK" | b"CMYK" => Ok(ColorSpace::Cmyk),
            other => Err(PixmapError::UnsupportedColorSpace(
                String::from_utf8_lossy(other).into_owned(),
            )),
        }
    }

    fn parse_icc(doc: &Document, profile: Option<&Object>) -> Result<Self, PixmapError> {
        let stream = profile
            .and_then(|p| resolve(doc, p))
            .and_then(|p| p.as_stream().ok())
            .ok_or_else(|| PixmapError::UnsupportedColorSpace("ICCBased without profile".into()))?;

        let n = stream.dict.get(b"N").ok().and_then(as_number).map(|n| n as i64);
        match n {
            Some(1) => Ok(ColorSpace::Gray),
            Some(3) => Ok(ColorSpace::Rgb),
            Some(4) => Ok(ColorSpace::Cmyk),
            _ => match stream.dict.get(b"Alternate") {
                Ok(alt) => Self::parse(doc, alt),
                Err(_) => Err(PixmapError::UnsupportedColorSpace(format!(
                    "ICCBased with N={:?}",
                    n
                ))),
            },
        }
    }

    fn parse_indexed(doc: &Document, arr: &[Object]) -> Result<Self, PixmapError> {
        if arr.len() < 4 {
            return Err(PixmapError::UnsupportedColorSpace("short Indexed array".into()));
        }
        let base = Self::parse(doc, &arr[1])?;
        if matches!(base, ColorSpace::Indexed { .. }) {
            return Err(PixmapError::UnsupportedColorSpace("nested Indexed".into()));
        }
        let hival = resolve(doc, &arr[2])
            .and_then(as_number)
            .map(|h| h.clamp(0.0, 255.0) as usize)
            .ok_or_else(|| PixmapError::UnsupportedColorSpace("Indexed hival".into()))?;

        let lookup = match resolve(doc, &arr[3]) {
            Some(Object::String(bytes, _)) => bytes.clone(),
            Some(Object::Stream(stream)) => stream_bytes(doc, stream)?,
            _ => {
                return Err(PixmapError::UnsupportedColorSpace(
                    "Indexed lookup table".into(),
                ))
            }
        };

        Ok(ColorSpace::Indexed {
            base: Box::new(base),
            hival,
            lookup,
        })
    }
}

fn stream_bytes(doc: &Document, stream: &Stream) -> Result<Vec<u8>, PixmapError> {
    apply_filters(&stream.content, &filter_chain(doc, &stream.dict)?)
}

fn dict_int(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<i64> {
    dict.get(key)
        .ok()
        .and_then(|v| resolve(doc, v))
        .and_then(as_number)
        .map(|v| v as i64)
}

fn dict_bool(dict: &Dictionary, key: &[u8]) -> bool {
    matches!(dict.get(key), Ok(Object::Boolean(true)))
}

/// `/Decode [1 0 ...]` on a single-component image inverts its samples.
fn decode_inverted(doc: &Document, dict: &Dictionary) -> bool {
    let Some(arr) = dict
        .get(b"Decode")
        .ok()
        .and_then(|d| resolve(doc, d))
        .and_then(|d| d.as_array().ok())
    else {
        return false;
    };
    match (arr.first().and_then(as_number), arr.get(1).and_then(as_number)) {
        (Some(lo), Some(hi)) => lo > hi,
        _ => false,
    }
}

/// Decode the image XObject behind `xref`. With `include_alpha`, a soft mask
/// of matching size becomes the alpha channel.
pub fn decode_xobject(
    doc: &Document,
    xref: Xref,
    include_alpha: bool,
) -> Result<DynamicImage, PixmapError> {
    let object = doc
        .get_object(xref.0)
        .map_err(|_| PixmapError::MissingObject(xref))?;
    let stream = object
        .as_stream()
        .map_err(|_| PixmapError::NotAnImage(xref))?;
    let is_image = stream
        .dict
        .get(b"Subtype")
        .and_then(Object::as_name)
        .map(|s| s == b"Image")
        .unwrap_or(false);
    if !is_image {
        return Err(PixmapError::NotAnImage(xref));
    }

    let image = decode_stream(doc, stream)?;

    if !include_alpha {
        return Ok(image);
    }

    let smask = stream
        .dict
        .get(b"SMask")
        .ok()
        .and_then(|s| resolve(doc, s))
        .and_then(|s| s.as_stream().ok());

    match smask {
        Some(mask_stream) => match decode_stream(doc, mask_stream) {
            Ok(mask) => Ok(apply_soft_mask(image, &mask.to_luma8(), xref)),
            Err(e) => {
                warn!("⚠️ soft mask of {} unreadable: {}", xref, e);
                Ok(image)
            }
        },
        None => Ok(image),
    }
}

fn apply_soft_mask(image: DynamicImage, mask: &GrayImage, xref: Xref) -> DynamicImage {
    if mask.dimensions() != (image.width(), image.height()) {
        debug!(
            "soft mask of {} is {:?}, image is {}x{}; ignoring mask",
            xref,
            mask.dimensions(),
            image.width(),
            image.height()
        );
        return image;
    }

    let rgb = image.to_rgb8();
    let mut rgba = RgbaImage::new(rgb.width(), rgb.height());
    for ((dst, src), alpha) in rgba.pixels_mut().zip(rgb.pixels()).zip(mask.pixels()) {
        dst.0 = [src[0], src[1], src[2], alpha[0]];
    }
    DynamicImage::ImageRgba8(rgba)
}

fn decode_stream(doc: &Document, stream: &Stream) -> Result<DynamicImage, PixmapError> {
    let dict = &stream.dict;
    let width = dict_int(doc, dict, b"Width").unwrap_or(0);
    let height = dict_int(doc, dict, b"Height").unwrap_or(0);
    if width <= 0 || height <= 0 || (width as usize).saturating_mul(height as usize) > MAX_SAMPLES {
        return Err(PixmapError::InvalidDimensions { width, height });
    }
    let (width, height) = (width as u32, height as u32);

    let filters = filter_chain(doc, dict)?;
    if let Some((last, leading)) = filters.split_last() {
        if last.kind == FilterKind::Dct {
            let jpeg = apply_filters(&stream.content, leading)?;
            return image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg)
                .map_err(PixmapError::Decode);
        }
    }
    // other image codecs are rejected by apply_filters
    let data = apply_filters(&stream.content, &filters)?;

    let (color_space, bpc) = if dict_bool(dict, b"ImageMask") {
        (ColorSpace::Gray, 1)
    } else {
        let cs = dict
            .get(b"ColorSpace")
            .map_err(|_| PixmapError::UnsupportedColorSpace("missing".into()))?;
        (
            ColorSpace::parse(doc, cs)?,
            dict_int(doc, dict, b"BitsPerComponent").unwrap_or(8),
        )
    };
    if !matches!(bpc, 1 | 2 | 4 | 8 | 16) {
        return Err(PixmapError::UnsupportedBitDepth(bpc));
    }

    let invert = color_space.components() == 1
        && !matches!(color_space, ColorSpace::Indexed { .. })
        && decode_inverted(doc, dict);

    samples_to_image(&data, width, height, &color_space, bpc as u32, invert)
}

fn sample_at(row: &[u8], index: usize, bpc: u32) -> u16 {
    match bpc {
        8 => row[index] as u16,
        16 => u16::from_be_bytes([row[2 * index], row[2 * index + 1]]),
        _ => {
            let bit = index * bpc as usize;
            let shift = 8 - bpc as usize - (bit % 8);
            ((row[bit / 8] >> shift) & ((1u8 << bpc) - 1)) as u16
        }
    }
}

fn scale_to_u8(sample: u16, bpc: u32) -> u8 {
    match bpc {
        8 => sample as u8,
        16 => (sample >> 8) as u8,
        _ => (sample as u32 * 255 / ((1u32 << bpc) - 1)) as u8,
    }
}

fn samples_to_image(
    data: &[u8],
    width: u32,
    height: u32,
    color_space: &ColorSpace,
    bpc: u32,
    invert: bool,
) -> Result<DynamicImage, PixmapError> {
    let comps = color_space.components();
    let row_samples = width as usize * comps;
    let row_bytes = (row_samples * bpc as usize).div_ceil(8);
    let expected = row_bytes * height as usize;
    if data.len() < expected {
        return Err(PixmapError::TruncatedData {
            expected,
            actual: data.len(),
        });
    }

    // 先展开成 8 位分量（Indexed 保留原始索引）
    let mut samples = Vec::with_capacity(row_samples * height as usize);
    for row in data[..expected].chunks_exact(row_bytes) {
        for i in 0..row_samples {
            let raw = sample_at(row, i, bpc);
            let value = match color_space {
                ColorSpace::Indexed { .. } => raw.min(255) as u8,
                _ => scale_to_u8(raw, bpc),
            };
            samples.push(if invert { 255 - value } else { value });
        }
    }

    let (base, pixels) = match color_space {
        ColorSpace::Indexed {
            base,
            hival,
            lookup,
        } => {
            let n = base.components();
            let mut expanded = Vec::with_capacity(samples.len() * n);
            for &index in &samples {
                let start = (index as usize).min(*hival) * n;
                match lookup.get(start..start + n) {
                    Some(entry) => expanded.extend_from_slice(entry),
                    None => expanded.extend(std::iter::repeat(0).take(n)),
                }
            }
            (base.as_ref(), expanded)
        }
        other => (other, samples),
    };

    build_image(width, height, base, pixels)
}

fn build_image(
    width: u32,
    height: u32,
    color_space: &ColorSpace,
    pixels: Vec<u8>,
) -> Result<DynamicImage, PixmapError> {
    let actual = pixels.len();
    let truncated = || PixmapError::TruncatedData {
        expected: width as usize * height as usize * color_space.components(),
        actual,
    };

    match color_space {
        ColorSpace::Gray => GrayImage::from_raw(width, height, pixels)
            .map(DynamicImage::ImageLuma8)
            .ok_or_else(truncated),
        ColorSpace::Rgb => RgbImage::from_raw(width, height, pixels)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(truncated),
        ColorSpace::Cmyk => RgbImage::from_raw(width, height, cmyk_to_rgb(&pixels))
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(truncated),
        ColorSpace::Indexed { .. } => Err(PixmapError::UnsupportedColorSpace(
            "nested Indexed".into(),
        )),
    }
}

fn cmyk_to_rgb(cmyk: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(cmyk.len() / 4 * 3);
    for chunk in cmyk.chunks_exact(4) {
        let k = 255 - chunk[3] as u32;
        rgb.push(((255 - chunk[0] as u32) * k / 255) as u8);
        rgb.push(((255 - chunk[1] as u32) * k / 255) as u8);
        rgb.push(((255 - chunk[2] as u32) * k / 255) as u8);
    }
    rgb
}
