//! 流过滤器 - 图片流解压与预测器还原
//!
//! `lopdf` will not decompress streams whose subtype is `/Image`, so image
//! samples, soft masks and palette streams are unfiltered here. Image codecs
//! (DCT, JPX, JBIG2, CCITT) are not unfiltered; the caller decides what to do
//! with them.

use std::io::Read;

use flate2::read::ZlibDecoder;
use log::debug;
use lopdf::{Dictionary, Document, Object};
use weezl::decode::Decoder as LzwDecoder;
use weezl::BitOrder;

use super::scanner::{as_number, resolve};
use crate::core::error::PixmapError;

/// Cap on the output of one filter (1 GiB).
const MAX_DECODED_BYTES: u64 = 1 << 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Flate,
    Lzw,
    AsciiHex,
    Ascii85,
    RunLength,
    Dct,
    Jpx,
    Jbig2,
    Ccitt,
}

impl FilterKind {
    fn from_name(name: &[u8]) -> Result<Self, PixmapError> {
        match name {
            b"FlateDecode" | b"Fl" => Ok(FilterKind::Flate),
            b"LZWDecode" | b"LZW" => Ok(FilterKind::Lzw),
            b"ASCIIHexDecode" | b"AHx" => Ok(FilterKind::AsciiHex),
            b"ASCII85Decode" | b"A85" => Ok(FilterKind::Ascii85),
            b"RunLengthDecode" | b"RL" => Ok(FilterKind::RunLength),
            b"DCTDecode" | b"DCT" => Ok(FilterKind::Dct),
            b"JPXDecode" => Ok(FilterKind::Jpx),
            b"JBIG2Decode" => Ok(FilterKind::Jbig2),
            b"CCITTFaxDecode" | b"CCF" => Ok(FilterKind::Ccitt),
            other => Err(PixmapError::UnsupportedFilter(
                String::from_utf8_lossy(other).into_owned(),
            )),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FilterKind::Flate => "FlateDecode",
            FilterKind::Lzw => "LZWDecode",
            FilterKind::AsciiHex => "ASCIIHexDecode",
            FilterKind::Ascii85 => "ASCII85Decode",
            FilterKind::RunLength => "RunLengthDecode",
            FilterKind::Dct => "DCTDecode",
            FilterKind::Jpx => "JPXDecode",
            FilterKind::Jbig2 => "JBIG2Decode",
            FilterKind::Ccitt => "CCITTFaxDecode",
        }
    }
}

/// `/DecodeParms` predictor settings for Flate and LZW.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Predictor {
    pub predictor: i64,
    pub colors: usize,
    pub bits_per_component: usize,
    pub columns: usize,
}

impl Default for Predictor {
    fn default() -> Self {
        Self {
            predictor: 1,
            colors: 1,
            bits_per_component: 8,
            columns: 1,
        }
    }
}

impl Predictor {
    fn from_params(doc: &Document, params: Option<&Dictionary>) -> Self {
        let Some(params) = params else {
            return Self::default();
        };
        let int = |key: &[u8], default: i64| {
            params
                .get(key)
                .ok()
                .and_then(|v| resolve(doc, v))
                .and_then(as_number)
                .map(|v| v as i64)
                .unwrap_or(default)
        };
        Self {
            predictor: int(b"Predictor", 1),
            colors: int(b"Colors", 1).max(1) as usize,
            bits_per_component: int(b"BitsPerComponent", 8).max(1) as usize,
            columns: int(b"Columns", 1).max(1) as usize,
        }
    }

    /// Bytes per decoded row.
    fn row_bytes(&self) -> usize {
        (self.colors * self.bits_per_component * self.columns).div_ceil(8)
    }

    /// Bytes per complete pixel, at least one.
    fn pixel_bytes(&self) -> usize {
        (self.colors * self.bits_per_component / 8).max(1)
    }

    pub fn apply(&self, data: Vec<u8>) -> Result<Vec<u8>, PixmapError> {
        match self.predictor {
            2 => self.undo_tiff(data),
            10..=15 => self.undo_png(&data),
            _ => Ok(data),
        }
    }

    fn undo_tiff(&self, mut data: Vec<u8>) -> Result<Vec<u8>, PixmapError> {
        let row_bytes = self.row_bytes();
        match self.bits_per_component {
            8 => {
                let bpp = self.colors;
                for row in data.chunks_mut(row_bytes) {
                    for i in bpp..row.len() {
                        row[i] = row[i].wrapping_add(row[i - bpp]);
                    }
                }
            }
            16 => {
                let bpp = self.colors * 2;
                for row in data.chunks_mut(row_bytes) {
                    let mut i = bpp;
                    while i + 1 < row.len() {
                        let left = u16::from_be_bytes([row[i - bpp], row[i - bpp + 1]]);
                        let value = u16::from_be_bytes([row[i], row[i + 1]]).wrapping_add(left);
                        row[i..i + 2].copy_from_slice(&value.to_be_bytes());
                        i += 2;
                    }
                }
            }
            other => {
                return Err(PixmapError::Stream(format!(
                    "TIFF predictor with {} bits per component",
                    other
                )))
            }
        }
        Ok(data)
    }

    /// Each row carries a leading PNG filter-type byte, regardless of which
    /// of 10..=15 was declared. A trailing partial row is dropped.
    fn undo_png(&self, data: &[u8]) -> Result<Vec<u8>, PixmapError> {
        let row_bytes = self.row_bytes();
        let bpp = self.pixel_bytes();
        let mut out = Vec::with_capacity(data.len());
        let mut prev = vec![0u8; row_bytes];

        for chunk in data.chunks_exact(row_bytes + 1) {
            let (kind, encoded) = (chunk[0], &chunk[1..]);
            let mut row = vec![0u8; row_bytes];

            for i in 0..row_bytes {
                let left = if i >= bpp { row[i - bpp] } else { 0 };
                let above = prev[i];
                let upper_left = if i >= bpp { prev[i - bpp] } else { 0 };
                let base = match kind {
                    0 => 0,
                    1 => left,
                    2 => above,
                    3 => ((left as u16 + above as u16) / 2) as u8,
                    4 => paeth(left, above, upper_left),
                    other => {
                        return Err(PixmapError::Stream(format!(
                            "invalid PNG row filter {}",
                            other
                        )))
                    }
                };
                row[i] = encoded[i].wrapping_add(base);
            }

            out.extend_from_slice(&row);
            prev = row;
        }

        Ok(out)
    }
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i32 + b as i32 - c as i32;
    let pa = (p - a as i32).abs();
    let pb = (p - b as i32).abs();
    let pc = (p - c as i32).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

/// One entry of a stream's `/Filter` chain with its `/DecodeParms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Filter {
    pub kind: FilterKind,
    pub predictor: Predictor,
    /// LZW `/EarlyChange`, default on.
    pub early_change: bool,
}

impl Filter {
    pub fn new(kind: FilterKind) -> Self {
        Self {
            kind,
            predictor: Predictor::default(),
            early_change: true,
        }
    }

    pub fn with_predictor(mut self, predictor: Predictor) -> Self {
        self.predictor = predictor;
        self
    }
}

/// Read `/Filter` and `/DecodeParms` (single entries or parallel arrays).
pub fn filter_chain(doc: &Document, dict: &Dictionary) -> Result<Vec<Filter>, PixmapError> {
    let Some(filter) = dict.get(b"Filter").ok().and_then(|f| resolve(doc, f)) else {
        return Ok(Vec::new());
    };
    let names: Vec<&[u8]> = match filter {
        Object::Name(n) => vec![n.as_slice()],
        Object::Array(arr) => arr
            .iter()
            .filter_map(|f| resolve(doc, f))
            .filter_map(|f| f.as_name().ok())
            .collect(),
        _ => Vec::new(),
    };

    let params: Vec<Option<&Dictionary>> = match dict
        .get(b"DecodeParms")
        .or_else(|_| dict.get(b"DP"))
        .ok()
        .and_then(|p| resolve(doc, p))
    {
        Some(Object::Dictionary(d)) => vec![Some(d)],
        Some(Object::Array(arr)) => arr
            .iter()
            .map(|p| resolve(doc, p).and_then(|p| p.as_dict().ok()))
            .collect(),
        _ => Vec::new(),
    };

    names
        .into_iter()
        .enumerate()
        .map(|(index, name)| {
            let params = params.get(index).copied().flatten();
            let early_change = params
                .and_then(|p| p.get(b"EarlyChange").ok())
                .and_then(as_number)
                .map(|v| v != 0.0)
                .unwrap_or(true);
            Ok(Filter {
                kind: FilterKind::from_name(name)?,
                predictor: Predictor::from_params(doc, params),
                early_change,
            })
        })
        .collect()
}

/// Run `content` through `filters` in order. Image codecs are rejected.
pub fn apply_filters(content: &[u8], filters: &[Filter]) -> Result<Vec<u8>, PixmapError> {
    let mut data = content.to_vec();
    for filter in filters {
        data = match filter.kind {
            FilterKind::Flate => filter.predictor.apply(flate_decode(&data)?)?,
            FilterKind::Lzw => filter
                .predictor
                .apply(lzw_decode(&data, filter.early_change)?)?,
            FilterKind::AsciiHex => ascii_hex_decode(&data)?,
            FilterKind::Ascii85 => ascii85_decode(&data)?,
            FilterKind::RunLength => run_length_decode(&data),
            codec => return Err(PixmapError::UnsupportedFilter(codec.name().to_string())),
        };
    }
    Ok(data)
}

fn flate_decode(data: &[u8]) -> Result<Vec<u8>, PixmapError> {
    let mut out = Vec::new();
    let result = ZlibDecoder::new(data)
        .take(MAX_DECODED_BYTES)
        .read_to_end(&mut out);
    match result {
        Ok(_) => Ok(out),
        // truncated or checksum-damaged streams still yield usable samples
        Err(e) if !out.is_empty() => {
            debug!("FlateDecode stopped early after {} bytes: {}", out.len(), e);
            Ok(out)
        }
        Err(e) => Err(PixmapError::Stream(format!("FlateDecode: {}", e))),
    }
}

fn lzw_decode(data: &[u8], early_change: bool) -> Result<Vec<u8>, PixmapError> {
    let mut decoder = if early_change {
        LzwDecoder::with_tiff_size_switch(BitOrder::Msb, 8)
    } else {
        LzwDecoder::new(BitOrder::Msb, 8)
    };
    let mut out = Vec::new();
    let result = decoder.into_vec(&mut out).decode(data);
    match result.status {
        Ok(_) => Ok(out),
        Err(e) if !out.is_empty() => {
            debug!("LZWDecode stopped early after {} bytes: {}", out.len(), e);
            Ok(out)
        }
        Err(e) => Err(PixmapError::Stream(format!("LZWDecode: {}", e))),
    }
}

fn ascii_hex_decode(data: &[u8]) -> Result<Vec<u8>, PixmapError> {
    let mut out = Vec::with_capacity(data.len() / 2);
    let mut high: Option<u8> = None;
    for &byte in data {
        if byte == b'>' {
            break;
        }
        if byte.is_ascii_whitespace() || byte == 0 {
            continue;
        }
        let nibble = (byte as char)
            .to_digit(16)
            .ok_or_else(|| PixmapError::Stream(format!("ASCIIHexDecode: bad byte {:#04x}", byte)))?
            as u8;
        match high.take() {
            Some(h) => out.push(h << 4 | nibble),
            None => high = Some(nibble),
        }
    }
    if let Some(h) = high {
        out.push(h << 4);
    }
    Ok(out)
}

fn ascii85_decode(data: &[u8]) -> Result<Vec<u8>, PixmapError> {
    let mut out = Vec::with_capacity(data.len() * 4 / 5);
    let mut group = [0u8; 5];
    let mut len = 0;

    let body = data.strip_prefix(b"<~").unwrap_or(data);
    for &byte in body {
        match byte {
            b'~' => break,
            b'z' if len == 0 => out.extend_from_slice(&[0; 4]),
            b'!'..=b'u' => {
                group[len] = byte - b'!';
                len += 1;
                if len == 5 {
                    out.extend_from_slice(&ascii85_word(&group)?.to_be_bytes());
                    len = 0;
                }
            }
            b if b.is_ascii_whitespace() || b == 0 => {}
            other => {
                return Err(PixmapError::Stream(format!(
                    "ASCII85Decode: bad byte {:#04x}",
                    other
                )))
            }
        }
    }

    if len == 1 {
        return Err(PixmapError::Stream("ASCII85Decode: dangling byte".into()));
    }
    if len > 1 {
        group[len..].fill(b'u' - b'!');
        let word = ascii85_word(&group)?.to_be_bytes();
        out.extend_from_slice(&word[..len - 1]);
    }
    Ok(out)
}

fn ascii85_word(group: &[u8; 5]) -> Result<u32, PixmapError> {
    group
        .iter()
        .try_fold(0u32, |acc, &digit| {
            acc.checked_mul(85)?.checked_add(digit as u32)
        })
        .ok_or_else(|| PixmapError::Stream("ASCII85Decode: group overflow".into()))
}

fn run_length_decode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        let length = data[i] as usize;
        i += 1;
        match length {
            0..=127 => {
                let end = (i + length + 1).min(data.len());
                out.extend_from_slice(&data[i..end]);
                i = end;
            }
            128 => break,
            _ => {
                if let Some(&byte) = data.get(i) {
                    out.extend(std::iter::repeat(byte).take(257 - length));
                }
                i += 1;
            }
        }
    }
    out
}
