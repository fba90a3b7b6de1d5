//! `lopdf`-backed document

use std::path::Path;

use image::DynamicImage;
use log::info;
use lopdf::{Document, ObjectId};

use super::pixmap::decode_xobject;
use super::scanner::ContentScanner;
use super::{ImageSource, PageLayout, Xref};
use crate::core::error::{ExtractError, PixmapError};

/// PDF 文档（只读）
pub struct PdfDocument {
    doc: Document,
    page_ids: Vec<ObjectId>,
    include_alpha: bool,
}

impl PdfDocument {
    pub fn open_bytes(bytes: &[u8]) -> Result<Self, ExtractError> {
        Self::from_document(Document::load_mem(bytes)?)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ExtractError> {
        let path = path.as_ref();
        info!("📄 Opening PDF: {}", path.display());
        let bytes = std::fs::read(path)?;
        Self::open_bytes(&bytes)
    }

    pub fn from_document(doc: Document) -> Result<Self, ExtractError> {
        // get_pages() is keyed by 1-based page number, so values come out in page order
        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
        if page_ids.is_empty() {
            return Err(ExtractError::NoPages);
        }
        info!("📊 PDF loaded: {} pages", page_ids.len());
        Ok(Self {
            doc,
            page_ids,
            include_alpha: false,
        })
    }

    /// Merge soft masks into an alpha channel when decoding.
    pub fn with_alpha(mut self, include_alpha: bool) -> Self {
        self.include_alpha = include_alpha;
        self
    }
}

impl ImageSource for PdfDocument {
    fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    fn page_layout(&self, page_index: usize) -> Result<PageLayout, PixmapError> {
        let page_id = *self
            .page_ids
            .get(page_index)
            .ok_or_else(|| PixmapError::Layout(format!("page {} out of range", page_index)))?;
        ContentScanner::scan_page(&self.doc, page_id)
    }

    fn load_image(&self, xref: Xref) -> Result<DynamicImage, PixmapError> {
        decode_xobject(&self.doc, xref, self.include_alpha)
    }
}
