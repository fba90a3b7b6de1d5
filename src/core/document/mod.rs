//! 文档模型 - 页面上的图片引用、放置矩形与像素解码
//!
//! The extraction pipeline never talks to `lopdf` directly; it goes through
//! [`ImageSource`] so that page layouts and pixel data can come from a real
//! PDF ([`PdfDocument`]) or from memory ([`MockImageSource`]).

pub mod filters;
pub mod pdf;
pub mod pixmap;
pub mod scanner;

use std::collections::HashMap;
use std::fmt;

use image::DynamicImage;
use lopdf::ObjectId;

use super::error::PixmapError;

pub use pdf::PdfDocument;

/// Opaque reference to one embedded image resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Xref(pub ObjectId);

impl Xref {
    pub fn new(number: u32, generation: u16) -> Self {
        Self((number, generation))
    }

    pub fn number(&self) -> u32 {
        self.0 .0
    }
}

impl fmt::Display for Xref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} R", self.0 .0, self.0 .1)
    }
}

/// Axis-aligned rectangle in page space, origin top-left, y growing downward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }
}

/// Images drawn on one page and where they were drawn.
#[derive(Debug, Clone, Default)]
pub struct PageLayout {
    /// Distinct image xrefs: page resource images in resource order, then
    /// images reached only through forms, in the order first drawn.
    pub images: Vec<Xref>,
    /// Every placement rectangle per xref, in draw order.
    pub rects: HashMap<Xref, Vec<Rect>>,
}

impl PageLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one placement; the first placement of an xref registers it.
    pub fn add_placement(&mut self, xref: Xref, rect: Rect) {
        let rects = self.rects.entry(xref).or_default();
        if rects.is_empty() && !self.images.contains(&xref) {
            self.images.push(xref);
        }
        rects.push(rect);
    }

    /// Register an image that the page references but may never draw.
    pub fn add_image(&mut self, xref: Xref) {
        if !self.images.contains(&xref) {
            self.images.push(xref);
        }
    }

    pub fn image_rects(&self, xref: Xref) -> &[Rect] {
        self.rects.get(&xref).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Read-only access to a paginated document's images.
pub trait ImageSource: Sync {
    fn page_count(&self) -> usize;

    /// Layout of the page at `page_index` (0-based).
    fn page_layout(&self, page_index: usize) -> Result<PageLayout, PixmapError>;

    /// Decode the pixel data behind `xref`.
    fn load_image(&self, xref: Xref) -> Result<DynamicImage, PixmapError>;
}

/// In-memory document: fixed layouts and pre-decoded images.
#[derive(Default)]
pub struct MockImageSource {
    pages: Vec<PageLayout>,
    images: HashMap<Xref, DynamicImage>,
}

impl MockImageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, layout: PageLayout) -> Self {
        self.pages.push(layout);
        self
    }

    pub fn with_image(mut self, xref: Xref, image: DynamicImage) -> Self {
        self.images.insert(xref, image);
        self
    }
}

impl ImageSource for MockImageSource {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_layout(&self, page_index: usize) -> Result<PageLayout, PixmapError> {
        self.pages
            .get(page_index)
            .cloned()
            .ok_or_else(|| PixmapError::Layout(format!("page {} out of range", page_index)))
    }

    fn load_image(&self, xref: Xref) -> Result<DynamicImage, PixmapError> {
        self.images
            .get(&xref)
            .cloned()
            .ok_or(PixmapError::MissingObject(xref))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_keeps_first_draw_order() {
        let mut layout = PageLayout::new();
        layout.add_placement(Xref::new(9, 0), Rect::new(0.0, 50.0, 10.0, 60.0));
        layout.add_placement(Xref::new(3, 0), Rect::new(0.0, 10.0, 10.0, 20.0));
        layout.add_placement(Xref::new(9, 0), Rect::new(20.0, 5.0, 30.0, 15.0));

        assert_eq!(layout.images, vec![Xref::new(9, 0), Xref::new(3, 0)]);
        assert_eq!(layout.image_rects(Xref::new(9, 0)).len(), 2);
        assert!(layout.image_rects(Xref::new(42, 0)).is_empty());
    }

    #[test]
    fn test_unplaced_image_has_no_rects() {
        let mut layout = PageLayout::new();
        layout.add_image(Xref::new(1, 0));
        layout.add_placement(Xref::new(1, 0), Rect::new(0.0, 0.0, 1.0, 1.0));

        assert_eq!(layout.images.len(), 1);
        assert_eq!(layout.image_rects(Xref::new(1, 0)).len(), 1);
    }

    #[test]
    fn test_mock_source_missing_image() {
        let source = MockImageSource::new().with_page(PageLayout::new());
        assert_eq!(source.page_count(), 1);
        assert!(matches!(
            source.load_image(Xref::new(5, 0)),
            Err(PixmapError::MissingObject(_))
        ));
        assert!(source.page_layout(3).is_err());
    }

    #[test]
    fn test_rect_size() {
        let rect = Rect::new(10.0, 20.0, 110.0, 70.0);
        assert_eq!(rect.width(), 100.0);
        assert_eq!(rect.height(), 50.0);
        assert_eq!(Xref::new(12, 0).to_string(), "12 0 R");
    }
}
