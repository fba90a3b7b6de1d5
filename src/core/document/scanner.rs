//! 内容流扫描 - 计算每个图片 XObject 在页面上的放置矩形
//!
//! Walks a page's content stream keeping the current transformation matrix
//! through `q`/`Q`/`cm`. Every `Do` of an image XObject paints the unit square
//! under the CTM; its bounding box, flipped into top-left page coordinates, is
//! the placement rectangle. Form XObjects are entered recursively.

use std::borrow::Cow;
use std::collections::HashSet;

use log::{debug, warn};
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};

use super::{PageLayout, Rect, Xref};
use crate::core::error::PixmapError;

const MAX_FORM_DEPTH: usize = 32;

/// US Letter, used when a page tree carries no MediaBox at all.
const DEFAULT_PAGE_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// 2D transformation matrix [a, b, c, d, e, f]
/// Represents: | a b 0 |
///             | c d 0 |
///             | e f 1 |
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Matrix {
    pub fn identity() -> Self {
        Matrix {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            e: 0.0,
            f: 0.0,
        }
    }

    /// self * other
    pub fn concat(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    pub fn transform_point(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    fn from_operands(operands: &[Object]) -> Option<Matrix> {
        if operands.len() < 6 {
            return None;
        }
        Some(Matrix {
            a: as_number(&operands[0])?,
            b: as_number(&operands[1])?,
            c: as_number(&operands[2])?,
            d: as_number(&operands[3])?,
            e: as_number(&operands[4])?,
            f: as_number(&operands[5])?,
        })
    }

    /// Bounding box (min_x, min_y, max_x, max_y) of the unit square.
    fn unit_square_bounds(&self) -> (f32, f32, f32, f32) {
        let corners = [
            self.transform_point(0.0, 0.0),
            self.transform_point(1.0, 0.0),
            self.transform_point(0.0, 1.0),
            self.transform_point(1.0, 1.0),
        ];
        corners.iter().fold(
            (f32::MAX, f32::MAX, f32::MIN, f32::MIN),
            |(x0, y0, x1, y1), &(x, y)| (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        )
    }
}

pub(crate) fn as_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(n) => Some(*n as f32),
        Object::Real(n) => Some(*n),
        _ => None,
    }
}

/// Follow indirect references until a direct object is reached.
pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    let mut current = obj;
    for _ in 0..8 {
        match current {
            Object::Reference(id) => current = doc.get_object(*id).ok()?,
            _ => return Some(current),
        }
    }
    None
}

/// Look up a key on the page, walking up `/Parent` for inherited attributes.
fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = doc.get_object(page_id).ok()?.as_dict().ok()?;
    for _ in 0..64 {
        if let Ok(value) = current.get(key) {
            return resolve(doc, value);
        }
        let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = doc.get_object(parent).ok()?.as_dict().ok()?;
    }
    None
}

/// Visible page box in PDF space: CropBox, else MediaBox.
pub fn page_box(doc: &Document, page_id: ObjectId) -> [f32; 4] {
    let read_box = |key: &[u8]| -> Option<[f32; 4]> {
        let arr = inherited(doc, page_id, key)?.as_array().ok()?;
        if arr.len() < 4 {
            return None;
        }
        let n: Vec<f32> = arr
            .iter()
            .take(4)
            .filter_map(|o| resolve(doc, o).and_then(as_number))
            .collect();
        if n.len() < 4 {
            return None;
        }
        Some([n[0].min(n[2]), n[1].min(n[3]), n[0].max(n[2]), n[1].max(n[3])])
    };
    read_box(b"CropBox")
        .or_else(|| read_box(b"MediaBox"))
        .unwrap_or(DEFAULT_PAGE_BOX)
}

fn is_delimiter(byte: u8) -> bool {
    byte.is_ascii_whitespace() || byte == 0 || b"()<>[]{}/%".contains(&byte)
}

/// `token` at `at`, bounded by delimiters or the ends of `content`. A name
/// such as `/BI` is not an operator.
fn is_token_at(content: &[u8], at: usize, token: &[u8]) -> bool {
    content[at..].starts_with(token)
        && (at == 0 || (is_delimiter(content[at - 1]) && content[at - 1] != b'/'))
        && content.get(at + token.len()).map_or(true, |&b| is_delimiter(b))
}

/// Offset just past the `EI` closing an inline image whose `BI` ends at `from`.
fn inline_image_end(content: &[u8], from: usize) -> Option<usize> {
    let id = (from..content.len()).find(|&i| is_token_at(content, i, b"ID"))?;
    // a single whitespace byte separates ID from the sample data
    let data_start = (id + 3).min(content.len());
    (data_start..content.len())
        .find(|&i| {
            content[i..].starts_with(b"EI")
                && i > 0
                && content[i - 1].is_ascii_whitespace()
                && content.get(i + 2).map_or(true, |&b| is_delimiter(b))
        })
        .map(|i| i + 2)
}

/// Replace every `BI … ID … EI` segment with a space. String literals and
/// comments are copied through untouched.
pub(crate) fn strip_inline_images(content: &[u8]) -> Cow<'_, [u8]> {
    if !content.windows(2).any(|w| w == b"BI") {
        return Cow::Borrowed(content);
    }

    let mut out = Vec::with_capacity(content.len());
    let mut i = 0;
    while i < content.len() {
        match content[i] {
            b'(' => {
                let mut depth = 0usize;
                while i < content.len() {
                    let byte = content[i];
                    out.push(byte);
                    i += 1;
                    match byte {
                        b'\\' => {
                            if let Some(&escaped) = content.get(i) {
                                out.push(escaped);
                                i += 1;
                            }
                        }
                        b'(' => depth += 1,
                        b')' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                }
            }
            b'%' => {
                while i < content.len() && content[i] != b'\n' && content[i] != b'\r' {
                    out.push(content[i]);
                    i += 1;
                }
            }
            b'B' if is_token_at(content, i, b"BI") => match inline_image_end(content, i + 2) {
                Some(end) => {
                    out.push(b' ');
                    i = end;
                }
                None => {
                    warn!("⚠️ unterminated inline image, ignoring the rest of the stream");
                    break;
                }
            },
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }

    Cow::Owned(out)
}

fn is_subtype(dict: &Dictionary, subtype: &[u8]) -> bool {
    dict.get(b"Subtype")
        .and_then(Object::as_name)
        .map(|name| name == subtype)
        .unwrap_or(false)
}

pub struct ContentScanner<'a> {
    doc: &'a Document,
    page_box: [f32; 4],
    layout: PageLayout,
    /// Forms currently on the recursion stack.
    active_forms: HashSet<ObjectId>,
}

impl<'a> ContentScanner<'a> {
    pub fn new(doc: &'a Document, page_id: ObjectId) -> Self {
        Self {
            doc,
            page_box: page_box(doc, page_id),
            layout: PageLayout::new(),
            active_forms: HashSet::new(),
        }
    }

    /// Scan one page and return its image layout.
    pub fn scan_page(doc: &'a Document, page_id: ObjectId) -> Result<PageLayout, PixmapError> {
        let mut scanner = Self::new(doc, page_id);
        let resources = inherited(doc, page_id, b"Resources").and_then(|r| r.as_dict().ok());

        // 先按资源字典顺序登记页面直接引用的图片
        if let Some(resources) = resources {
            scanner.register_resource_images(resources);
        }

        let content = doc
            .get_page_content(page_id)
            .map_err(|e| PixmapError::Layout(e.to_string()))?;
        scanner.scan_content(&content, resources, Matrix::identity(), 0)?;

        debug!(
            "page {:?}: {} images, {} placements",
            page_id,
            scanner.layout.images.len(),
            scanner.layout.rects.values().map(Vec::len).sum::<usize>()
        );
        Ok(scanner.layout)
    }

    fn register_resource_images(&mut self, resources: &'a Dictionary) {
        let Some(xobjects) = self.xobject_dict(resources) else {
            return;
        };
        for (_, value) in xobjects.iter() {
            if let Object::Reference(id) = value {
                if let Ok(Object::Stream(stream)) = self.doc.get_object(*id) {
                    if is_subtype(&stream.dict, b"Image") {
                        self.layout.add_image(Xref(*id));
                    }
                }
            }
        }
    }

    fn xobject_dict(&self, resources: &'a Dictionary) -> Option<&'a Dictionary> {
        let xobjects = resources.get(b"XObject").ok()?;
        resolve(self.doc, xobjects)?.as_dict().ok()
    }

    fn scan_content(
        &mut self,
        content: &[u8],
        resources: Option<&'a Dictionary>,
        initial: Matrix,
        depth: usize,
    ) -> Result<(), PixmapError> {
        // lopdf stops decoding at the first inline image
        let content = Content::decode(&strip_inline_images(content))
            .map_err(|e| PixmapError::Layout(e.to_string()))?;
        let xobjects = resources.and_then(|r| self.xobject_dict(r));

        let mut stack: Vec<Matrix> = vec![initial];

        for op in &content.operations {
            match op.operator.as_str() {
                "q" => {
                    let current = stack.last().copied().unwrap_or(initial);
                    stack.push(current);
                }
                "Q" => {
                    if stack.len() > 1 {
                        stack.pop();
                    }
                }
                "cm" => {
                    if let Some(m) = Matrix::from_operands(&op.operands) {
                        if let Some(ctm) = stack.last_mut() {
                            *ctm = m.concat(ctm);
                        }
                    }
                }
                "Do" => {
                    let Some(name) = op.operands.first().and_then(|o| o.as_name().ok()) else {
                        continue;
                    };
                    let Some(Ok(Object::Reference(id))) = xobjects.map(|x| x.get(name)) else {
                        continue;
                    };
                    let ctm = stack.last().copied().unwrap_or(initial);
                    self.paint_xobject(*id, ctm, resources, depth);
                }
                _ => {}
            }
        }

        Ok(())
    }

    fn paint_xobject(
        &mut self,
        id: ObjectId,
        ctm: Matrix,
        parent_resources: Option<&'a Dictionary>,
        depth: usize,
    ) {
        let Ok(Object::Stream(stream)) = self.doc.get_object(id) else {
            return;
        };

        if is_subtype(&stream.dict, b"Image") {
            let rect = self.to_page_rect(&ctm);
            self.layout.add_placement(Xref(id), rect);
            return;
        }

        if !is_subtype(&stream.dict, b"Form") {
            return;
        }
        if depth >= MAX_FORM_DEPTH || !self.active_forms.insert(id) {
            warn!("⚠️ skipping recursive form XObject {:?}", id);
            return;
        }

        let form_matrix = stream
            .dict
            .get(b"Matrix")
            .ok()
            .and_then(|m| m.as_array().ok())
            .and_then(|arr| Matrix::from_operands(arr))
            .unwrap_or_else(Matrix::identity);
        let resources = stream
            .dict
            .get(b"Resources")
            .ok()
            .and_then(|r| resolve(self.doc, r))
            .and_then(|r| r.as_dict().ok())
            .or(parent_resources);

        let content = if stream.dict.get(b"Filter").is_ok() {
            stream.decompressed_content()
        } else {
            Ok(stream.content.clone())
        };

        match content {
            Ok(content) => {
                if let Err(e) =
                    self.scan_content(&content, resources, form_matrix.concat(&ctm), depth + 1)
                {
                    warn!("⚠️ form XObject {:?} unreadable: {}", id, e);
                }
            }
            Err(e) => warn!("⚠️ form XObject {:?} undecodable: {}", id, e),
        }

        self.active_forms.remove(&id);
    }

    fn to_page_rect(&self, ctm: &Matrix) -> Rect {
        let (min_x, min_y, max_x, max_y) = ctm.unit_square_bounds();
        let [bx0, _, _, by1] = self.page_box;
        Rect::new(min_x - bx0, by1 - max_y, max_x - bx0, by1 - min_y)
    }
}
