use serde::{Deserialize, Serialize};

use crate::core::document::{PageLayout, Xref};

/// 单页上的一个图片放置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageRef {
    pub xref: Xref,
    /// Top-left corner of the placement rectangle, page space, y downward.
    pub x: f32,
    pub y: f32,
}

impl ImageRef {
    pub fn new(xref: Xref, x: f32, y: f32) -> Self {
        Self { xref, x, y }
    }
}

/// What to do with an image drawn more than once on the same page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementPolicy {
    /// One `ImageRef` per distinct image, positioned at its first placement.
    #[default]
    FirstPlacement,
    /// One `ImageRef` per placement; the image is extracted once per placement.
    EachPlacement,
}

/// Layout Collector: turn a page layout into unordered `ImageRef`s.
///
/// Images without any placement rectangle cannot be positioned and are left out.
pub fn collect_image_refs(layout: &PageLayout, policy: PlacementPolicy) -> Vec<ImageRef> {
    let mut refs = Vec::with_capacity(layout.images.len());

    for &xref in &layout.images {
        let rects = layout.image_rects(xref);
        match policy {
            PlacementPolicy::FirstPlacement => {
                if let Some(first) = rects.first() {
                    refs.push(ImageRef::new(xref, first.x0, first.y0));
                }
            }
            PlacementPolicy::EachPlacement => {
                refs.extend(rects.iter().map(|r| ImageRef::new(xref, r.x0, r.y0)));
            }
        }
    }

    refs
}
