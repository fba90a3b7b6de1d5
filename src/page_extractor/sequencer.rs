//! 阅读顺序 - 先按行（自上而下），行内从左到右
//!
//! Rows are built greedily over the y-sorted placements. A placement joins the
//! current row when its `y` is strictly within `row_tolerance` of the row's
//! most recently added member, so a row can drift downward a little at a time.

use std::cmp::Ordering;

use super::layout::ImageRef;

/// Images judged to sit on the same visual line.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    members: Vec<ImageRef>,
}

impl Row {
    fn start(first: ImageRef) -> Self {
        Self {
            members: vec![first],
        }
    }

    fn last_y(&self) -> f32 {
        self.members.last().map(|m| m.y).unwrap_or(f32::NAN)
    }

    /// Close the row: members ordered left to right (stable).
    fn finish(mut self) -> Self {
        self.members.sort_by(|a, b| by_coordinate(a.x, b.x));
        self
    }

    pub fn members(&self) -> &[ImageRef] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Smallest `y` in the row.
    pub fn top(&self) -> f32 {
        self.members
            .iter()
            .map(|m| m.y)
            .fold(f32::INFINITY, f32::min)
    }
}

fn by_coordinate(a: f32, b: f32) -> Ordering {
    a.total_cmp(&b)
}

pub struct ReadingOrderSequencer {
    row_tolerance: f32,
}

impl ReadingOrderSequencer {
    /// Negative or NaN tolerances are treated as zero.
    pub fn new(row_tolerance: f32) -> Self {
        Self {
            row_tolerance: row_tolerance.max(0.0),
        }
    }

    pub fn row_tolerance(&self) -> f32 {
        self.row_tolerance
    }

    pub fn group_rows(&self, mut refs: Vec<ImageRef>) -> Vec<Row> {
        if refs.is_empty() {
            return Vec::new();
        }

        // stable: equal y keeps collection order
        refs.sort_by(|a, b| by_coordinate(a.y, b.y));

        let mut rows = Vec::new();
        let mut iter = refs.into_iter();
        let Some(first) = iter.next() else {
            return rows;
        };
        let mut current = Row::start(first);

        for image in iter {
            if (image.y - current.last_y()).abs() < self.row_tolerance {
                current.members.push(image);
            } else {
                rows.push(current.finish());
                current = Row::start(image);
            }
        }
        rows.push(current.finish());

        rows
    }

    /// Flatten the rows into one reading-order sequence.
    pub fn sequence(&self, refs: Vec<ImageRef>) -> Vec<ImageRef> {
        self.group_rows(refs)
            .into_iter()
            .flat_map(|row| row.members)
            .collect()
    }
}
