// Row / column / grid placement. Arrangers write declared positions, so they
// run while the document is being built, before any layout pass.

use super::geometry::{PosValue, round2};
use crate::ir::{Document, ShapeId};

pub const DEFAULT_GAP: f32 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridOptions {
    pub cols: usize,
    pub col_gap: f32,
    pub row_gap: f32,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            cols: 3,
            col_gap: DEFAULT_GAP,
            row_gap: DEFAULT_GAP,
        }
    }
}

impl GridOptions {
    pub fn new(cols: usize, gap: f32) -> Self {
        Self {
            cols,
            col_gap: gap,
            row_gap: gap,
        }
    }
}

/// Pixel footprint of a shape regardless of whether it is placed by center or corner.
pub fn effective_size(doc: &Document, id: ShapeId) -> (f32, f32) {
    let shape = doc.shape(id);
    if shape.kind.is_centered() {
        let d = shape.circle_radius() * 2.0;
        return (d, d);
    }
    match shape.config.size {
        Some([w, h]) => (w.resolve(doc.width), h.resolve(doc.height)),
        None => (100.0, 60.0),
    }
}

/// Stores the top-left corner of the cell a shape occupies as its declared position.
fn place(doc: &mut Document, id: ShapeId, x: f32, y: f32, size: (f32, f32)) {
    let centered = doc.shape(id).kind.is_centered();
    let (px, py) = if centered {
        (x + size.0 / 2.0, y + size.1 / 2.0)
    } else {
        (x, y)
    };
    doc.shape_mut(id).config.pos = Some([PosValue::Px(round2(px)), PosValue::Px(round2(py))]);
}

/// Left to right with a uniform gap, centered on the canvas, each shape
/// vertically centered against the tallest one.
pub fn row(doc: &mut Document, ids: &[ShapeId], gap: f32) {
    if ids.is_empty() {
        return;
    }
    let sizes: Vec<(f32, f32)> = ids.iter().map(|id| effective_size(doc, *id)).collect();
    let total_w: f32 = sizes.iter().map(|s| s.0).sum::<f32>() + gap * (ids.len() - 1) as f32;
    let max_h = sizes.iter().map(|s| s.1).fold(0.0, f32::max);
    let base_y = (doc.height - max_h) / 2.0;
    let mut x = (doc.width - total_w) / 2.0;
    for (id, size) in ids.iter().zip(&sizes) {
        place(doc, *id, x, base_y + (max_h - size.1) / 2.0, *size);
        x += size.0 + gap;
    }
}

/// Top to bottom; the vertical counterpart of [`row`].
pub fn column(doc: &mut Document, ids: &[ShapeId], gap: f32) {
    if ids.is_empty() {
        return;
    }
    let sizes: Vec<(f32, f32)> = ids.iter().map(|id| effective_size(doc, *id)).collect();
    let total_h: f32 = sizes.iter().map(|s| s.1).sum::<f32>() + gap * (ids.len() - 1) as f32;
    let max_w = sizes.iter().map(|s| s.0).fold(0.0, f32::max);
    let base_x = (doc.width - max_w) / 2.0;
    let mut y = (doc.height - total_h) / 2.0;
    for (id, size) in ids.iter().zip(&sizes) {
        place(doc, *id, base_x + (max_w - size.0) / 2.0, y, *size);
        y += size.1 + gap;
    }
}

/// Row-major cells; each column is as wide as its widest member and each row as tall as its tallest.
pub fn grid(doc: &mut Document, ids: &[ShapeId], options: GridOptions) {
    if ids.is_empty() {
        return;
    }
    let cols = options.cols.clamp(1, ids.len());
    let rows = ids.len().div_ceil(cols);
    let sizes: Vec<(f32, f32)> = ids.iter().map(|id| effective_size(doc, *id)).collect();

    let mut col_widths = vec![0.0f32; cols];
    let mut row_heights = vec![0.0f32; rows];
    for (i, (w, h)) in sizes.iter().enumerate() {
        col_widths[i % cols] = col_widths[i % cols].max(*w);
        row_heights[i / cols] = row_heights[i / cols].max(*h);
    }

    let total_w = col_widths.iter().sum::<f32>() + options.col_gap * (cols - 1) as f32;
    let total_h = row_heights.iter().sum::<f32>() + options.row_gap * (rows - 1) as f32;
    let start_x = (doc.width - total_w) / 2.0;
    let start_y = (doc.height - total_h) / 2.0;

    for (i, (id, size)) in ids.iter().zip(&sizes).enumerate() {
        let (ri, ci) = (i / cols, i % cols);
        let cell_x = start_x
            + col_widths[..ci]
                .iter()
                .map(|w| w + options.col_gap)
                .sum::<f32>();
        let cell_y = start_y
            + row_heights[..ri]
                .iter()
                .map(|h| h + options.row_gap)
                .sum::<f32>();
        place(
            doc,
            *id,
            cell_x + (col_widths[ci] - size.0) / 2.0,
            cell_y + (row_heights[ri] - size.1) / 2.0,
            *size,
        );
    }
}
