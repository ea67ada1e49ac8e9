use super::geometry::{Bounds, Extent};
use super::types::{ArrowLayout, BoundsTable, ForkLayout};
use crate::ir::{Document, ShapeKind};

/// Footprint assumed around a zero-size shape (a text anchor) in place of measured text.
const TEXT_HALF_WIDTH: f32 = 60.0;
const TEXT_HALF_HEIGHT: f32 = 12.0;

/// Smallest box covering everything that gets drawn.
///
/// Falls back to the declared canvas when the document is empty.
pub fn content_bounds(
    doc: &Document,
    table: &BoundsTable,
    arrows: &[ArrowLayout],
    forks: &[ForkLayout],
) -> Bounds {
    let mut extent = Extent::empty();

    for shape in doc.shapes() {
        let b = table.get(shape.id);
        if b.is_zero() {
            extent.include_bounds(&Bounds::new(
                b.x - TEXT_HALF_WIDTH,
                b.y - TEXT_HALF_HEIGHT,
                TEXT_HALF_WIDTH * 2.0,
                TEXT_HALF_HEIGHT * 2.0,
            ));
            continue;
        }
        extent.include_bounds(&b);
        match shape.kind {
            // Extruded faces rise above and to the right of the front rectangle.
            ShapeKind::Cuboid => {
                let depth = shape.cuboid_depth();
                extent.include_point((b.right() + depth, b.y - depth));
            }
            ShapeKind::Stack => {
                let (dx, dy) = shape.stack_offset();
                let layers = shape.stack_count().saturating_sub(1) as f32;
                extent.include_bounds(&b.translate(dx * layers, dy * layers));
            }
            _ => {}
        }
    }

    for arrow in arrows {
        extent.include_point(arrow.route.from);
        extent.include_point(arrow.route.to);
        for point in arrow.route.points() {
            extent.include_point(point);
        }
        if let Some(label) = &arrow.label {
            extent.include_bounds(&label.bounds());
        }
    }

    for fork in forks {
        extent.include_point(fork.trunk.0);
        extent.include_point(fork.trunk.1);
        for branch in &fork.branches {
            for point in branch.points() {
                extent.include_point(point);
            }
        }
    }

    extent
        .to_bounds()
        .unwrap_or_else(|| Bounds::new(0.0, 0.0, doc.width, doc.height))
}
