// Shape-aware anchor resolution, nearest-anchor matching and endpoint straightening.

use std::f32::consts::PI;

use super::geometry::{Bounds, Point, distance};
use super::types::BoundsTable;
use crate::ir::{AnchorSpec, ArrowConfig, Document, PathKind, Shape, ShapeId, ShapeKind, Side};

/// Endpoints closer than this on one axis (and at least this far apart on the other) are snapped level.
pub const STRAIGHTEN_THRESHOLD: f32 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Endpoints {
    pub from: Point,
    pub to: Point,
    pub from_side: Side,
    pub to_side: Side,
}

/// Point on the visual boundary of `shape` for `side` at fraction `at` (0 = start, 1 = end of the side).
pub fn anchor_point(shape: &Shape, bounds: &Bounds, side: Side, at: f32) -> Point {
    match shape.kind {
        ShapeKind::Trapezoid => trapezoid_anchor(bounds, shape.top_ratio(), side, at),
        ShapeKind::Cylinder => cylinder_anchor(bounds, shape.cylinder_depth(), side, at),
        _ => box_anchor(bounds, side, at),
    }
}

fn box_anchor(b: &Bounds, side: Side, at: f32) -> Point {
    match side {
        Side::Top => (b.x + b.width * at, b.y),
        Side::Bottom => (b.x + b.width * at, b.bottom()),
        Side::Left => (b.x, b.y + b.height * at),
        Side::Right => (b.right(), b.y + b.height * at),
    }
}

fn trapezoid_anchor(b: &Bounds, top_ratio: f32, side: Side, at: f32) -> Point {
    let inset = b.width * (1.0 - top_ratio) / 2.0;
    match side {
        Side::Top => (b.x + inset + (b.width - 2.0 * inset) * at, b.y),
        Side::Bottom => (b.x + b.width * at, b.bottom()),
        // Slanted sides run from the inset top corner down to the full-width bottom corner.
        Side::Left => (b.x + inset * (1.0 - at), b.y + b.height * at),
        Side::Right => (b.right() - inset * (1.0 - at), b.y + b.height * at),
    }
}

fn cylinder_anchor(b: &Bounds, depth_ratio: f32, side: Side, at: f32) -> Point {
    let ry = b.height * depth_ratio;
    let rx = b.width / 2.0;
    let cx = b.x + rx;
    let top_cy = b.y + ry;
    let bottom_cy = b.bottom() - ry;
    match side {
        Side::Top => {
            // at = 0 is the left rim, 0.5 the highest point of the cap, 1 the right rim.
            let angle = PI * (1.0 - at);
            (cx + rx * angle.cos(), top_cy - ry * angle.sin())
        }
        Side::Bottom => {
            let angle = PI * at;
            (cx - rx * angle.cos(), bottom_cy + ry * angle.sin())
        }
        Side::Left => (b.x, top_cy + (bottom_cy - top_cy) * at),
        Side::Right => (b.right(), top_cy + (bottom_cy - top_cy) * at),
    }
}

/// Closest pair of side midpoints between two shapes, straightened as a straight connector.
pub fn auto_snap(
    source: &Shape,
    source_bounds: &Bounds,
    target: &Shape,
    target_bounds: &Bounds,
) -> Endpoints {
    let mut best = Endpoints {
        from: (0.0, 0.0),
        to: (0.0, 0.0),
        from_side: Side::Right,
        to_side: Side::Left,
    };
    let mut min_dist = f32::INFINITY;
    for from_side in Side::ALL {
        let from = anchor_point(source, source_bounds, from_side, 0.5);
        for to_side in Side::ALL {
            let to = anchor_point(target, target_bounds, to_side, 0.5);
            let d = distance(from, to);
            if d < min_dist {
                min_dist = d;
                best = Endpoints {
                    from,
                    to,
                    from_side,
                    to_side,
                };
            }
        }
    }
    let (from, to) = straighten(best.from, best.to, PathKind::Straight);
    Endpoints { from, to, ..best }
}

/// Side midpoint of `shape` closest to `point`; ties keep the earlier side in [`Side::ALL`].
pub fn nearest_anchor(shape: &Shape, bounds: &Bounds, point: Point) -> (Point, Side) {
    let mut best = (anchor_point(shape, bounds, Side::Top, 0.5), Side::Top);
    let mut min_dist = f32::INFINITY;
    for side in Side::ALL {
        let candidate = anchor_point(shape, bounds, side, 0.5);
        let d = distance(candidate, point);
        if d < min_dist {
            min_dist = d;
            best = (candidate, side);
        }
    }
    best
}

/// Snaps near-level endpoints onto their shared average. Curves are left alone.
pub fn straighten(from: Point, to: Point, path: PathKind) -> (Point, Point) {
    if path == PathKind::Curve {
        return (from, to);
    }
    let dx = (from.0 - to.0).abs();
    let dy = (from.1 - to.1).abs();
    if dx < STRAIGHTEN_THRESHOLD && dy >= STRAIGHTEN_THRESHOLD {
        let avg_x = (from.0 + to.0) / 2.0;
        return ((avg_x, from.1), (avg_x, to.1));
    }
    if dy < STRAIGHTEN_THRESHOLD && dx >= STRAIGHTEN_THRESHOLD {
        let avg_y = (from.1 + to.1) / 2.0;
        return ((from.0, avg_y), (to.0, avg_y));
    }
    (from, to)
}

/// Resolves a connector's endpoints from explicit, half-specified or missing anchors.
pub fn resolve_endpoints(
    doc: &Document,
    bounds: &BoundsTable,
    source: ShapeId,
    target: ShapeId,
    config: &ArrowConfig,
) -> Endpoints {
    let src = doc.shape(source);
    let tgt = doc.shape(target);
    let src_box = bounds.get(source);
    let tgt_box = bounds.get(target);
    let resolved = match (config.from, config.to) {
        (Some(from), Some(to)) => Endpoints {
            from: spec_point(src, &src_box, from),
            to: spec_point(tgt, &tgt_box, to),
            from_side: from.side,
            to_side: to.side,
        },
        (Some(from), None) => {
            let from_pt = spec_point(src, &src_box, from);
            let (to_pt, to_side) = nearest_anchor(tgt, &tgt_box, from_pt);
            Endpoints {
                from: from_pt,
                to: to_pt,
                from_side: from.side,
                to_side,
            }
        }
        (None, Some(to)) => {
            let to_pt = spec_point(tgt, &tgt_box, to);
            let (from_pt, from_side) = nearest_anchor(src, &src_box, to_pt);
            Endpoints {
                from: from_pt,
                to: to_pt,
                from_side,
                to_side: to.side,
            }
        }
        (None, None) => auto_snap(src, &src_box, tgt, &tgt_box),
    };
    let (from, to) = straighten(resolved.from, resolved.to, config.path);
    Endpoints {
        from,
        to,
        ..resolved
    }
}

pub(super) fn spec_point(shape: &Shape, bounds: &Bounds, spec: AnchorSpec) -> Point {
    anchor_point(shape, bounds, spec.side, spec.at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ShapeConfig;
    use crate::layout::resolve::shape_bounds;

    fn approx(a: Point, b: Point) -> bool {
        (a.0 - b.0).abs() < 1e-3 && (a.1 - b.1).abs() < 1e-3
    }

    fn shape_of(doc: &mut Document, kind: ShapeKind, config: ShapeConfig) -> (Shape, Bounds) {
        let id = doc.add_shape(kind, "", config);
        let shape = doc.shape(id).clone();
        let canvas = Bounds::new(0.0, 0.0, doc.width, doc.height);
        let bounds = shape_bounds(&shape, &canvas);
        (shape, bounds)
    }

    #[test]
    fn rect_anchors_interpolate_along_edges() {
        let mut doc = Document::new(800.0, 400.0);
        let (rect, b) = shape_of(
            &mut doc,
            ShapeKind::Rect,
            ShapeConfig::at(10.0, 20.0).with_size(100.0, 40.0),
        );
        assert_eq!(anchor_point(&rect, &b, Side::Top, 0.5), (60.0, 20.0));
        assert_eq!(anchor_point(&rect, &b, Side::Left, 0.25), (10.0, 30.0));
        assert_eq!(anchor_point(&rect, &b, Side::Right, 1.0), (110.0, 60.0));
        assert_eq!(anchor_point(&rect, &b, Side::Bottom, 0.0), (10.0, 60.0));
    }

    #[test]
    fn trapezoid_top_anchor_follows_narrowed_edge() {
        let mut doc = Document::new(800.0, 400.0);
        let config = ShapeConfig {
            top_ratio: Some(0.5),
            ..ShapeConfig::at(0.0, 0.0).with_size(200.0, 80.0)
        };
        let (trap, b) = shape_of(&mut doc, ShapeKind::Trapezoid, config);
        let inset = 50.0;
        assert!(approx(anchor_point(&trap, &b, Side::Top, 0.0), (inset, 0.0)));
        assert!(approx(anchor_point(&trap, &b, Side::Top, 1.0), (200.0 - inset, 0.0)));
        assert!(approx(anchor_point(&trap, &b, Side::Bottom, 0.0), (0.0, 80.0)));
        assert!(approx(anchor_point(&trap, &b, Side::Left, 0.5), (25.0, 40.0)));
        assert!(approx(anchor_point(&trap, &b, Side::Right, 0.0), (150.0, 0.0)));
    }

    #[test]
    fn cylinder_top_anchor_hits_cap_apex() {
        let mut doc = Document::new(800.0, 400.0);
        let config = ShapeConfig {
            depth: Some(0.2),
            ..ShapeConfig::at(100.0, 50.0).with_size(80.0, 100.0)
        };
        let (cyl, b) = shape_of(&mut doc, ShapeKind::Cylinder, config);
        assert!(approx(anchor_point(&cyl, &b, Side::Top, 0.5), (140.0, 50.0)));
        assert!(approx(anchor_point(&cyl, &b, Side::Bottom, 0.5), (140.0, 150.0)));
        assert!(approx(anchor_point(&cyl, &b, Side::Top, 0.0), (100.0, 70.0)));
        // Sides span between the cap centers, not the full box.
        assert!(approx(anchor_point(&cyl, &b, Side::Left, 0.0), (100.0, 70.0)));
        assert!(approx(anchor_point(&cyl, &b, Side::Right, 1.0), (180.0, 130.0)));
    }

    #[test]
    fn zero_size_shape_yields_degenerate_point() {
        let mut doc = Document::new(800.0, 400.0);
        let (text, b) = shape_of(&mut doc, ShapeKind::Text, ShapeConfig::at(30.0, 40.0));
        for side in Side::ALL {
            assert_eq!(anchor_point(&text, &b, side, 0.5), (30.0, 40.0));
        }
    }

    #[test]
    fn straightening_levels_near_horizontal_pairs() {
        let (from, to) = straighten((100.0, 50.0), (300.0, 55.0), PathKind::Straight);
        assert_eq!(from.1, to.1);
        assert_eq!(from.1, 52.5);
        let (from, to) = straighten((100.0, 50.0), (104.0, 200.0), PathKind::Polyline);
        assert_eq!(from.0, 102.0);
        assert_eq!(to.0, 102.0);
    }

    #[test]
    fn straightening_skips_curves_and_diagonals() {
        let a = (0.0, 0.0);
        let b = (200.0, 5.0);
        assert_eq!(straighten(a, b, PathKind::Curve), (a, b));
        let c = (50.0, 60.0);
        assert_eq!(straighten(a, c, PathKind::Straight), (a, c));
        assert_eq!(straighten(a, (3.0, 4.0), PathKind::Straight), (a, (3.0, 4.0)));
    }

    #[test]
    fn straightening_is_idempotent() {
        let once = straighten((10.0, 10.0), (210.0, 17.0), PathKind::Straight);
        let twice = straighten(once.0, once.1, PathKind::Straight);
        assert_eq!(once, twice);
    }

    #[test]
    fn auto_snap_picks_facing_sides() {
        let mut doc = Document::new(800.0, 400.0);
        let (a, ab) = shape_of(&mut doc, ShapeKind::Rect, ShapeConfig::at(0.0, 0.0).with_size(100.0, 40.0));
        let (b, bb) = shape_of(&mut doc, ShapeKind::Rect, ShapeConfig::at(300.0, 5.0).with_size(100.0, 40.0));
        let forward = auto_snap(&a, &ab, &b, &bb);
        let backward = auto_snap(&b, &bb, &a, &ab);
        assert_eq!((forward.from_side, forward.to_side), (Side::Right, Side::Left));
        assert_eq!((backward.from_side, backward.to_side), (Side::Left, Side::Right));
        assert_eq!(distance(forward.from, forward.to), distance(backward.from, backward.to));
        assert_eq!(forward.from.1, forward.to.1);
        assert_eq!(forward.from.1, 22.5);
    }

    #[test]
    fn nearest_anchor_prefers_first_side_on_ties() {
        let mut doc = Document::new(800.0, 400.0);
        let (a, ab) = shape_of(&mut doc, ShapeKind::Rect, ShapeConfig::at(0.0, 0.0).with_size(100.0, 100.0));
        assert_eq!(nearest_anchor(&a, &ab, (50.0, 50.0)).1, Side::Top);
        assert_eq!(nearest_anchor(&a, &ab, (300.0, 50.0)), ((100.0, 50.0), Side::Right));
    }

    #[test]
    fn half_specified_anchor_uses_nearest_side() {
        let mut doc = Document::new(800.0, 400.0);
        let a = doc.rect("a", ShapeConfig::at(0.0, 0.0).with_size(100.0, 40.0));
        let b = doc.rect("b", ShapeConfig::at(0.0, 200.0).with_size(100.0, 40.0));
        let table = crate::layout::resolve::resolve_bounds(&doc);
        let config = ArrowConfig {
            from: Some(AnchorSpec::new(Side::Bottom, 0.5)),
            ..Default::default()
        };
        let ends = resolve_endpoints(&doc, &table, a, b, &config);
        assert_eq!(ends.to_side, Side::Top);
        assert_eq!(ends.from, (50.0, 40.0));
        assert_eq!(ends.to, (50.0, 200.0));
    }
}
