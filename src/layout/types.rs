use serde::Serialize;

use super::geometry::{Bounds, Point};
use crate::ir::{Document, ShapeId, Side};

/// Resolved bounds of every shape for one render, indexed by shape handle.
#[derive(Debug, Clone, Default)]
pub struct BoundsTable {
    entries: Vec<Bounds>,
}

impl BoundsTable {
    pub fn for_document(doc: &Document) -> Self {
        Self {
            entries: vec![Bounds::default(); doc.shapes().len()],
        }
    }

    pub fn get(&self, id: ShapeId) -> Bounds {
        self.entries[id.index()]
    }

    pub fn set(&mut self, id: ShapeId, bounds: Bounds) {
        self.entries[id.index()] = bounds;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Which decision of the router produced a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RouteBranch {
    Straight,
    Curve,
    /// Orthogonal route leaving a top or bottom anchor.
    VerticalExit,
    /// Both ends on the same left/right side; loops outward past the farther endpoint.
    SameSideBypass,
    /// Horizontal exit through the midpoint column.
    ZRoute,
    /// Horizontal exit that would double back; wraps around both shapes instead.
    UWrap,
    ForkBranch,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RouteGeometry {
    Line { start: Point, end: Point },
    Quadratic { start: Point, control: Point, end: Point },
    Polyline { points: Vec<Point> },
}

/// Structured router output consumed by label placement, bounds and drawing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Route {
    pub branch: RouteBranch,
    /// Anchor points; arrowheads are drawn with their tips here.
    pub from: Point,
    pub to: Point,
    pub from_side: Side,
    pub to_side: Side,
    /// Drawn geometry, already shortened by the head offsets.
    pub geometry: RouteGeometry,
    pub start_angle: f32,
    pub end_angle: f32,
    pub label_anchor: Point,
    pub corner_radius: f32,
}

impl Route {
    /// Every point that shapes the drawn path, including curve control points.
    pub fn points(&self) -> Vec<Point> {
        match &self.geometry {
            RouteGeometry::Line { start, end } => vec![*start, *end],
            RouteGeometry::Quadratic {
                start,
                control,
                end,
            } => vec![*start, *control, *end],
            RouteGeometry::Polyline { points } => points.clone(),
        }
    }

    pub fn polyline(&self) -> Option<&[Point]> {
        match &self.geometry {
            RouteGeometry::Polyline { points } => Some(points),
            _ => None,
        }
    }

    /// Straight-line angle between the two anchors.
    pub fn straight_angle(&self) -> f32 {
        (self.to.1 - self.from.1).atan2(self.to.0 - self.from.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelLayout {
    pub text: String,
    /// Text anchor point; the collision box is centered on it.
    pub position: Point,
    pub width: f32,
    pub height: f32,
}

impl LabelLayout {
    pub fn bounds(&self) -> Bounds {
        Bounds::new(
            self.position.0 - self.width / 2.0,
            self.position.1 - self.height / 2.0,
            self.width,
            self.height,
        )
    }
}

#[derive(Debug, Clone)]
pub struct ArrowLayout {
    /// Index into [`Document::arrows`].
    pub index: usize,
    pub source: ShapeId,
    pub target: ShapeId,
    pub route: Route,
    pub label: Option<LabelLayout>,
}

#[derive(Debug, Clone)]
pub struct ForkLayout {
    pub index: usize,
    pub source: ShapeId,
    pub targets: Vec<ShapeId>,
    /// Shared stem from the source anchor to the split point.
    pub trunk: (Point, Point),
    pub branches: Vec<Route>,
}

#[derive(Debug, Clone)]
pub struct Layout {
    pub width: f32,
    pub height: f32,
    pub bounds: BoundsTable,
    pub arrows: Vec<ArrowLayout>,
    pub forks: Vec<ForkLayout>,
    pub content_bounds: Bounds,
}

impl Layout {
    pub fn shape_bounds(&self, id: ShapeId) -> Bounds {
        self.bounds.get(id)
    }
}
