use std::f32::consts::FRAC_PI_2;

use super::geometry::{Bounds, Point, project};
use super::types::{BoundsTable, LabelLayout, Route};
use crate::config::LabelConfig;
use crate::ir::{Document, ShapeId};

/// Heuristic label box: fixed advance per character, no font metrics.
pub fn estimate_label_size(text: &str, config: &LabelConfig) -> (f32, f32) {
    let chars = text.chars().count() as f32;
    (
        chars * config.font_size * config.char_width_ratio,
        config.font_size * config.line_height,
    )
}

/// Shape boxes a connector label must stay clear of.
///
/// Group frames and the containers around the connector's own endpoints are
/// skipped since the label necessarily sits inside them.
pub(super) fn label_obstacles(
    doc: &Document,
    table: &BoundsTable,
    source: ShapeId,
    target: ShapeId,
) -> Vec<Bounds> {
    let mut containers: Vec<ShapeId> = doc.lineage(source).into_iter().skip(1).collect();
    containers.extend(doc.lineage(target).into_iter().skip(1));
    doc.shapes()
        .iter()
        .filter(|shape| !doc.is_group(shape.id) && !containers.contains(&shape.id))
        .map(|shape| table.get(shape.id))
        .filter(|b| !b.is_zero())
        .collect()
}

fn hits_any(candidate: &Bounds, obstacles: &[Bounds]) -> bool {
    obstacles.iter().any(|b| candidate.touches(b))
}

/// Keeps the whole label box inside the canvas, `margin` px from each edge.
pub fn clamp_to_canvas(point: Point, size: (f32, f32), canvas: (f32, f32), margin: f32) -> Point {
    let (w, h) = size;
    (
        point.0.min(canvas.0 - margin - w / 2.0).max(margin + w / 2.0),
        point.1.min(canvas.1 - margin - h / 2.0).max(margin + h / 2.0),
    )
}

/// Inputs shared by every label placed during one layout pass.
pub struct LabelContext<'a> {
    pub config: &'a LabelConfig,
    pub canvas: (f32, f32),
    pub anti_overlap: bool,
}

/// Positions a connector label relative to its route.
///
/// A manual `offset` shifts the label vertically from the route's label anchor
/// and is used as-is. Otherwise the label is lifted above the anchor and, when
/// it collides with a shape, searched outward on both sides of the connector
/// until a clear spot is found; the naive spot is kept if none is.
pub fn place_label(
    text: &str,
    route: &Route,
    offset: Option<f32>,
    obstacles: &[Bounds],
    ctx: &LabelContext,
) -> LabelLayout {
    let (width, height) = estimate_label_size(text, ctx.config);
    let anchor = route.label_anchor;
    let layout = |position: Point| LabelLayout {
        text: text.to_string(),
        position,
        width,
        height,
    };

    if let Some(offset) = offset {
        return layout((anchor.0, anchor.1 + offset));
    }
    let naive = (anchor.0, anchor.1 - ctx.config.lift);
    if !ctx.anti_overlap {
        return layout(naive);
    }

    let boxed = |p: Point| Bounds::new(p.0 - width / 2.0, p.1 - height / 2.0, width, height);
    let mut position = naive;
    if hits_any(&boxed(naive), obstacles) {
        let perp = route.straight_angle() - FRAC_PI_2;
        let cfg = ctx.config;
        let steps = ((cfg.search_limit - cfg.search_start) / cfg.search_step).floor().max(-1.0) as i32;
        let candidate = (0..=steps)
            .map(|i| cfg.search_start + i as f32 * cfg.search_step)
            .flat_map(|dist| [-dist, dist])
            .map(|dist| project(naive, perp, dist))
            .find(|p| !hits_any(&boxed(*p), obstacles));
        match candidate {
            Some(p) => position = p,
            None => tracing::debug!(label = text, "no clear label position; keeping the default"),
        }
    }
    layout(clamp_to_canvas(
        position,
        (width, height),
        ctx.canvas,
        ctx.config.canvas_margin,
    ))
}
