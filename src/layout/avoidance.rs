use super::geometry::{Bounds, Point};
use super::types::BoundsTable;
use crate::ir::{Document, ShapeId};

/// Clearance kept between a detour and the obstacles it steps around.
pub const MARGIN: f32 = 12.0;
const MAX_PASSES: usize = 5;

/// Boxes a connector between `source` and `target` has to steer around.
///
/// The endpoints themselves, their containers and any group enclosing them
/// are not obstacles, and neither are shapes 2px or thinner.
pub(super) fn collect_obstacles(
    doc: &Document,
    table: &BoundsTable,
    source: ShapeId,
    target: ShapeId,
) -> Vec<Bounds> {
    let mut skip = doc.lineage(source);
    skip.extend(doc.lineage(target));
    for group in doc.groups() {
        if group.members.iter().any(|m| skip.contains(m)) {
            skip.push(group.shape);
        }
    }
    doc.shapes()
        .iter()
        .filter(|shape| !skip.contains(&shape.id))
        .map(|shape| table.get(shape.id))
        .filter(|b| b.width > 2.0 && b.height > 2.0)
        .collect()
}

fn x_hits(obstacles: &[Bounds], x: f32, y_min: f32, y_max: f32) -> bool {
    obstacles
        .iter()
        .any(|b| x > b.x && x < b.right() && y_max > b.y && y_min < b.bottom())
}

fn y_hits(obstacles: &[Bounds], y: f32, x_min: f32, x_max: f32) -> bool {
    obstacles
        .iter()
        .any(|b| y > b.y && y < b.bottom() && x_max > b.x && x_min < b.right())
}

/// Picks between two candidate offsets: a clear one first, then the nearer,
/// and the farther one when both are blocked.
fn pick(current: f32, low: f32, high: f32, low_clear: bool, high_clear: bool) -> f32 {
    let low_dist = (low - current).abs();
    let high_dist = (high - current).abs();
    match (low_clear, high_clear) {
        (true, true) => {
            if low_dist <= high_dist {
                low
            } else {
                high
            }
        }
        (true, false) => low,
        (false, true) => high,
        (false, false) => {
            if low_dist > high_dist {
                low
            } else {
                high
            }
        }
    }
}

/// Steps a routed polyline around third-party boxes.
///
/// Vertical interior segments are shifted sideways; horizontal segments get a
/// four-point detour above or below the blocking boxes. One segment is fixed
/// per pass and at most five passes run, so the result may still collide.
pub fn avoid_obstacles(points: &[Point], obstacles: &[Bounds]) -> Vec<Point> {
    let mut pts = points.to_vec();
    if pts.len() < 3 || obstacles.is_empty() {
        return pts;
    }

    for pass in 0..MAX_PASSES {
        let Some(fixed) = fix_first_collision(&mut pts, obstacles) else {
            return pts;
        };
        tracing::trace!(pass, segment = fixed, points = pts.len(), "rerouted around obstacle");
    }
    tracing::debug!(
        passes = MAX_PASSES,
        "obstacle avoidance stopped at its pass limit"
    );
    pts
}

/// Fixes the first colliding segment and returns its index.
fn fix_first_collision(pts: &mut Vec<Point>, obstacles: &[Bounds]) -> Option<usize> {
    for i in 0..pts.len() - 1 {
        let (p1, p2) = (pts[i], pts[i + 1]);
        let dx = (p1.0 - p2.0).abs();
        let dy = (p1.1 - p2.1).abs();

        if dx < 1.0 && dy >= 1.0 && i >= 1 && i + 2 < pts.len() {
            let x = p1.0;
            let y_min = p1.1.min(p2.1);
            let y_max = p1.1.max(p2.1);
            let hits: Vec<&Bounds> = obstacles
                .iter()
                .filter(|b| x > b.x && x < b.right() && y_max > b.y && y_min < b.bottom())
                .collect();
            if let Some(blocked) = union(&hits) {
                let left = blocked.x - MARGIN;
                let right = blocked.right() + MARGIN;
                let new_x = pick(
                    x,
                    left,
                    right,
                    !x_hits(obstacles, left, y_min, y_max),
                    !x_hits(obstacles, right, y_min, y_max),
                );
                pts[i].0 = new_x;
                pts[i + 1].0 = new_x;
                return Some(i);
            }
        }

        if dy < 1.0 && dx > 1.0 {
            let y = p1.1;
            let x_min = p1.0.min(p2.0);
            let x_max = p1.0.max(p2.0);
            let hits: Vec<&Bounds> = obstacles
                .iter()
                .filter(|b| y > b.y && y < b.bottom() && x_max > b.x + 1.0 && x_min < b.right() - 1.0)
                .collect();
            if let Some(blocked) = union(&hits) {
                let left = blocked.x - MARGIN;
                let right = blocked.right() + MARGIN;
                let top = blocked.y - MARGIN;
                let bottom = blocked.bottom() + MARGIN;
                let detour_y = pick(
                    y,
                    top,
                    bottom,
                    !y_hits(obstacles, top, left, right),
                    !y_hits(obstacles, bottom, left, right),
                );

                // Enter on the side facing p1 and leave on the far side.
                let going_right = p2.0 >= p1.0;
                let (enter_x, exit_x) = if going_right {
                    (left, right)
                } else {
                    (right, left)
                };
                let mut j = i + 1;
                while j < pts.len() - 1 {
                    let px = pts[j].0;
                    let inside = if going_right { px <= exit_x } else { px >= exit_x };
                    if !inside {
                        break;
                    }
                    j += 1;
                }
                let detour = [
                    (enter_x, y),
                    (enter_x, detour_y),
                    (exit_x, detour_y),
                    (exit_x, y),
                ];
                let tail = pts.split_off(j);
                pts.truncate(i + 1);
                pts.extend_from_slice(&detour);
                // Skipped points may have carried the vertical leg; keep the rejoin orthogonal.
                if let Some(next) = tail.first()
                    && j > i + 1
                    && (next.1 - y).abs() >= 1.0
                    && (next.0 - exit_x).abs() >= 1.0
                {
                    pts.push((next.0, y));
                }
                pts.extend(tail);
                return Some(i);
            }
        }
    }
    None
}

fn union(hits: &[&Bounds]) -> Option<Bounds> {
    Bounds::union_all(hits.iter().copied())
}
