// Connector routing: straight, curved and orthogonal paths plus fork branches.

use std::f32::consts::{FRAC_PI_2, PI};

use super::anchors::Endpoints;
use super::geometry::{Bounds, Point, angle_between, distance, midpoint, project};
use super::types::{Route, RouteBranch, RouteGeometry};
use crate::config::RoutingConfig;
use crate::ir::{ArrowConfig, ArrowHead, PathKind, Side};

/// How far a line end is pulled back so the head is not painted under the boundary.
pub fn head_offset(head: ArrowHead, size: f32) -> f32 {
    match head {
        ArrowHead::Triangle | ArrowHead::TriangleOpen | ArrowHead::Stealth => size * 0.7,
        ArrowHead::Vee => size * 0.15,
        ArrowHead::Circle | ArrowHead::CircleOpen => size * 0.5,
        ArrowHead::Diamond | ArrowHead::DiamondOpen => size,
        ArrowHead::Bar => 1.0,
        ArrowHead::Dot => size * 0.25,
        ArrowHead::None => 0.0,
    }
}

pub struct RouteRequest<'a> {
    pub ends: Endpoints,
    pub config: &'a ArrowConfig,
    pub source_bounds: Bounds,
    pub target_bounds: Bounds,
}

#[derive(Debug, Clone, Copy)]
struct Offsets {
    start: f32,
    end: f32,
}

fn offsets(config: &ArrowConfig, routing: &RoutingConfig) -> Offsets {
    let size = config.head_size.unwrap_or(routing.head_size);
    let end = head_offset(config.head, size);
    Offsets {
        start: if config.bidirectional { end } else { 0.0 },
        end,
    }
}

/// Sign that maps zero to zero.
fn sign(value: f32) -> f32 {
    if value > 0.0 {
        1.0
    } else if value < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Routes one connector between already-resolved (and straightened) endpoints.
pub fn route_connector(req: &RouteRequest, routing: &RoutingConfig) -> Route {
    let off = offsets(req.config, routing);
    match req.config.path {
        PathKind::Straight => straight_route(req, off),
        PathKind::Curve => curve_route(req, off, routing),
        PathKind::Polyline => polyline_route(req, off, routing),
    }
}

fn straight_route(req: &RouteRequest, off: Offsets) -> Route {
    let Endpoints { from, to, .. } = req.ends;
    let angle = angle_between(from, to);
    Route {
        branch: RouteBranch::Straight,
        from,
        to,
        from_side: req.ends.from_side,
        to_side: req.ends.to_side,
        geometry: RouteGeometry::Line {
            start: project(from, angle, off.start),
            end: project(to, angle, -off.end),
        },
        start_angle: angle,
        end_angle: angle,
        label_anchor: midpoint(from, to),
        corner_radius: 0.0,
    }
}

fn curve_route(req: &RouteRequest, off: Offsets, routing: &RoutingConfig) -> Route {
    let Endpoints { from, to, .. } = req.ends;
    let bend = req.config.curve.unwrap_or(routing.curve_bend);
    let perp = angle_between(from, to) - FRAC_PI_2;
    let control = project(midpoint(from, to), perp, bend);
    let start_angle = angle_between(from, control);
    let end_angle = angle_between(control, to);
    Route {
        branch: RouteBranch::Curve,
        from,
        to,
        from_side: req.ends.from_side,
        to_side: req.ends.to_side,
        geometry: RouteGeometry::Quadratic {
            start: project(from, start_angle, off.start),
            control,
            end: project(to, end_angle, -off.end),
        },
        start_angle,
        end_angle,
        // Point at t = 0.5 on the quadratic.
        label_anchor: (
            (from.0 + 2.0 * control.0 + to.0) / 4.0,
            (from.1 + 2.0 * control.1 + to.1) / 4.0,
        ),
        corner_radius: 0.0,
    }
}

struct Polyline {
    branch: RouteBranch,
    points: Vec<Point>,
    start_angle: f32,
    end_angle: f32,
}

fn polyline_route(req: &RouteRequest, off: Offsets, routing: &RoutingConfig) -> Route {
    let ends = req.ends;
    let poly = if ends.from_side.is_vertical() {
        vertical_exit(&ends, off, req.config.curve.unwrap_or(routing.polyline_gap))
    } else if ends.from_side == ends.to_side {
        same_side_bypass(&ends, off, req.config.curve.unwrap_or(routing.bypass_distance))
    } else {
        let mid_x = (ends.from.0 + ends.to.0) / 2.0;
        if doubles_back(ends.from_side, ends.from.0, mid_x)
            || doubles_back(ends.to_side, ends.to.0, mid_x)
        {
            u_wrap(req, off, req.config.curve.unwrap_or(routing.polyline_gap))
        } else {
            z_route(&ends, off, mid_x)
        }
    };
    Route {
        branch: poly.branch,
        from: ends.from,
        to: ends.to,
        from_side: ends.from_side,
        to_side: ends.to_side,
        label_anchor: longest_segment_midpoint(&poly.points),
        geometry: RouteGeometry::Polyline {
            points: poly.points,
        },
        start_angle: poly.start_angle,
        end_angle: poly.end_angle,
        corner_radius: req.config.corner_radius,
    }
}

/// A horizontal leg toward `mid_x` would run against the anchor side's outward direction.
fn doubles_back(side: Side, anchor_x: f32, mid_x: f32) -> bool {
    match side {
        Side::Left => mid_x > anchor_x,
        Side::Right => mid_x < anchor_x,
        _ => false,
    }
}

fn vertical_angle(direction: f32) -> f32 {
    if direction < 0.0 { -FRAC_PI_2 } else { FRAC_PI_2 }
}

/// Horizontal entry angle pointing into a left or right side.
fn horizontal_entry_angle(side: Side) -> f32 {
    if side == Side::Left { 0.0 } else { PI }
}

fn vertical_exit(ends: &Endpoints, off: Offsets, gap: f32) -> Polyline {
    let (from, to) = (ends.from, ends.to);
    let v_dir = ends.from_side.outward();
    // Exiting and entering on the same vertical side must clear both anchors.
    let mid_y = if ends.from_side == ends.to_side {
        let edge = if v_dir > 0.0 {
            from.1.max(to.1)
        } else {
            from.1.min(to.1)
        };
        edge + v_dir * gap
    } else {
        from.1 + v_dir * gap
    };
    let start = (from.0, from.1 + off.start * v_dir);
    let start_angle = vertical_angle(v_dir);

    if !ends.to_side.is_vertical() {
        let h_dir = ends.to_side.outward();
        let turn_x = (from.0 + to.0) / 2.0;
        return Polyline {
            branch: RouteBranch::VerticalExit,
            points: vec![
                start,
                (from.0, mid_y),
                (turn_x, mid_y),
                (turn_x, to.1),
                (to.0 + off.end * h_dir, to.1),
            ],
            start_angle,
            end_angle: horizontal_entry_angle(ends.to_side),
        };
    }

    let v_dir_in = ends.to_side.outward();
    Polyline {
        branch: RouteBranch::VerticalExit,
        points: vec![
            start,
            (from.0, mid_y),
            (to.0, mid_y),
            (to.0, to.1 + off.end * v_dir_in),
        ],
        start_angle,
        end_angle: vertical_angle(-v_dir_in),
    }
}

fn same_side_bypass(ends: &Endpoints, off: Offsets, bypass: f32) -> Polyline {
    let (from, to) = (ends.from, ends.to);
    let dir = ends.from_side.outward();
    // The bypass column has to clear the farther of the two anchors.
    let edge_x = if dir > 0.0 {
        from.0.max(to.0)
    } else {
        from.0.min(to.0)
    };
    let mid_x = edge_x + dir * bypass;
    let (start_angle, end_angle) = if dir > 0.0 { (0.0, PI) } else { (PI, 0.0) };
    Polyline {
        branch: RouteBranch::SameSideBypass,
        points: vec![
            (from.0 + off.start * dir, from.1),
            (mid_x, from.1),
            (mid_x, to.1),
            (to.0 + off.end * dir, to.1),
        ],
        start_angle,
        end_angle,
    }
}

fn z_route(ends: &Endpoints, off: Offsets, mid_x: f32) -> Polyline {
    let (from, to) = (ends.from, ends.to);
    let dir = sign(to.0 - from.0);
    let angle = if to.0 >= from.0 { 0.0 } else { PI };
    Polyline {
        branch: RouteBranch::ZRoute,
        points: vec![
            (from.0 + off.start * dir, from.1),
            (mid_x, from.1),
            (mid_x, to.1),
            (to.0 - off.end * dir, to.1),
        ],
        start_angle: angle,
        end_angle: angle,
    }
}

fn u_wrap(req: &RouteRequest, off: Offsets, gap: f32) -> Polyline {
    let ends = &req.ends;
    let (from, to) = (ends.from, ends.to);
    let src = &req.source_bounds;
    let tgt = &req.target_bounds;
    let span = src.union(tgt);

    let from_dir = ends.from_side.outward();
    let exit_x = if from_dir < 0.0 {
        span.x - gap
    } else {
        span.right() + gap
    };
    let top_y = span.y - gap;
    let bottom_y = span.bottom() + gap;
    let wrap_y = if (from.1 - top_y).abs() <= (from.1 - bottom_y).abs() {
        top_y
    } else {
        bottom_y
    };

    let mut points = vec![
        (from.0 + off.start * from_dir, from.1),
        (exit_x, from.1),
        (exit_x, wrap_y),
    ];
    let end_angle = match ends.to_side {
        Side::Left | Side::Right => {
            let to_dir = ends.to_side.outward();
            let entry_x = if to_dir < 0.0 {
                span.x - gap
            } else {
                span.right() + gap
            };
            points.push((entry_x, wrap_y));
            points.push((entry_x, to.1));
            points.push((to.0 + off.end * to_dir, to.1));
            horizontal_entry_angle(ends.to_side)
        }
        Side::Top | Side::Bottom => {
            // Drop straight onto the anchor from the wrap row.
            let travel = sign(to.1 - wrap_y);
            points.push((to.0, wrap_y));
            points.push((to.0, to.1 - off.end * travel));
            vertical_angle(travel)
        }
    };
    Polyline {
        branch: RouteBranch::UWrap,
        points,
        start_angle: if from_dir > 0.0 { 0.0 } else { PI },
        end_angle,
    }
}

/// Midpoint of the longest segment; the first one wins on ties.
pub fn longest_segment_midpoint(points: &[Point]) -> Point {
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return (0.0, 0.0);
    };
    let mut best = midpoint(*first, *last);
    let mut max_len = 0.0;
    for pair in points.windows(2) {
        let len = distance(pair[0], pair[1]);
        if len > max_len {
            max_len = len;
            best = midpoint(pair[0], pair[1]);
        }
    }
    best
}

/// Replaces a polyline route's points and re-derives its label anchor from them.
pub(super) fn replace_polyline(route: &mut Route, points: Vec<Point>) {
    route.label_anchor = longest_segment_midpoint(&points);
    route.geometry = RouteGeometry::Polyline { points };
}

/// Routes every branch of a fork from one source anchor.
pub fn route_fork(
    source: Point,
    from_side: Side,
    targets: &[(Point, Side)],
    config: &ArrowConfig,
    routing: &RoutingConfig,
) -> ((Point, Point), Vec<Route>) {
    let end_off = offsets(config, routing).end;
    let gap = config.curve.unwrap_or(routing.polyline_gap);
    let stem_dir = from_side.outward();
    let split = if from_side.is_vertical() {
        (source.0, source.1 + stem_dir * gap)
    } else {
        (source.0 + stem_dir * gap, source.1)
    };
    let start_angle = if from_side.is_vertical() {
        vertical_angle(stem_dir)
    } else if stem_dir > 0.0 {
        0.0
    } else {
        PI
    };

    let branches = targets
        .iter()
        .map(|&(target, to_side)| {
            let in_dir = to_side.outward();
            let (points, end_angle) = match (from_side.is_vertical(), to_side.is_vertical()) {
                (true, false) => {
                    let drop_x = (source.0 + target.0) / 2.0;
                    (
                        vec![
                            source,
                            split,
                            (drop_x, split.1),
                            (drop_x, target.1),
                            (target.0 + end_off * in_dir, target.1),
                        ],
                        horizontal_entry_angle(to_side),
                    )
                }
                (true, true) => (
                    vec![
                        source,
                        split,
                        (target.0, split.1),
                        (target.0, target.1 + end_off * in_dir),
                    ],
                    vertical_angle(-in_dir),
                ),
                (false, true) => {
                    let drop_y = (source.1 + target.1) / 2.0;
                    (
                        vec![
                            source,
                            split,
                            (split.0, drop_y),
                            (target.0, drop_y),
                            (target.0, target.1 + end_off * in_dir),
                        ],
                        vertical_angle(-in_dir),
                    )
                }
                (false, false) => (
                    vec![
                        source,
                        split,
                        (split.0, target.1),
                        (target.0 + end_off * in_dir, target.1),
                    ],
                    horizontal_entry_angle(to_side),
                ),
            };
            Route {
                branch: RouteBranch::ForkBranch,
                from: source,
                to: target,
                from_side,
                to_side,
                label_anchor: longest_segment_midpoint(&points),
                geometry: RouteGeometry::Polyline { points },
                start_angle,
                end_angle,
                corner_radius: config.corner_radius,
            }
        })
        .collect();
    ((source, split), branches)
}

/// Drawing instruction for a route outline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathCommand {
    MoveTo(Point),
    LineTo(Point),
    QuadTo { control: Point, to: Point },
    /// Circular arc with the given radius; `sweep` is the SVG sweep flag.
    ArcTo { radius: f32, sweep: bool, to: Point },
}

pub fn path_commands(route: &Route) -> Vec<PathCommand> {
    match &route.geometry {
        RouteGeometry::Line { start, end } => {
            vec![PathCommand::MoveTo(*start), PathCommand::LineTo(*end)]
        }
        RouteGeometry::Quadratic {
            start,
            control,
            end,
        } => vec![
            PathCommand::MoveTo(*start),
            PathCommand::QuadTo {
                control: *control,
                to: *end,
            },
        ],
        RouteGeometry::Polyline { points } => rounded_polyline(points, route.corner_radius),
    }
}

/// Polyline outline with each interior vertex replaced by an arc of at most `radius`.
pub fn rounded_polyline(points: &[Point], radius: f32) -> Vec<PathCommand> {
    let Some(first) = points.first() else {
        return Vec::new();
    };
    let mut out = vec![PathCommand::MoveTo(*first)];
    if points.len() < 2 {
        return out;
    }
    if radius <= 0.0 || points.len() < 3 {
        out.extend(points[1..].iter().map(|p| PathCommand::LineTo(*p)));
        return out;
    }
    for window in points.windows(3) {
        let (prev, curr, next) = (window[0], window[1], window[2]);
        let (dx1, dy1) = (curr.0 - prev.0, curr.1 - prev.1);
        let (dx2, dy2) = (next.0 - curr.0, next.1 - curr.1);
        let len1 = dx1.hypot(dy1);
        let len2 = dx2.hypot(dy2);
        let rr = radius.min(len1 / 2.0).min(len2 / 2.0);
        if rr <= 0.0 {
            out.push(PathCommand::LineTo(curr));
            continue;
        }
        let arc_start = (curr.0 - dx1 / len1 * rr, curr.1 - dy1 / len1 * rr);
        let arc_end = (curr.0 + dx2 / len2 * rr, curr.1 + dy2 / len2 * rr);
        let cross = dx1 * dy2 - dy1 * dx2;
        out.push(PathCommand::LineTo(arc_start));
        out.push(PathCommand::ArcTo {
            radius: rr,
            sweep: cross > 0.0,
            to: arc_end,
        });
    }
    if let Some(last) = points.last() {
        out.push(PathCommand::LineTo(*last));
    }
    out
}
