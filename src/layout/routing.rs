use crate::config::RoutingConfig;
use crate::geometry::{Point, Rect};
use crate::ir::{Edge, Node};
use crate::model::GraphModel;

use super::types::{PathDescriptor, PathSegment, RouteStyle};

// ── Step routing ────────────────────────────────────────────────────
/// Number of stairs in a step route; Δx and Δy are split evenly across them.
const STEP_COUNT: usize = 3;

/// Below this length a final segment is too short to orient an arrowhead.
const MIN_DIRECTION_LEN: f32 = 1e-4;

/// Routes an edge between two node rectangles using default routing
/// parameters.
pub fn route(source: &Node, target: &Node, style: RouteStyle) -> PathDescriptor {
    route_with(source, target, style, &RoutingConfig::default())
}

pub fn route_with(
    source: &Node,
    target: &Node,
    style: RouteStyle,
    config: &RoutingConfig,
) -> PathDescriptor {
    let from = source.bounds();
    let to = target.bounds();
    if source.id == target.id {
        return route_self_loop(&from, style, config);
    }
    match style {
        RouteStyle::Straight => route_straight(&from, &to),
        RouteStyle::Orthogonal => route_orthogonal(&from, &to),
        RouteStyle::Curved => route_curved(&from, &to, config.curve_factor),
        RouteStyle::Step => route_step(&from, &to),
    }
}

/// Routes a model edge with its own style override or the configured
/// default. Returns `None` when an endpoint is missing.
pub fn route_edge(
    model: &GraphModel,
    edge: &Edge,
    config: &RoutingConfig,
) -> Option<PathDescriptor> {
    let source = model.node(&edge.source_node_id)?;
    let target = model.node(&edge.target_node_id)?;
    let style = edge
        .style
        .as_ref()
        .and_then(|style| style.route)
        .unwrap_or(config.default_style);
    Some(route_with(source, target, style, config))
}

/// Point where the ray from the rectangle's centre towards `toward` leaves
/// the rectangle: `center + unit(d) * distance-to-boundary`, the distance
/// being set by whichever half-extent the ray reaches first.
pub(crate) fn boundary_anchor(rect: &Rect, toward: Point) -> Point {
    let center = rect.center();
    let d = toward - center;
    if d.length() <= f32::EPSILON {
        return center;
    }
    let half_w = rect.size.width / 2.0;
    let half_h = rect.size.height / 2.0;
    let tx = if d.x.abs() > f32::EPSILON {
        half_w / d.x.abs()
    } else {
        f32::INFINITY
    };
    let ty = if d.y.abs() > f32::EPSILON {
        half_h / d.y.abs()
    } else {
        f32::INFINITY
    };
    center + d * tx.min(ty)
}

/// Midpoint of the side facing `sign` along one axis.
fn side_anchor(rect: &Rect, horizontal: bool, sign: f32) -> Point {
    let center = rect.center();
    if horizontal {
        Point::new(center.x + sign * rect.size.width / 2.0, center.y)
    } else {
        Point::new(center.x, center.y + sign * rect.size.height / 2.0)
    }
}

fn sign_of(value: f32) -> f32 {
    if value < 0.0 { -1.0 } else { 1.0 }
}

fn arrow_angle(segments: &[PathSegment], start: Point, fallback: Point) -> f32 {
    let mut previous = start;
    let mut direction = fallback;
    for segment in segments {
        let approach = match *segment {
            PathSegment::LineTo { to } => to - previous,
            PathSegment::CubicTo { control2, to, .. } => {
                let tangent = to - control2;
                if tangent.length() > MIN_DIRECTION_LEN {
                    tangent
                } else {
                    to - previous
                }
            }
        };
        if approach.length() > MIN_DIRECTION_LEN {
            direction = approach;
        }
        previous = segment.end();
    }
    direction.y.atan2(direction.x)
}

fn descriptor(
    style: RouteStyle,
    start: Point,
    segments: Vec<PathSegment>,
    fallback: Point,
) -> PathDescriptor {
    let arrow_angle = arrow_angle(&segments, start, fallback);
    PathDescriptor {
        style,
        start,
        segments,
        arrow_angle,
    }
}

fn polyline(style: RouteStyle, points: &[Point], fallback: Point) -> PathDescriptor {
    let start = points.first().copied().unwrap_or(Point::ORIGIN);
    let segments = points
        .iter()
        .skip(1)
        .map(|&to| PathSegment::LineTo { to })
        .collect();
    descriptor(style, start, segments, fallback)
}

fn route_straight(from: &Rect, to: &Rect) -> PathDescriptor {
    let delta = to.center() - from.center();
    let start = boundary_anchor(from, to.center());
    let end = boundary_anchor(to, from.center());
    polyline(RouteStyle::Straight, &[start, end], delta)
}

/// Leaves and enters along the axis with the larger displacement, bending
/// at the midpoint of that axis. Both anchors sit on side midpoints, so the
/// result is start, two bends, end: three segments in a Z shape. A single
/// L bend would need one anchor off its side midpoint.
fn route_orthogonal(from: &Rect, to: &Rect) -> PathDescriptor {
    let delta = to.center() - from.center();
    let horizontal = delta.x.abs() > delta.y.abs();
    let sign = sign_of(if horizontal { delta.x } else { delta.y });
    let start = side_anchor(from, horizontal, sign);
    let end = side_anchor(to, horizontal, -sign);
    let points = if horizontal {
        let mid_x = (start.x + end.x) / 2.0;
        [start, Point::new(mid_x, start.y), Point::new(mid_x, end.y), end]
    } else {
        let mid_y = (start.y + end.y) / 2.0;
        [start, Point::new(start.x, mid_y), Point::new(end.x, mid_y), end]
    };
    polyline(RouteStyle::Orthogonal, &points, delta)
}

/// Cubic Bezier whose control points are pushed out along the dominant
/// axis by `min(|Δx|, |Δy|) * factor`.
fn route_curved(from: &Rect, to: &Rect, factor: f32) -> PathDescriptor {
    let delta = to.center() - from.center();
    let start = boundary_anchor(from, to.center());
    let end = boundary_anchor(to, from.center());
    let span = end - start;
    let offset = span.x.abs().min(span.y.abs()) * factor;
    let push = if delta.x.abs() >= delta.y.abs() {
        Point::new(sign_of(delta.x) * offset, 0.0)
    } else {
        Point::new(0.0, sign_of(delta.y) * offset)
    };
    let segments = vec![PathSegment::CubicTo {
        control1: start + push,
        control2: end - push,
        to: end,
    }];
    descriptor(RouteStyle::Curved, start, segments, delta)
}

/// Staircase of [`STEP_COUNT`] horizontal-then-vertical stairs, giving
/// `2 * STEP_COUNT` line segments. The last rise lands on the end anchor.
fn route_step(from: &Rect, to: &Rect) -> PathDescriptor {
    let delta = to.center() - from.center();
    let start = boundary_anchor(from, to.center());
    let end = boundary_anchor(to, from.center());
    let run = (end.x - start.x) / STEP_COUNT as f32;
    let rise = (end.y - start.y) / STEP_COUNT as f32;
    let mut points = Vec::with_capacity(STEP_COUNT * 2 + 1);
    points.push(start);
    let mut cursor = start;
    for stair in 0..STEP_COUNT {
        cursor = Point::new(cursor.x + run, cursor.y);
        points.push(cursor);
        // Land exactly on the anchor to avoid accumulated drift.
        cursor = if stair + 1 == STEP_COUNT {
            end
        } else {
            Point::new(cursor.x, cursor.y + rise)
        };
        points.push(cursor);
    }
    polyline(RouteStyle::Step, &points, delta)
}

/// Loop leaving the right side and re-entering through the top.
fn route_self_loop(rect: &Rect, style: RouteStyle, config: &RoutingConfig) -> PathDescriptor {
    let pad = config.self_loop_size;
    let center = rect.center();
    let right_x = rect.right() + pad;
    let top_y = rect.origin.y - pad;
    let points = [
        Point::new(rect.right(), center.y),
        Point::new(right_x, center.y),
        Point::new(right_x, top_y),
        Point::new(center.x, top_y),
        Point::new(center.x, rect.origin.y),
    ];
    polyline(style, &points, Point::new(0.0, 1.0))
}
