use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::geometry::Point;
use crate::ir::NodeId;

/// Sample count used to flatten a cubic segment when measuring length.
const CUBIC_FLATTEN_STEPS: usize = 16;

/// Node positions produced by the auto-layout, keyed by node id.
pub type Positions = BTreeMap<NodeId, Point>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RouteStyle {
    /// One segment between the boundary anchors.
    Straight,
    /// Three segments leaving and entering along the dominant axis. The
    /// turn happens at that axis' midpoint, so the path jogs once across
    /// the other axis (a Z shape) rather than making a single L bend.
    Orthogonal,
    Curved,
    /// Three stairs, each a horizontal run followed by a vertical rise,
    /// which is six line segments in total.
    Step,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PathSegment {
    LineTo {
        to: Point,
    },
    CubicTo {
        control1: Point,
        control2: Point,
        to: Point,
    },
}

impl PathSegment {
    pub fn end(&self) -> Point {
        match self {
            PathSegment::LineTo { to } | PathSegment::CubicTo { to, .. } => *to,
        }
    }
}

/// Rendering-independent description of an edge's visual path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathDescriptor {
    pub style: RouteStyle,
    pub start: Point,
    pub segments: Vec<PathSegment>,
    /// Orientation of the arrowhead at the terminal anchor, in radians.
    pub arrow_angle: f32,
}

impl PathDescriptor {
    pub fn end(&self) -> Point {
        self.segments.last().map_or(self.start, PathSegment::end)
    }

    /// Start point followed by the end point of every segment.
    pub fn vertices(&self) -> Vec<Point> {
        std::iter::once(self.start)
            .chain(self.segments.iter().map(PathSegment::end))
            .collect()
    }

    /// Point halfway along the path length, for label placement.
    pub fn midpoint(&self) -> Point {
        let polyline = self.flatten();
        let total: f32 = polyline.windows(2).map(|w| (w[1] - w[0]).length()).sum();
        if total <= f32::EPSILON {
            return self.start;
        }
        let mut remaining = total / 2.0;
        for pair in polyline.windows(2) {
            let len = (pair[1] - pair[0]).length();
            if remaining <= len && len > 0.0 {
                return pair[0] + (pair[1] - pair[0]) * (remaining / len);
            }
            remaining -= len;
        }
        self.end()
    }

    pub fn to_svg_path_data(&self) -> String {
        let mut d = format!("M {:.2} {:.2}", self.start.x, self.start.y);
        for segment in &self.segments {
            match segment {
                PathSegment::LineTo { to } => {
                    let _ = write!(d, " L {:.2} {:.2}", to.x, to.y);
                }
                PathSegment::CubicTo {
                    control1,
                    control2,
                    to,
                } => {
                    let _ = write!(
                        d,
                        " C {:.2} {:.2}, {:.2} {:.2}, {:.2} {:.2}",
                        control1.x, control1.y, control2.x, control2.y, to.x, to.y
                    );
                }
            }
        }
        d
    }

    fn flatten(&self) -> Vec<Point> {
        let mut points = vec![self.start];
        let mut cursor = self.start;
        for segment in &self.segments {
            match *segment {
                PathSegment::LineTo { to } => points.push(to),
                PathSegment::CubicTo {
                    control1,
                    control2,
                    to,
                } => {
                    for step in 1..=CUBIC_FLATTEN_STEPS {
                        let t = step as f32 / CUBIC_FLATTEN_STEPS as f32;
                        points.push(cubic_point(cursor, control1, control2, to, t));
                    }
                }
            }
            cursor = segment.end();
        }
        points
    }
}

fn cubic_point(p0: Point, p1: Point, p2: Point, p3: Point, t: f32) -> Point {
    let mt = 1.0 - t;
    p0 * (mt * mt * mt) + p1 * (3.0 * mt * mt * t) + p2 * (3.0 * mt * t * t) + p3 * (t * t * t)
}
