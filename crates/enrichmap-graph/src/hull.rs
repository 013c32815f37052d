//! Hull geometry for cluster overlays.

use enrichmap_core::{BoundingBox, Position};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::f64::consts::TAU;
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PathSegment {
    MoveTo(Position),
    QuadTo { ctrl: Position, to: Position },
    Close,
}

/// Convex hull using a Graham scan. Returns the hull counter-clockwise in a
/// y-down coordinate system; fewer than three input points are returned as-is.
pub fn convex_hull(points: &[Position]) -> Vec<Position> {
    if points.len() < 3 {
        return points.to_vec();
    }

    // Lowest y, leftmost on ties.
    let mut start = points[0];
    for p in &points[1..] {
        if p.y < start.y || (p.y == start.y && p.x < start.x) {
            start = *p;
        }
    }

    let mut sorted: Vec<Position> = points.to_vec();
    sorted.sort_by(|a, b| {
        let angle_a = (a.y - start.y).atan2(a.x - start.x);
        let angle_b = (b.y - start.y).atan2(b.x - start.x);
        angle_a
            .partial_cmp(&angle_b)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                start
                    .distance(*a)
                    .partial_cmp(&start.distance(*b))
                    .unwrap_or(Ordering::Equal)
            })
    });

    let mut hull: Vec<Position> = Vec::with_capacity(sorted.len());
    for p in sorted {
        while hull.len() >= 2 {
            let a = hull[hull.len() - 2];
            let b = hull[hull.len() - 1];
            let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
            if cross <= 0.0 {
                hull.pop();
            } else {
                break;
            }
        }
        hull.push(p);
    }
    hull
}

/// `count` points evenly spaced on a circle.
pub fn circle_points(center: Position, radius: f64, count: usize) -> impl Iterator<Item = Position> {
    (0..count).map(move |i| {
        let angle = TAU * i as f64 / count as f64;
        Position::new(
            center.x + radius * angle.cos(),
            center.y + radius * angle.sin(),
        )
    })
}

fn midpoint(a: Position, b: Position) -> Position {
    a.lerp(b, 0.5)
}

/// Closed outline through the midpoints of consecutive hull points, using each
/// hull point as the quadratic control point.
pub fn smooth_closed_path(hull: &[Position]) -> Vec<PathSegment> {
    let n = hull.len();
    if n == 0 {
        return Vec::new();
    }
    let mut segments = Vec::with_capacity(n + 2);
    segments.push(PathSegment::MoveTo(midpoint(hull[n - 1], hull[0])));
    for i in 0..n {
        segments.push(PathSegment::QuadTo {
            ctrl: hull[i],
            to: midpoint(hull[i], hull[(i + 1) % n]),
        });
    }
    segments.push(PathSegment::Close);
    segments
}

pub fn bounds_of(points: &[Position]) -> Option<BoundingBox> {
    let first = points.first()?;
    let init = BoundingBox {
        x1: first.x,
        y1: first.y,
        x2: first.x,
        y2: first.y,
    };
    Some(points.iter().fold(init, |b, p| BoundingBox {
        x1: b.x1.min(p.x),
        y1: b.y1.min(p.y),
        x2: b.x2.max(p.x),
        y2: b.y2.max(p.y),
    }))
}

pub fn segments_to_svg(segments: &[PathSegment]) -> String {
    let mut d = String::new();
    for segment in segments {
        if !d.is_empty() {
            d.push(' ');
        }
        let _ = match segment {
            PathSegment::MoveTo(p) => write!(d, "M {:.2} {:.2}", p.x, p.y),
            PathSegment::QuadTo { ctrl, to } => {
                write!(d, "Q {:.2} {:.2} {:.2} {:.2}", ctrl.x, ctrl.y, to.x, to.y)
            }
            PathSegment::Close => write!(d, "Z"),
        };
    }
    d
}
