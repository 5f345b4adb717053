//! Distance calculation algorithms for DRC
//!
//! Contains triangle, segment, point and polygon distance calculations.

use crate::board::{Point, Polygon, Shape};

#[derive(Clone, Debug, PartialEq)]
pub struct Triangle {
    pub v0: Point,
    pub v1: Point,
    pub v2: Point,
}

impl Triangle {
    pub fn from_vertices(v0: Point, v1: Point, v2: Point) -> Self {
        Self { v0, v1, v2 }
    }

    pub fn contains_point(&self, p: Point) -> bool {
        let d1 = cross(self.v0, self.v1, p);
        let d2 = cross(self.v1, self.v2, p);
        let d3 = cross(self.v2, self.v0, p);
        let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
        let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
        !(has_neg && has_pos)
    }

    /// Zero inside, otherwise distance to the nearest edge
    pub fn distance_to_point(&self, p: Point) -> f64 {
        if self.contains_point(p) {
            return 0.0;
        }
        [(self.v0, self.v1), (self.v1, self.v2), (self.v2, self.v0)]
            .iter()
            .map(|(a, b)| point_segment_distance(p, *a, *b).0)
            .fold(f64::MAX, f64::min)
    }
}

/// Signed area of the parallelogram (a->b, a->p)
fn cross(a: Point, b: Point, p: Point) -> f64 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

/// Point-to-segment minimum distance and the closest point on the segment
pub fn point_segment_distance(p: Point, a: Point, b: Point) -> (f64, Point) {
    let ab = [b.x - a.x, b.y - a.y];
    let ap = [p.x - a.x, p.y - a.y];
    let ab_len2 = ab[0] * ab[0] + ab[1] * ab[1];

    if ab_len2 < 1e-18 {
        // Degenerate segment
        return (p.distance(&a), a);
    }

    let t = ((ap[0] * ab[0] + ap[1] * ab[1]) / ab_len2).clamp(0.0, 1.0);
    let closest = Point::new(a.x + t * ab[0], a.y + t * ab[1]);
    (p.distance(&closest), closest)
}

/// Whether segments a1-a2 and b1-b2 share at least one point
pub fn segments_intersect(a1: Point, a2: Point, b1: Point, b2: Point) -> bool {
    let d1 = cross(b1, b2, a1);
    let d2 = cross(b1, b2, a2);
    let d3 = cross(a1, a2, b1);
    let d4 = cross(a1, a2, b2);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    // Collinear / touching cases
    let on_segment = |p: Point, q: Point, r: Point| {
        r.x >= p.x.min(q.x) && r.x <= p.x.max(q.x) && r.y >= p.y.min(q.y) && r.y <= p.y.max(q.y)
    };
    (d1 == 0.0 && on_segment(b1, b2, a1))
        || (d2 == 0.0 && on_segment(b1, b2, a2))
        || (d3 == 0.0 && on_segment(a1, a2, b1))
        || (d4 == 0.0 && on_segment(a1, a2, b2))
}

/// Segment-to-segment minimum distance (zero when they cross)
pub fn segment_distance(a1: Point, a2: Point, b1: Point, b2: Point) -> f64 {
    if segments_intersect(a1, a2, b1, b2) {
        return 0.0;
    }
    [
        point_segment_distance(a1, b1, b2).0,
        point_segment_distance(a2, b1, b2).0,
        point_segment_distance(b1, a1, a2).0,
        point_segment_distance(b2, a1, a2).0,
    ]
    .into_iter()
    .fold(f64::MAX, f64::min)
}

/// Even-odd ray cast against a single ring
fn ring_contains(ring: &[Point], p: Point) -> bool {
    let mut inside = false;
    let n = ring.len();
    if n < 3 {
        return false;
    }
    let mut j = n - 1;
    for i in 0..n {
        let (pi, pj) = (ring[i], ring[j]);
        if (pi.y > p.y) != (pj.y > p.y) && p.x < (pj.x - pi.x) * (p.y - pi.y) / (pj.y - pi.y) + pi.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Inside the outer ring and outside every hole
pub fn point_in_polygon(p: Point, poly: &Polygon) -> bool {
    ring_contains(&poly.outer_ring, p) && !poly.holes.iter().any(|h| ring_contains(h, p))
}

/// Every edge of the polygon, outer ring and holes, as closed loops
pub fn polygon_edges(poly: &Polygon) -> impl Iterator<Item = (Point, Point)> + '_ {
    std::iter::once(&poly.outer_ring)
        .chain(poly.holes.iter())
        .filter(|ring| ring.len() >= 2)
        .flat_map(|ring| {
            ring.iter()
                .zip(ring.iter().cycle().skip(1))
                .map(|(a, b)| (*a, *b))
        })
}

/// Zero inside the polygon, otherwise distance to its boundary
pub fn point_polygon_distance(p: Point, poly: &Polygon) -> f64 {
    if point_in_polygon(p, poly) {
        return 0.0;
    }
    polygon_edges(poly)
        .map(|(a, b)| point_segment_distance(p, a, b).0)
        .fold(f64::MAX, f64::min)
}

/// Zero when the segment touches the polygon area, otherwise distance to
/// its boundary
pub fn segment_polygon_distance(a: Point, b: Point, poly: &Polygon) -> f64 {
    if point_in_polygon(a, poly) || point_in_polygon(b, poly) {
        return 0.0;
    }
    polygon_edges(poly)
        .map(|(e1, e2)| segment_distance(a, b, e1, e2))
        .fold(f64::MAX, f64::min)
}

/// Whether a segment inflated by `clearance` reaches the polygon area.
/// Compares squared distances; a segment inside the area always collides.
pub fn segment_collides_polygon(a: Point, b: Point, clearance: f64, poly: &Polygon) -> bool {
    let d = segment_polygon_distance(a, b, poly);
    d == 0.0 || d * d < clearance * clearance
}

/// Per-shape distance to a point, clamped at zero: segment distance minus
/// half-width for tracks, center distance minus radius for circles, and
/// boundary distance for areas
pub fn shape_point_distance(shape: &Shape, p: Point) -> f64 {
    let d = match shape {
        Shape::Segment { start, end, width } => point_segment_distance(p, *start, *end).0 - width / 2.0,
        Shape::Circle { center, radius } => p.distance(center) - radius,
        Shape::Ring { center, radius, width } => (p.distance(center) - radius).abs() - width / 2.0,
        Shape::Polygon(poly) => point_polygon_distance(p, poly),
        Shape::Outline { polygon, width } => {
            polygon_edges(polygon)
                .map(|(a, b)| point_segment_distance(p, a, b).0)
                .fold(f64::MAX, f64::min)
                - width / 2.0
        }
        Shape::Triangle(t) => Triangle::from_vertices(t[0], t[1], t[2]).distance_to_point(p),
    };
    d.max(0.0)
}
