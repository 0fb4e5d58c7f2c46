//! Geometry model for map features.
//!
//! All coordinates are in map-projection units, never screen pixels.

use kurbo::{Affine, BezPath, Point, Rect, Shape, Vec2};
use serde::{Deserialize, Serialize};

/// A feature geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Point),
    LineString(Vec<Point>),
    /// Rings; the first ring is the outer boundary.
    Polygon(Vec<Vec<Point>>),
    MultiPoint(Vec<Point>),
    MultiLineString(Vec<Vec<Point>>),
    MultiPolygon(Vec<Vec<Vec<Point>>>),
}

/// Geometry type tag without coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryKind {
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
}

impl GeometryKind {
    /// Whether this kind has a length or boundary that can be measured and validated.
    pub fn is_linear_or_areal(self) -> bool {
        !matches!(self, GeometryKind::Point | GeometryKind::MultiPoint)
    }
}

impl Geometry {
    pub fn kind(&self) -> GeometryKind {
        match self {
            Geometry::Point(_) => GeometryKind::Point,
            Geometry::LineString(_) => GeometryKind::LineString,
            Geometry::Polygon(_) => GeometryKind::Polygon,
            Geometry::MultiPoint(_) => GeometryKind::MultiPoint,
            Geometry::MultiLineString(_) => GeometryKind::MultiLineString,
            Geometry::MultiPolygon(_) => GeometryKind::MultiPolygon,
        }
    }

    /// Ordered coordinate sequences making up this geometry.
    ///
    /// Points yield one single-coordinate sequence each; lines yield their
    /// coordinates; polygons yield every ring.
    pub fn sequences(&self) -> Vec<&[Point]> {
        match self {
            Geometry::Point(p) => vec![std::slice::from_ref(p)],
            Geometry::LineString(coords) => vec![coords.as_slice()],
            Geometry::Polygon(rings) => rings.iter().map(Vec::as_slice).collect(),
            Geometry::MultiPoint(points) => points.iter().map(std::slice::from_ref).collect(),
            Geometry::MultiLineString(lines) => lines.iter().map(Vec::as_slice).collect(),
            Geometry::MultiPolygon(polygons) => polygons
                .iter()
                .flat_map(|rings| rings.iter().map(Vec::as_slice))
                .collect(),
        }
    }

    /// Every vertex coordinate, flattened across parts and rings.
    pub fn vertices(&self) -> Vec<Point> {
        self.sequences().into_iter().flatten().copied().collect()
    }

    /// Every edge as a consecutive coordinate pair within a sequence.
    pub fn edges(&self) -> Vec<(Point, Point)> {
        self.sequences()
            .into_iter()
            .flat_map(|seq| seq.windows(2).map(|w| (w[0], w[1])))
            .collect()
    }

    /// Outer boundaries used for segment detection: line coordinates for
    /// linear types, outer rings for polygons.
    pub fn outlines(&self) -> Vec<&[Point]> {
        match self {
            Geometry::Point(_) | Geometry::MultiPoint(_) => Vec::new(),
            Geometry::LineString(coords) => vec![coords.as_slice()],
            Geometry::MultiLineString(lines) => lines.iter().map(Vec::as_slice).collect(),
            Geometry::Polygon(rings) => rings.first().map(Vec::as_slice).into_iter().collect(),
            Geometry::MultiPolygon(polygons) => polygons
                .iter()
                .filter_map(|rings| rings.first().map(Vec::as_slice))
                .collect(),
        }
    }

    /// First coordinate of the geometry, if any.
    pub fn first_coordinate(&self) -> Option<Point> {
        self.sequences()
            .into_iter()
            .find_map(|seq| seq.first().copied())
    }

    /// Bounding box in map units (None for empty geometries).
    pub fn bounds(&self) -> Option<Rect> {
        let mut iter = self.sequences().into_iter().flatten();
        let first = *iter.next()?;
        Some(iter.fold(Rect::from_points(first, first), |r, p| r.union_pt(*p)))
    }

    /// Apply an affine transform to every coordinate.
    pub fn transform(&mut self, affine: Affine) {
        let apply = |coords: &mut Vec<Point>| {
            for p in coords.iter_mut() {
                *p = affine * *p;
            }
        };
        match self {
            Geometry::Point(p) => *p = affine * *p,
            Geometry::LineString(coords) | Geometry::MultiPoint(coords) => apply(coords),
            Geometry::Polygon(rings) | Geometry::MultiLineString(rings) => {
                rings.iter_mut().for_each(apply)
            }
            Geometry::MultiPolygon(polygons) => polygons
                .iter_mut()
                .flat_map(|rings| rings.iter_mut())
                .for_each(apply),
        }
    }

    /// Translate by a map-unit offset.
    pub fn translate(&mut self, delta: Vec2) {
        self.transform(Affine::translate(delta));
    }
}

/// Combined bounding box of several geometries.
pub fn combined_bounds<'a>(geometries: impl IntoIterator<Item = &'a Geometry>) -> Option<Rect> {
    geometries
        .into_iter()
        .filter_map(Geometry::bounds)
        .reduce(|a, b| a.union(b))
}

/// Closed path through a ring's coordinates.
pub fn ring_path(ring: &[Point]) -> BezPath {
    let mut path = BezPath::new();
    let mut iter = ring.iter();
    if let Some(first) = iter.next() {
        path.move_to(*first);
        for p in iter {
            path.line_to(*p);
        }
        path.close_path();
    }
    path
}

/// Whether a ring encloses `point` (non-zero winding).
pub fn ring_contains(ring: &[Point], point: Point) -> bool {
    ring.len() >= 3 && ring_path(ring).winding(point) != 0
}

/// Unsigned planar area enclosed by a ring.
pub fn ring_area(ring: &[Point]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }
    ring_path(ring).area().abs()
}

/// Whether a polygon (outer ring minus holes) contains `point`.
pub fn polygon_contains(rings: &[Vec<Point>], point: Point) -> bool {
    match rings.split_first() {
        Some((outer, holes)) => {
            ring_contains(outer, point) && !holes.iter().any(|h| ring_contains(h, point))
        }
        None => false,
    }
}

/// Closest point to `point` on the segment `a`-`b`.
///
/// The projection parameter is clamped to `[0, 1]`; a zero-length segment
/// returns `a`.
pub fn closest_point_on_segment(point: Point, a: Point, b: Point) -> Point {
    let seg = b - a;
    let len_sq = seg.hypot2();
    if len_sq < f64::EPSILON {
        return a;
    }
    let t = ((point - a).dot(seg) / len_sq).clamp(0.0, 1.0);
    a + seg * t
}

/// Distance from a point to a line segment (a→b).
pub fn point_to_segment_dist(point: Point, a: Point, b: Point) -> f64 {
    point.distance(closest_point_on_segment(point, a, b))
}

/// Whether `point` lies on the segment `a`-`b` within `epsilon` map units.
pub fn point_on_segment(point: Point, a: Point, b: Point, epsilon: f64) -> bool {
    point_to_segment_dist(point, a, b) <= epsilon
}

/// Proper intersection point of segments a-b and c-d, if any.
///
/// Parallel and collinear segments never intersect here.
pub fn segment_intersection(a: Point, b: Point, c: Point, d: Point) -> Option<Point> {
    let r = b - a;
    let s = d - c;
    let denom = r.cross(s);
    if denom.abs() < f64::EPSILON {
        return None;
    }
    let qp = c - a;
    let t = qp.cross(s) / denom;
    let u = qp.cross(r) / denom;
    if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
        Some(a + r * t)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Geometry {
        Geometry::Polygon(vec![vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
            Point::new(0.0, 0.0),
        ]])
    }

    #[test]
    fn test_closest_point_clamped() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(10.0, 0.0);
        assert_eq!(closest_point_on_segment(Point::new(5.0, 3.0), a, b), Point::new(5.0, 0.0));
        assert_eq!(closest_point_on_segment(Point::new(-4.0, 1.0), a, b), a);
        assert_eq!(closest_point_on_segment(Point::new(14.0, -1.0), a, b), b);
    }

    #[test]
    fn test_closest_point_zero_length() {
        let a = Point::new(3.0, 3.0);
        assert_eq!(closest_point_on_segment(Point::new(9.0, 1.0), a, a), a);
    }

    #[test]
    fn test_polygon_vertices_and_edges() {
        let g = square();
        assert_eq!(g.vertices().len(), 5);
        assert_eq!(g.edges().len(), 4);
        assert_eq!(g.kind(), GeometryKind::Polygon);
    }

    #[test]
    fn test_point_has_no_edges() {
        let g = Geometry::MultiPoint(vec![Point::new(1.0, 1.0), Point::new(2.0, 2.0)]);
        assert_eq!(g.vertices().len(), 2);
        assert!(g.edges().is_empty());
    }

    #[test]
    fn test_multipolygon_flattens() {
        let Geometry::Polygon(rings) = square() else { unreachable!() };
        let g = Geometry::MultiPolygon(vec![rings.clone(), rings]);
        assert_eq!(g.vertices().len(), 10);
        assert_eq!(g.edges().len(), 8);
        assert_eq!(g.outlines().len(), 2);
    }

    #[test]
    fn test_bounds_and_translate() {
        let mut g = square();
        g.translate(Vec2::new(5.0, -5.0));
        let b = g.bounds().unwrap();
        assert_eq!(b, Rect::new(5.0, -5.0, 15.0, 5.0));
    }

    #[test]
    fn test_ring_area_and_contains() {
        let Geometry::Polygon(rings) = square() else { unreachable!() };
        assert!((ring_area(&rings[0]) - 100.0).abs() < 1e-9);
        assert!(polygon_contains(&rings, Point::new(5.0, 5.0)));
        assert!(!polygon_contains(&rings, Point::new(15.0, 5.0)));
    }

    #[test]
    fn test_segment_intersection() {
        let hit = segment_intersection(
            Point::new(0.0, 0.0),
            Point::new(2.0, 2.0),
            Point::new(0.0, 2.0),
            Point::new(2.0, 0.0),
        );
        assert_eq!(hit, Some(Point::new(1.0, 1.0)));

        let parallel = segment_intersection(
            Point::new(0.0, 0.0),
            Point::new(2.0, 0.0),
            Point::new(0.0, 1.0),
            Point::new(2.0, 1.0),
        );
        assert!(parallel.is_none());
    }

    #[test]
    fn test_geometry_serializes_tagged() {
        let g = Geometry::Point(Point::new(1.0, 2.0));
        let json = serde_json::to_value(&g).unwrap();
        assert_eq!(json["type"], "Point");
        let back: Geometry = serde_json::from_value(json).unwrap();
        assert_eq!(back, g);
    }
}
