//! OGC simplicity and validity predicates.
//!
//! These back the geometry report operations. `check_validity` returns the
//! reason a geometry is invalid so the report can attach a diagnostic
//! message; `is_simple` is the boolean OGC simple-features predicate.

use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo_types::{Geometry, Line, LineString, MultiPolygon, Polygon};

use super::signed_area;

fn segments(ring: &LineString<f64>) -> Vec<Line<f64>> {
    ring.0
        .windows(2)
        .filter(|window| window[0] != window[1])
        .map(|window| Line::new(window[0], window[1]))
        .collect()
}

/// True when a chain of segments only touches itself at shared endpoints.
///
/// `closed` allows the first and last segment to meet at the closure point.
fn chain_is_simple(ring: &LineString<f64>, closed: bool) -> bool {
    let segs = segments(ring);
    for i in 0..segs.len() {
        for j in (i + 1)..segs.len() {
            let Some(hit) = line_intersection(segs[i], segs[j]) else {
                continue;
            };
            let adjacent = j == i + 1 || (closed && i == 0 && j == segs.len() - 1);
            match hit {
                LineIntersection::SinglePoint { is_proper, .. } => {
                    if is_proper || !adjacent {
                        return false;
                    }
                }
                LineIntersection::Collinear { .. } => return false,
            }
        }
    }
    true
}

fn ring_is_closed(ring: &LineString<f64>) -> bool {
    ring.0.len() >= 2 && ring.0.first() == ring.0.last()
}

fn point_in_ring(ring: &LineString<f64>, x: f64, y: f64) -> bool {
    let mut inside = false;
    for window in ring.0.windows(2) {
        let (a, b) = (window[0], window[1]);
        if (a.y > y) != (b.y > y) && x < (b.x - a.x) * (y - a.y) / (b.y - a.y) + a.x {
            inside = !inside;
        }
    }
    inside
}

fn rings_cross(a: &LineString<f64>, b: &LineString<f64>) -> bool {
    for sa in segments(a) {
        for sb in segments(b) {
            if let Some(LineIntersection::SinglePoint { is_proper: true, .. }) =
                line_intersection(sa, sb)
            {
                return true;
            }
        }
    }
    false
}

fn check_polygon(polygon: &Polygon<f64>) -> Option<String> {
    let rings: Vec<&LineString<f64>> = std::iter::once(polygon.exterior())
        .chain(polygon.interiors().iter())
        .collect();
    for ring in &rings {
        if ring.0.len() < 4 {
            return Some("Geometry has too few points".to_string());
        }
        if !ring_is_closed(ring) {
            return Some("Geometry has rings which are not closed".to_string());
        }
        if !chain_is_simple(ring, true) {
            return Some("Geometry has invalid self-intersections".to_string());
        }
        if signed_area(ring) == 0.0 {
            return Some("Geometry has a ring with zero area".to_string());
        }
    }
    for interior in polygon.interiors() {
        let inside = interior
            .0
            .first()
            .is_some_and(|pt| point_in_ring(polygon.exterior(), pt.x, pt.y));
        if !inside {
            return Some("Geometry has interior rings outside of the exterior ring".to_string());
        }
    }
    for i in 0..rings.len() {
        for j in (i + 1)..rings.len() {
            if rings_cross(rings[i], rings[j]) {
                return Some("Geometry has rings which cross each other".to_string());
            }
        }
    }
    None
}

fn check_multi_polygon(polygons: &MultiPolygon<f64>) -> Option<String> {
    polygons.iter().find_map(check_polygon)
}

/// Returns the reason a geometry violates OGC validity, or `None` when it
/// is valid.
pub fn check_validity(geometry: &Geometry<f64>) -> Option<String> {
    match geometry {
        Geometry::Point(point) => {
            (!point.x().is_finite() || !point.y().is_finite())
                .then(|| "Geometry has non-finite coordinates".to_string())
        }
        Geometry::MultiPoint(_) => None,
        Geometry::Line(_) => None,
        Geometry::LineString(line) => {
            let mut distinct = line.0.clone();
            distinct.dedup();
            (distinct.len() < 2).then(|| "Geometry has too few points".to_string())
        }
        Geometry::MultiLineString(lines) => lines.iter().find_map(|line| {
            check_validity(&Geometry::LineString(line.clone()))
        }),
        Geometry::Polygon(polygon) => check_polygon(polygon),
        Geometry::MultiPolygon(polygons) => check_multi_polygon(polygons),
        Geometry::Rect(rect) => check_polygon(&rect.to_polygon()),
        Geometry::Triangle(triangle) => check_polygon(&triangle.to_polygon()),
        Geometry::GeometryCollection(collection) => collection.iter().find_map(check_validity),
    }
}

/// OGC validity predicate.
pub fn is_valid(geometry: &Geometry<f64>) -> bool {
    check_validity(geometry).is_none()
}

/// OGC simplicity predicate.
pub fn is_simple(geometry: &Geometry<f64>) -> bool {
    match geometry {
        Geometry::Point(_) | Geometry::Line(_) => true,
        Geometry::MultiPoint(points) => {
            let mut seen: Vec<_> = points.iter().map(|p| (p.x().to_bits(), p.y().to_bits())).collect();
            seen.sort_unstable();
            seen.windows(2).all(|pair| pair[0] != pair[1])
        }
        Geometry::LineString(line) => chain_is_simple(line, ring_is_closed(line)),
        Geometry::MultiLineString(lines) => lines
            .iter()
            .all(|line| chain_is_simple(line, ring_is_closed(line))),
        Geometry::Polygon(polygon) => std::iter::once(polygon.exterior())
            .chain(polygon.interiors().iter())
            .all(|ring| chain_is_simple(ring, true)),
        Geometry::MultiPolygon(polygons) => polygons
            .iter()
            .all(|polygon| is_simple(&Geometry::Polygon(polygon.clone()))),
        Geometry::Rect(_) | Geometry::Triangle(_) => true,
        Geometry::GeometryCollection(collection) => collection.iter().all(is_simple),
    }
}

#[cfg(test)]
mod tests {
    use geo_types::{Coord, MultiPoint, Point};

    use super::*;

    fn square() -> LineString<f64> {
        LineString::from(vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 10.0, y: 0.0 },
            Coord { x: 10.0, y: 10.0 },
            Coord { x: 0.0, y: 10.0 },
            Coord { x: 0.0, y: 0.0 },
        ])
    }

    fn bowtie() -> LineString<f64> {
        LineString::from(vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 10.0, y: 10.0 },
            Coord { x: 10.0, y: 0.0 },
            Coord { x: 0.0, y: 10.0 },
            Coord { x: 0.0, y: 0.0 },
        ])
    }

    #[test]
    fn square_is_simple_and_valid() {
        let polygon = Geometry::Polygon(Polygon::new(square(), vec![]));
        assert!(is_simple(&polygon));
        assert!(is_valid(&polygon));
    }

    #[test]
    fn bowtie_is_neither() {
        let polygon = Geometry::Polygon(Polygon::new(bowtie(), vec![]));
        assert!(!is_simple(&polygon));
        assert_eq!(
            check_validity(&polygon),
            Some("Geometry has invalid self-intersections".to_string())
        );
    }

    #[test]
    fn self_crossing_line_is_not_simple() {
        let line = Geometry::LineString(LineString::from(vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 10.0, y: 10.0 },
            Coord { x: 10.0, y: 0.0 },
            Coord { x: 0.0, y: 10.0 },
        ]));
        assert!(!is_simple(&line));
        // a crossing does not make a bare linestring invalid
        assert!(is_valid(&line));
    }

    #[test]
    fn closed_ring_linestring_is_simple() {
        assert!(is_simple(&Geometry::LineString(square())));
    }

    #[test]
    fn unclosed_polygon_ring_is_invalid() {
        let open = LineString::from(vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 10.0, y: 0.0 },
            Coord { x: 10.0, y: 10.0 },
            Coord { x: 0.0, y: 10.0 },
        ]);
        let polygon = Geometry::Polygon(Polygon::new(open, vec![]));
        assert_eq!(
            check_validity(&polygon),
            Some("Geometry has rings which are not closed".to_string())
        );
    }

    #[test]
    fn hole_outside_exterior_is_invalid() {
        let stray_hole = LineString::from(vec![
            Coord { x: 20.0, y: 20.0 },
            Coord { x: 24.0, y: 20.0 },
            Coord { x: 24.0, y: 24.0 },
            Coord { x: 20.0, y: 24.0 },
            Coord { x: 20.0, y: 20.0 },
        ]);
        let polygon = Geometry::Polygon(Polygon::new(square(), vec![stray_hole]));
        assert_eq!(
            check_validity(&polygon),
            Some("Geometry has interior rings outside of the exterior ring".to_string())
        );
    }

    #[test]
    fn degenerate_line_is_invalid() {
        let line = Geometry::LineString(LineString::from(vec![
            Coord { x: 1.0, y: 1.0 },
            Coord { x: 1.0, y: 1.0 },
        ]));
        assert_eq!(
            check_validity(&line),
            Some("Geometry has too few points".to_string())
        );
    }

    #[test]
    fn duplicate_multi_point_is_not_simple() {
        let points = MultiPoint::from(vec![
            Point::new(1.0, 1.0),
            Point::new(2.0, 2.0),
            Point::new(1.0, 1.0),
        ]);
        assert!(!is_simple(&Geometry::MultiPoint(points)));
    }
}
