//! Point-to-geometry distance and containment predicates.
//!
//! These drive the query engine. Distances are Euclidean in whatever plane
//! the geometry lives in; the query engine calls them with mercator
//! coordinates so distances come out in meters.

use geo_types::{Geometry, LineString, Polygon};

/// Collections deeper than this are not searched further.
const MAX_COLLECTION_DEPTH: usize = 8;

/// Result of a point-to-geometry distance computation.
///
/// A negative `distance` means "no match": the geometry was empty,
/// degenerate, or (for polygons) did not contain the point.
#[derive(Debug, Clone, Copy)]
pub struct PointHit {
    pub distance: f64,
    pub x_hit: f64,
    pub y_hit: f64,
}

impl PointHit {
    fn miss() -> Self {
        PointHit {
            distance: -1.0,
            x_hit: 0.0,
            y_hit: 0.0,
        }
    }

    pub fn is_hit(&self) -> bool {
        self.distance >= 0.0
    }

    /// Keeps the strictly smaller hit so earlier members win ties.
    fn fold_min(&mut self, other: PointHit) {
        if other.distance >= 0.0 && (self.distance < 0.0 || other.distance < self.distance) {
            *self = other;
        }
    }
}

/// Euclidean distance from `(x, y)` to the segment `(x1, y1)-(x2, y2)`.
pub fn point_to_segment_distance(x: f64, y: f64, x1: f64, y1: f64, x2: f64, y2: f64) -> f64 {
    let dx = x2 - x1;
    let dy = y2 - y1;
    let length_sq = dx * dx + dy * dy;
    if length_sq == 0.0 {
        return ((x - x1).powi(2) + (y - y1).powi(2)).sqrt();
    }
    let t = (((x - x1) * dx + (y - y1) * dy) / length_sq).clamp(0.0, 1.0);
    let px = x1 + t * dx;
    let py = y1 + t * dy;
    ((x - px).powi(2) + (y - py).powi(2)).sqrt()
}

/// Ray-casting edge crossing test.
fn crosses(ax: f64, ay: f64, bx: f64, by: f64, x: f64, y: f64) -> bool {
    (ay > y) != (by > y) && x < (bx - ax) * (y - ay) / (by - ay) + ax
}

fn line_hit(line: &LineString<f64>, x: f64, y: f64) -> PointHit {
    let mut hit = PointHit::miss();
    let coords = &line.0;
    for window in coords.windows(2) {
        let (a, b) = (window[0], window[1]);
        let distance = point_to_segment_distance(x, y, a.x, a.y, b.x, b.y);
        if distance >= 0.0 && (hit.distance < 0.0 || distance < hit.distance) {
            // the hit point is the start of the first minimal segment
            hit = PointHit {
                distance,
                x_hit: a.x,
                y_hit: a.y,
            };
        }
    }
    hit
}

fn polygon_hit(polygon: &Polygon<f64>, x: f64, y: f64) -> PointHit {
    let mut inside = false;
    for (ring_index, ring) in std::iter::once(polygon.exterior())
        .chain(polygon.interiors().iter())
        .enumerate()
    {
        if ring.0.len() < 4 {
            if ring_index == 0 {
                return PointHit::miss();
            }
            continue;
        }
        for window in ring.0.windows(2) {
            if crosses(window[0].x, window[0].y, window[1].x, window[1].y, x, y) {
                inside = !inside;
            }
        }
        if ring_index == 0 && !inside {
            return PointHit::miss();
        }
    }
    if inside {
        PointHit {
            distance: 0.0,
            x_hit: x,
            y_hit: y,
        }
    } else {
        PointHit::miss()
    }
}

fn hit_at_depth(geometry: &Geometry<f64>, x: f64, y: f64, depth: usize) -> PointHit {
    match geometry {
        Geometry::Point(point) => PointHit {
            distance: ((x - point.x()).powi(2) + (y - point.y()).powi(2)).sqrt(),
            x_hit: point.x(),
            y_hit: point.y(),
        },
        Geometry::MultiPoint(points) => {
            let mut hit = PointHit::miss();
            for point in points.iter() {
                hit.fold_min(hit_at_depth(&Geometry::Point(*point), x, y, depth));
            }
            hit
        }
        Geometry::Line(line) => line_hit(&LineString::from(vec![line.start, line.end]), x, y),
        Geometry::LineString(line) => line_hit(line, x, y),
        Geometry::MultiLineString(lines) => {
            let mut hit = PointHit::miss();
            for line in lines.iter() {
                hit.fold_min(line_hit(line, x, y));
            }
            hit
        }
        Geometry::Polygon(polygon) => polygon_hit(polygon, x, y),
        Geometry::MultiPolygon(polygons) => {
            let mut hit = PointHit::miss();
            for polygon in polygons.iter() {
                hit.fold_min(polygon_hit(polygon, x, y));
            }
            hit
        }
        Geometry::Rect(rect) => polygon_hit(&rect.to_polygon(), x, y),
        Geometry::Triangle(triangle) => polygon_hit(&triangle.to_polygon(), x, y),
        Geometry::GeometryCollection(collection) => {
            if depth >= MAX_COLLECTION_DEPTH {
                log::warn!("geometry collection deeper than {MAX_COLLECTION_DEPTH}, truncating");
                return PointHit::miss();
            }
            let mut hit = PointHit::miss();
            for member in collection.iter() {
                hit.fold_min(hit_at_depth(member, x, y, depth + 1));
            }
            hit
        }
    }
}

/// Distance record from `(x, y)` to `geometry`.
///
/// Points use Euclidean distance; lines the minimum over all segments with
/// the hit at the first minimal segment's start; polygons require
/// containment and report distance zero with the query point as the hit.
/// Multi geometries and collections take the minimum, earlier members
/// winning ties.
pub fn point_to_geometry_distance(geometry: &Geometry<f64>, x: f64, y: f64) -> PointHit {
    hit_at_depth(geometry, x, y, 0)
}

#[cfg(test)]
mod tests {
    use geo_types::{Coord, GeometryCollection, MultiLineString, MultiPoint, Point};

    use super::*;

    fn unit_square() -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![
                Coord { x: 0.0, y: 0.0 },
                Coord { x: 10.0, y: 0.0 },
                Coord { x: 10.0, y: 10.0 },
                Coord { x: 0.0, y: 10.0 },
                Coord { x: 0.0, y: 0.0 },
            ]),
            vec![],
        )
    }

    #[test]
    fn point_distance_is_euclidean() {
        let hit = point_to_geometry_distance(&Geometry::Point(Point::new(3.0, 4.0)), 0.0, 0.0);
        assert_eq!(hit.distance, 5.0);
        assert_eq!((hit.x_hit, hit.y_hit), (3.0, 4.0));
    }

    #[test]
    fn segment_distance_clamps_to_endpoints() {
        assert_eq!(point_to_segment_distance(-3.0, 0.0, 0.0, 0.0, 10.0, 0.0), 3.0);
        assert_eq!(point_to_segment_distance(5.0, 2.0, 0.0, 0.0, 10.0, 0.0), 2.0);
        assert_eq!(point_to_segment_distance(13.0, 0.0, 0.0, 0.0, 10.0, 0.0), 3.0);
    }

    #[test]
    fn line_hit_reports_first_minimal_segment_start() {
        let line = LineString::from(vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 10.0, y: 0.0 },
            Coord { x: 10.0, y: 10.0 },
        ]);
        let hit = point_to_geometry_distance(&Geometry::LineString(line), 5.0, 1.0);
        assert_eq!(hit.distance, 1.0);
        assert_eq!((hit.x_hit, hit.y_hit), (0.0, 0.0));
    }

    #[test]
    fn polygon_containment_is_distance_zero() {
        let hit = point_to_geometry_distance(&Geometry::Polygon(unit_square()), 5.0, 5.0);
        assert_eq!(hit.distance, 0.0);
        assert_eq!((hit.x_hit, hit.y_hit), (5.0, 5.0));
    }

    #[test]
    fn polygon_outside_is_a_miss() {
        let hit = point_to_geometry_distance(&Geometry::Polygon(unit_square()), 15.0, 5.0);
        assert!(!hit.is_hit());
    }

    #[test]
    fn polygon_hole_excludes_point() {
        let with_hole = Polygon::new(
            unit_square().exterior().clone(),
            vec![LineString::from(vec![
                Coord { x: 4.0, y: 4.0 },
                Coord { x: 4.0, y: 6.0 },
                Coord { x: 6.0, y: 6.0 },
                Coord { x: 6.0, y: 4.0 },
                Coord { x: 4.0, y: 4.0 },
            ])],
        );
        let geometry = Geometry::Polygon(with_hole);
        assert!(!point_to_geometry_distance(&geometry, 5.0, 5.0).is_hit());
        assert!(point_to_geometry_distance(&geometry, 2.0, 2.0).is_hit());
    }

    #[test]
    fn short_exterior_ring_is_a_miss() {
        let degenerate = Polygon::new(
            LineString::from(vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 1.0 }]),
            vec![],
        );
        assert!(!point_to_geometry_distance(&Geometry::Polygon(degenerate), 0.5, 0.5).is_hit());
    }

    #[test]
    fn multi_point_takes_minimum() {
        let points = MultiPoint::from(vec![Point::new(10.0, 0.0), Point::new(2.0, 0.0)]);
        let hit = point_to_geometry_distance(&Geometry::MultiPoint(points), 0.0, 0.0);
        assert_eq!(hit.distance, 2.0);
        assert_eq!(hit.x_hit, 2.0);
    }

    #[test]
    fn earlier_member_wins_ties() {
        let lines = MultiLineString::new(vec![
            LineString::from(vec![Coord { x: 0.0, y: 1.0 }, Coord { x: 10.0, y: 1.0 }]),
            LineString::from(vec![Coord { x: 0.0, y: -1.0 }, Coord { x: 10.0, y: -1.0 }]),
        ]);
        let hit = point_to_geometry_distance(&Geometry::MultiLineString(lines), 5.0, 0.0);
        assert_eq!(hit.distance, 1.0);
        assert_eq!(hit.y_hit, 1.0);
    }

    #[test]
    fn collection_recurses() {
        let collection = GeometryCollection::from(vec![
            Geometry::Point(Point::new(100.0, 100.0)),
            Geometry::Polygon(unit_square()),
        ]);
        let hit =
            point_to_geometry_distance(&Geometry::GeometryCollection(collection), 5.0, 5.0);
        assert_eq!(hit.distance, 0.0);
    }
}
