//! Clipping to a tile's buffered extent.
//!
//! Points are kept or dropped by containment; lines are cut against the
//! extent rectangle; polygons are intersected with it so ring topology
//! stays intact. Everything happens in mercator space before grid
//! quantization.

use geo::{BooleanOps, BoundingRect};
use geo_types::{
    Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon,
    Point, Polygon, Rect,
};

fn bounds_rect(bounds: [f64; 4]) -> Rect<f64> {
    Rect::new(
        Coord {
            x: bounds[0],
            y: bounds[1],
        },
        Coord {
            x: bounds[2],
            y: bounds[3],
        },
    )
}

fn rect_intersects(rect: &Rect<f64>, bounds: [f64; 4]) -> bool {
    rect.max().x >= bounds[0]
        && rect.min().x <= bounds[2]
        && rect.max().y >= bounds[1]
        && rect.min().y <= bounds[3]
}

fn contains_point(bounds: [f64; 4], point: &Point<f64>) -> bool {
    point.x() >= bounds[0]
        && point.x() <= bounds[2]
        && point.y() >= bounds[1]
        && point.y() <= bounds[3]
}

fn clip_lines(lines: &MultiLineString<f64>, bounds: [f64; 4]) -> Option<Geometry<f64>> {
    if let Some(rect) = lines.bounding_rect() {
        if !rect_intersects(&rect, bounds) {
            return None;
        }
    }
    let window = bounds_rect(bounds).to_polygon();
    let mut clipped = window.clip(lines, false);
    clipped.0.retain(|line| line.0.len() >= 2);
    match clipped.0.len() {
        0 => None,
        1 => Some(Geometry::LineString(clipped.0.remove(0))),
        _ => Some(Geometry::MultiLineString(clipped)),
    }
}

fn clip_polygons(polygons: &MultiPolygon<f64>, bounds: [f64; 4]) -> Option<Geometry<f64>> {
    if let Some(rect) = polygons.bounding_rect() {
        if !rect_intersects(&rect, bounds) {
            return None;
        }
        // fully inside: intersection would only perturb the coordinates
        if rect.min().x >= bounds[0]
            && rect.min().y >= bounds[1]
            && rect.max().x <= bounds[2]
            && rect.max().y <= bounds[3]
        {
            return Some(collapse_polygons(polygons.clone()));
        }
    }
    let window = MultiPolygon::new(vec![bounds_rect(bounds).to_polygon()]);
    let clipped = polygons.intersection(&window);
    if clipped.0.is_empty() {
        None
    } else {
        Some(collapse_polygons(clipped))
    }
}

fn collapse_polygons(mut polygons: MultiPolygon<f64>) -> Geometry<f64> {
    if polygons.0.len() == 1 {
        Geometry::Polygon(polygons.0.remove(0))
    } else {
        Geometry::MultiPolygon(polygons)
    }
}

/// Clips a geometry to `bounds = [minx, miny, maxx, maxy]`.
///
/// Returns `None` when nothing of the geometry survives. Multi geometries
/// may collapse to their single-member form.
pub fn clip_geometry(geometry: &Geometry<f64>, bounds: [f64; 4]) -> Option<Geometry<f64>> {
    match geometry {
        Geometry::Point(point) => contains_point(bounds, point).then(|| Geometry::Point(*point)),
        Geometry::MultiPoint(points) => {
            let kept: Vec<Point<f64>> = points
                .iter()
                .copied()
                .filter(|point| contains_point(bounds, point))
                .collect();
            match kept.len() {
                0 => None,
                1 => Some(Geometry::Point(kept[0])),
                _ => Some(Geometry::MultiPoint(MultiPoint::from(kept))),
            }
        }
        Geometry::Line(line) => clip_lines(
            &MultiLineString::new(vec![LineString::from(vec![line.start, line.end])]),
            bounds,
        ),
        Geometry::LineString(line) => {
            clip_lines(&MultiLineString::new(vec![line.clone()]), bounds)
        }
        Geometry::MultiLineString(lines) => clip_lines(lines, bounds),
        Geometry::Polygon(polygon) => {
            clip_polygons(&MultiPolygon::new(vec![polygon.clone()]), bounds)
        }
        Geometry::MultiPolygon(polygons) => clip_polygons(polygons, bounds),
        Geometry::Rect(rect) => {
            clip_polygons(&MultiPolygon::new(vec![rect.to_polygon()]), bounds)
        }
        Geometry::Triangle(triangle) => {
            clip_polygons(&MultiPolygon::new(vec![triangle.to_polygon()]), bounds)
        }
        Geometry::GeometryCollection(collection) => {
            let kept: Vec<Geometry<f64>> = collection
                .iter()
                .filter_map(|member| clip_geometry(member, bounds))
                .collect();
            if kept.is_empty() {
                None
            } else {
                Some(Geometry::GeometryCollection(GeometryCollection::from(
                    kept,
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUNDS: [f64; 4] = [0.0, 0.0, 10.0, 10.0];

    fn square(minx: f64, miny: f64, size: f64) -> Polygon<f64> {
        Rect::new(
            Coord { x: minx, y: miny },
            Coord {
                x: minx + size,
                y: miny + size,
            },
        )
        .to_polygon()
    }

    #[test]
    fn point_inside_survives() {
        let clipped = clip_geometry(&Geometry::Point(Point::new(5.0, 5.0)), BOUNDS);
        assert!(matches!(clipped, Some(Geometry::Point(_))));
    }

    #[test]
    fn point_outside_is_dropped() {
        assert!(clip_geometry(&Geometry::Point(Point::new(15.0, 5.0)), BOUNDS).is_none());
    }

    #[test]
    fn point_on_boundary_survives() {
        assert!(clip_geometry(&Geometry::Point(Point::new(10.0, 5.0)), BOUNDS).is_some());
    }

    #[test]
    fn crossing_line_is_cut() {
        let line = LineString::from(vec![
            Coord { x: -5.0, y: 5.0 },
            Coord { x: 15.0, y: 5.0 },
        ]);
        let clipped = clip_geometry(&Geometry::LineString(line), BOUNDS).unwrap();
        let Geometry::LineString(cut) = clipped else {
            panic!("expected a linestring");
        };
        for coord in cut.0 {
            assert!(coord.x >= 0.0 && coord.x <= 10.0);
        }
    }

    #[test]
    fn disjoint_line_is_dropped() {
        let line = LineString::from(vec![
            Coord { x: 20.0, y: 20.0 },
            Coord { x: 30.0, y: 30.0 },
        ]);
        assert!(clip_geometry(&Geometry::LineString(line), BOUNDS).is_none());
    }

    #[test]
    fn straddling_polygon_is_trimmed() {
        let polygon = square(-5.0, -5.0, 10.0);
        let clipped = clip_geometry(&Geometry::Polygon(polygon), BOUNDS).unwrap();
        let Geometry::Polygon(trimmed) = clipped else {
            panic!("expected a polygon");
        };
        for coord in trimmed.exterior().coords() {
            assert!(coord.x >= -1e-9 && coord.x <= 10.0 + 1e-9);
            assert!(coord.y >= -1e-9 && coord.y <= 10.0 + 1e-9);
        }
    }

    #[test]
    fn interior_polygon_is_untouched() {
        let polygon = square(2.0, 2.0, 4.0);
        let clipped = clip_geometry(&Geometry::Polygon(polygon.clone()), BOUNDS).unwrap();
        assert_eq!(clipped, Geometry::Polygon(polygon));
    }

    #[test]
    fn multipoint_collapses_to_point() {
        let points = MultiPoint::from(vec![Point::new(5.0, 5.0), Point::new(50.0, 50.0)]);
        let clipped = clip_geometry(&Geometry::MultiPoint(points), BOUNDS).unwrap();
        assert!(matches!(clipped, Geometry::Point(_)));
    }

    #[test]
    fn collection_keeps_surviving_members() {
        let collection = GeometryCollection::from(vec![
            Geometry::Point(Point::new(5.0, 5.0)),
            Geometry::Point(Point::new(50.0, 50.0)),
        ]);
        let clipped =
            clip_geometry(&Geometry::GeometryCollection(collection), BOUNDS).unwrap();
        let Geometry::GeometryCollection(kept) = clipped else {
            panic!("expected a collection");
        };
        assert_eq!(kept.len(), 1);
    }
}
