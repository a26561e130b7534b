//! Douglas-Peucker simplification over the tile grid.
//!
//! Runs after clipping and before quantization, with the tolerance in grid
//! units so the result is independent of latitude and zoom. A tolerance of
//! zero disables simplification.

use geo::Simplify;
use geo_types::{Geometry, GeometryCollection, LineString, MultiLineString, MultiPolygon, Polygon};

fn simplify_line(line: &LineString<f64>, tolerance: f64) -> LineString<f64> {
    if line.0.len() < 3 {
        return line.clone();
    }
    line.simplify(&tolerance)
}

fn simplify_polygon(polygon: &Polygon<f64>, tolerance: f64) -> Polygon<f64> {
    Polygon::new(
        simplify_line(polygon.exterior(), tolerance),
        polygon
            .interiors()
            .iter()
            .map(|ring| simplify_line(ring, tolerance))
            .collect(),
    )
}

/// Simplifies line and polygon vertices with the given grid tolerance.
///
/// Points pass through unchanged; so does everything when `tolerance` is
/// zero.
pub fn simplify_geometry(geometry: &Geometry<f64>, tolerance: f64) -> Geometry<f64> {
    if tolerance <= 0.0 {
        return geometry.clone();
    }
    match geometry {
        Geometry::LineString(line) => Geometry::LineString(simplify_line(line, tolerance)),
        Geometry::MultiLineString(lines) => Geometry::MultiLineString(MultiLineString::new(
            lines.iter().map(|line| simplify_line(line, tolerance)).collect(),
        )),
        Geometry::Polygon(polygon) => Geometry::Polygon(simplify_polygon(polygon, tolerance)),
        Geometry::MultiPolygon(polygons) => Geometry::MultiPolygon(MultiPolygon::new(
            polygons
                .iter()
                .map(|polygon| simplify_polygon(polygon, tolerance))
                .collect(),
        )),
        Geometry::GeometryCollection(collection) => {
            Geometry::GeometryCollection(GeometryCollection::from(
                collection
                    .iter()
                    .map(|member| simplify_geometry(member, tolerance))
                    .collect::<Vec<_>>(),
            ))
        }
        other => other.clone(),
    }
}
