//! Tile introspection: `to_json` and the geometry reports.
//!
//! These operations exist for debugging tiles: a structured dump of the
//! wire content, and per-feature findings for the OGC simplicity and
//! validity predicates with GeoJSON diagnostics attached.

use geo::MapCoords;
use geo_types::{Coord, Geometry};
use serde::Serialize;
use serde_json::json;

use crate::codec::decoder::{decode_commands, decode_features};
use crate::error::Result;
use crate::geojson::geometry_to_geojson;
use crate::geometry::validity::{check_validity, is_simple};
use crate::options::{ToJsonOptions, ValidityReportOptions};
use crate::projection::merc_to_lonlat;
use crate::tile::Tile;
use crate::validator::TileInfo;

/// A feature whose geometry fails the OGC simplicity predicate.
#[derive(Debug, Clone, Serialize)]
pub struct SimplicityFinding {
    pub layer: String,
    pub feature_id: Option<u64>,
}

/// A feature (or sub-geometry) that fails OGC validity.
#[derive(Debug, Clone, Serialize)]
pub struct ValidityFinding {
    pub message: String,
    pub layer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_id: Option<u64>,
    /// The offending geometry as a GeoJSON FeatureCollection, for layers
    /// whose content could be decoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geojson: Option<String>,
}

fn split_members(geometry: &Geometry<f64>) -> Vec<Geometry<f64>> {
    match geometry {
        Geometry::MultiPoint(points) => {
            points.iter().map(|p| Geometry::Point(*p)).collect()
        }
        Geometry::MultiLineString(lines) => lines
            .iter()
            .map(|line| Geometry::LineString(line.clone()))
            .collect(),
        Geometry::MultiPolygon(polygons) => polygons
            .iter()
            .map(|polygon| Geometry::Polygon(polygon.clone()))
            .collect(),
        Geometry::GeometryCollection(collection) => collection.iter().cloned().collect(),
        other => vec![other.clone()],
    }
}

fn diagnostic_geojson(geometry: &Geometry<f64>, id: Option<u64>) -> Option<String> {
    let wgs84 = geometry.map_coords(|coord| {
        let (lon, lat) = merc_to_lonlat(coord.x, coord.y).unwrap_or((f64::NAN, f64::NAN));
        Coord { x: lon, y: lat }
    });
    let mut feature = json!({
        "type": "Feature",
        "geometry": geometry_to_geojson(&wgs84),
        "properties": {},
    });
    if let Some(id) = id {
        feature["id"] = json!(id);
    }
    let collection = json!({"type": "FeatureCollection", "features": [feature]});
    serde_json::to_string(&collection).ok()
}

impl Tile {
    /// Structural report over a tile buffer; the static debugging entry
    /// point backing `info` diagnostics.
    pub fn info(bytes: &[u8]) -> TileInfo {
        crate::validator::info(bytes)
    }

    /// Dumps the tile's wire content as a structured JSON value.
    ///
    /// Geometry stays as the raw packed command array unless
    /// `decode_geometry` asks for coordinate arrays in grid space.
    pub fn to_json(&self, options: &ToJsonOptions) -> Result<serde_json::Value> {
        let mut layers = Vec::with_capacity(self.names().len());
        for name in self.names() {
            let raw = self.raw_layer(name)?;
            let mut features = Vec::with_capacity(raw.features.len());
            for feature in &raw.features {
                let mut properties = serde_json::Map::new();
                for pair in feature.tags.chunks_exact(2) {
                    if let (Some(key), Some(value)) = (
                        raw.keys.get(pair[0] as usize),
                        raw.values.get(pair[1] as usize),
                    ) {
                        properties.insert(key.clone(), value.to_json());
                    }
                }
                let mut out = json!({
                    "type": feature.geom_type.as_raw(),
                    "properties": properties,
                });
                if let Some(id) = feature.id {
                    out["id"] = json!(id);
                }
                if options.decode_geometry {
                    let decoded = decode_commands(&feature.geometry, feature.geom_type)?;
                    out["geometry"] = match decoded {
                        Some(grid) => grid_coordinate_arrays(&grid),
                        None => serde_json::Value::Null,
                    };
                } else if !feature.geometry.is_empty() {
                    out["geometry"] = json!(feature.geometry);
                }
                if let Some(raster) = &feature.raster {
                    out["raster"] = json!(raster);
                }
                features.push(out);
            }
            layers.push(json!({
                "name": raw.name,
                "extent": raw.extent,
                "version": raw.version,
                "features": features,
            }));
        }
        Ok(json!(layers))
    }

    /// Reports features whose decoded geometry is not OGC-simple.
    pub fn report_geometry_simplicity(&self) -> Result<Vec<SimplicityFinding>> {
        let mut findings = Vec::new();
        for name in self.names() {
            let raw = self.raw_layer(name)?;
            let features = decode_features(&raw, self.z(), self.x(), self.y(), None)?;
            for feature in features {
                let Some(geometry) = &feature.geometry else {
                    continue;
                };
                if !is_simple(geometry) {
                    findings.push(SimplicityFinding {
                        layer: name.clone(),
                        feature_id: feature.id,
                    });
                }
            }
        }
        Ok(findings)
    }

    /// Reports features whose decoded geometry is not OGC-valid, each with
    /// the offending geometry encoded as GeoJSON for diagnostics.
    ///
    /// Layers declaring a version beyond 2 are reported without decoding.
    pub fn report_geometry_validity(
        &self,
        options: &ValidityReportOptions,
    ) -> Result<Vec<ValidityFinding>> {
        let mut findings = Vec::new();
        for name in self.names() {
            let raw = self.raw_layer(name)?;
            if raw.version > 2 {
                findings.push(ValidityFinding {
                    message: "LAYER_HAS_UNSUPPORTED_VERSION".to_string(),
                    layer: name.clone(),
                    feature_id: None,
                    geojson: None,
                });
                continue;
            }
            let features = decode_features(&raw, self.z(), self.x(), self.y(), None)?;
            for feature in features {
                let Some(geometry) = &feature.geometry else {
                    continue;
                };
                let parts = if options.split_multi_features {
                    split_members(geometry)
                } else {
                    vec![geometry.clone()]
                };
                for part in parts {
                    if let Some(message) = check_validity(&part) {
                        findings.push(ValidityFinding {
                            message,
                            layer: name.clone(),
                            feature_id: feature.id,
                            geojson: diagnostic_geojson(&part, feature.id),
                        });
                    }
                }
            }
        }
        Ok(findings)
    }
}

fn coords_array(coords: &[Coord<f64>]) -> serde_json::Value {
    serde_json::Value::Array(
        coords
            .iter()
            .map(|c| json!([c.x as i64, c.y as i64]))
            .collect(),
    )
}

/// Grid-space coordinate arrays for `to_json` with `decode_geometry`.
fn grid_coordinate_arrays(geometry: &Geometry<f64>) -> serde_json::Value {
    match geometry {
        Geometry::Point(point) => json!([point.x() as i64, point.y() as i64]),
        Geometry::MultiPoint(points) => serde_json::Value::Array(
            points
                .iter()
                .map(|p| json!([p.x() as i64, p.y() as i64]))
                .collect(),
        ),
        Geometry::LineString(line) => coords_array(&line.0),
        Geometry::MultiLineString(lines) => serde_json::Value::Array(
            lines.iter().map(|line| coords_array(&line.0)).collect(),
        ),
        Geometry::Polygon(polygon) => {
            let mut rings = vec![coords_array(&polygon.exterior().0)];
            rings.extend(polygon.interiors().iter().map(|ring| coords_array(&ring.0)));
            serde_json::Value::Array(rings)
        }
        Geometry::MultiPolygon(polygons) => serde_json::Value::Array(
            polygons
                .iter()
                .map(|polygon| {
                    let mut rings = vec![coords_array(&polygon.exterior().0)];
                    rings.extend(
                        polygon.interiors().iter().map(|ring| coords_array(&ring.0)),
                    );
                    serde_json::Value::Array(rings)
                })
                .collect(),
        ),
        other => json!({ "unsupported": format!("{other:?}") }),
    }
}
