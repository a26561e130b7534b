//! GeoJSON ingest and emission.
//!
//! Ingest drives the geozero GeoJSON reader into `geo-types` geometry,
//! reprojects WGS84 input to mercator, and runs it through the encoder
//! pipeline. Emission decodes layers and writes GeoJSON with coordinates
//! back-projected to lon/lat.

use std::collections::HashMap;

use geo::MapCoords;
use geo_types::{Coord, Geometry};
use geozero::error::GeozeroError;
use geozero::geo_types::GeoWriter;
use geozero::geojson::GeoJson;
use geozero::{ColumnValue, FeatureProcessor, GeomProcessor, GeozeroDatasource, PropertyProcessor};
use serde_json::json;

use crate::codec::encoder::{GeometryPipeline, LayerBuilder};
use crate::codec::{Feature, Value};
use crate::coords::GridTransform;
use crate::error::{Error, Result};
use crate::options::EncodeOptions;
use crate::projection::{lonlat_to_merc, merc_to_lonlat};
use crate::tile::Tile;

/// Which layers `to_geojson` emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeoJsonSelector {
    /// Every layer merged into one FeatureCollection.
    All,
    /// An array of per-layer FeatureCollections.
    Array,
    /// One layer by name.
    Name(String),
    /// One layer by position in buffer order.
    Index(usize),
}

/// Collects (geometry, properties) pairs out of a geozero datasource.
struct FeatureCollector {
    geo_writer: GeoWriter,
    properties: Option<HashMap<String, Value>>,
    features: Vec<(Geometry<f64>, HashMap<String, Value>)>,
}

impl FeatureCollector {
    fn new() -> Self {
        FeatureCollector {
            geo_writer: GeoWriter::new(),
            properties: None,
            features: Vec::new(),
        }
    }
}

impl GeomProcessor for FeatureCollector {
    fn xy(&mut self, x: f64, y: f64, idx: usize) -> std::result::Result<(), GeozeroError> {
        self.geo_writer.xy(x, y, idx)
    }
    fn point_begin(&mut self, idx: usize) -> std::result::Result<(), GeozeroError> {
        self.geo_writer.point_begin(idx)
    }
    fn point_end(&mut self, idx: usize) -> std::result::Result<(), GeozeroError> {
        self.geo_writer.point_end(idx)
    }
    fn multipoint_begin(&mut self, size: usize, idx: usize) -> std::result::Result<(), GeozeroError> {
        self.geo_writer.multipoint_begin(size, idx)
    }
    fn multipoint_end(&mut self, idx: usize) -> std::result::Result<(), GeozeroError> {
        self.geo_writer.multipoint_end(idx)
    }
    fn linestring_begin(
        &mut self,
        tagged: bool,
        size: usize,
        idx: usize,
    ) -> std::result::Result<(), GeozeroError> {
        self.geo_writer.linestring_begin(tagged, size, idx)
    }
    fn linestring_end(&mut self, tagged: bool, idx: usize) -> std::result::Result<(), GeozeroError> {
        self.geo_writer.linestring_end(tagged, idx)
    }
    fn multilinestring_begin(
        &mut self,
        size: usize,
        idx: usize,
    ) -> std::result::Result<(), GeozeroError> {
        self.geo_writer.multilinestring_begin(size, idx)
    }
    fn multilinestring_end(&mut self, idx: usize) -> std::result::Result<(), GeozeroError> {
        self.geo_writer.multilinestring_end(idx)
    }
    fn polygon_begin(
        &mut self,
        tagged: bool,
        size: usize,
        idx: usize,
    ) -> std::result::Result<(), GeozeroError> {
        self.geo_writer.polygon_begin(tagged, size, idx)
    }
    fn polygon_end(&mut self, tagged: bool, idx: usize) -> std::result::Result<(), GeozeroError> {
        self.geo_writer.polygon_end(tagged, idx)
    }
    fn multipolygon_begin(&mut self, size: usize, idx: usize) -> std::result::Result<(), GeozeroError> {
        self.geo_writer.multipolygon_begin(size, idx)
    }
    fn multipolygon_end(&mut self, idx: usize) -> std::result::Result<(), GeozeroError> {
        self.geo_writer.multipolygon_end(idx)
    }
    fn geometrycollection_begin(
        &mut self,
        size: usize,
        idx: usize,
    ) -> std::result::Result<(), GeozeroError> {
        self.geo_writer.geometrycollection_begin(size, idx)
    }
    fn geometrycollection_end(&mut self, idx: usize) -> std::result::Result<(), GeozeroError> {
        self.geo_writer.geometrycollection_end(idx)
    }
}

impl PropertyProcessor for FeatureCollector {
    fn property(
        &mut self,
        _idx: usize,
        name: &str,
        value: &ColumnValue,
    ) -> std::result::Result<bool, GeozeroError> {
        let converted = match value {
            ColumnValue::Bool(b) => Some(Value::Bool(*b)),
            ColumnValue::Byte(v) => Some(Value::Int(i64::from(*v))),
            ColumnValue::Short(v) => Some(Value::Int(i64::from(*v))),
            ColumnValue::Int(v) => Some(Value::Int(i64::from(*v))),
            ColumnValue::Long(v) => Some(Value::Int(*v)),
            ColumnValue::UByte(v) => Some(Value::Uint(u64::from(*v))),
            ColumnValue::UShort(v) => Some(Value::Uint(u64::from(*v))),
            ColumnValue::UInt(v) => Some(Value::Uint(u64::from(*v))),
            ColumnValue::ULong(v) => Some(Value::Uint(*v)),
            ColumnValue::Float(v) => Some(Value::Float(*v)),
            ColumnValue::Double(v) => Some(Value::Double(*v)),
            ColumnValue::String(v) | ColumnValue::Json(v) => {
                Some(Value::String((*v).to_string()))
            }
            ColumnValue::DateTime(v) => Some(Value::String((*v).to_string())),
            ColumnValue::Binary(_) => None,
        };
        if let Some(converted) = converted {
            self.properties
                .get_or_insert_with(HashMap::new)
                .insert(name.to_string(), converted);
        }
        Ok(true)
    }
}

impl FeatureProcessor for FeatureCollector {
    fn properties_begin(&mut self) -> std::result::Result<(), GeozeroError> {
        self.properties = Some(HashMap::new());
        Ok(())
    }

    fn geometry_end(&mut self) -> std::result::Result<(), GeozeroError> {
        if let Some(geometry) = self.geo_writer.take_geometry() {
            self.features
                .push((geometry, self.properties.take().unwrap_or_default()));
        }
        Ok(())
    }
}

impl Tile {
    /// Re-encodes a GeoJSON string (WGS84) into a new layer.
    ///
    /// A layer that ends up with zero surviving features is recorded as
    /// painted and empty but contributes no bytes.
    pub fn add_geojson(
        &mut self,
        geojson: &str,
        layer_name: &str,
        options: &EncodeOptions,
    ) -> Result<()> {
        options.validate()?;
        if self.has_layer(layer_name) {
            log::debug!("layer '{layer_name}' already exists, keeping the first writer");
            return Ok(());
        }

        let mut collector = FeatureCollector::new();
        GeoJson(geojson)
            .process(&mut collector)
            .map_err(|e| Error::InvalidArgument(format!("GeoJSON parsing failed: {e}")))?;
        // a bare geometry input never triggers feature processing, so any
        // geometry still parked in the writer becomes a single feature
        if let Some(geometry) = collector.geo_writer.take_geometry() {
            collector.features.push((geometry, HashMap::new()));
        }

        let extent = crate::coords::DEFAULT_EXTENT;
        let transform = GridTransform::new(self.z(), self.x(), self.y(), extent);
        let pipeline =
            GeometryPipeline::new(transform, self.buffered_extent(), *options);
        let mut builder = LayerBuilder::new(layer_name, extent);
        for (index, (geometry, properties)) in collector.features.iter().enumerate() {
            let mercator = geometry.map_coords(|coord| {
                let (x, y) = lonlat_to_merc(coord.x, coord.y);
                Coord { x, y }
            });
            for (geom_type, data) in pipeline.process(&mercator) {
                builder.add_feature(Some(index as u64 + 1), geom_type, data, properties);
            }
        }
        let count = builder.feature_count();
        self.push_built_layer(layer_name, &builder.into_bytes(), count);
        Ok(())
    }

    /// Emits the selected layers as GeoJSON, reprojected to WGS84.
    pub fn to_geojson(&self, selector: &GeoJsonSelector) -> Result<String> {
        let collections: Vec<(String, serde_json::Value)> = match selector {
            GeoJsonSelector::All | GeoJsonSelector::Array => self
                .names()
                .iter()
                .map(|name| Ok((name.clone(), self.layer_feature_array(name)?)))
                .collect::<Result<_>>()?,
            GeoJsonSelector::Name(name) => {
                if !self.has_layer(name) {
                    return Err(Error::InvalidArgument(format!(
                        "layer '{name}' does not exist in the tile"
                    )));
                }
                vec![(name.clone(), self.layer_feature_array(name)?)]
            }
            GeoJsonSelector::Index(index) => {
                let name = self.names().get(*index).ok_or_else(|| {
                    Error::InvalidArgument(format!("layer index {index} is out of range"))
                })?;
                vec![(name.clone(), self.layer_feature_array(name)?)]
            }
        };

        let out = match selector {
            GeoJsonSelector::All => {
                let merged: Vec<serde_json::Value> = collections
                    .into_iter()
                    .flat_map(|(_, features)| match features {
                        serde_json::Value::Array(list) => list,
                        _ => vec![],
                    })
                    .collect();
                json!({"type": "FeatureCollection", "features": merged})
            }
            GeoJsonSelector::Array => serde_json::Value::Array(
                collections
                    .into_iter()
                    .map(|(name, features)| {
                        json!({"type": "FeatureCollection", "name": name, "features": features})
                    })
                    .collect(),
            ),
            GeoJsonSelector::Name(_) | GeoJsonSelector::Index(_) => {
                let (name, features) = collections.into_iter().next().unwrap_or_default();
                json!({"type": "FeatureCollection", "name": name, "features": features})
            }
        };
        serde_json::to_string(&out).map_err(|e| Error::Io(e.to_string()))
    }

    fn layer_feature_array(&self, name: &str) -> Result<serde_json::Value> {
        let features = self.layer_features(name)?;
        let mut out = Vec::with_capacity(features.len());
        for feature in features {
            let Some(geometry) = &feature.geometry else {
                continue;
            };
            out.push(feature_to_geojson(&feature, geometry)?);
        }
        Ok(serde_json::Value::Array(out))
    }
}

fn feature_to_geojson(feature: &Feature, geometry: &Geometry<f64>) -> Result<serde_json::Value> {
    let wgs84 = geometry.map_coords(|coord| {
        let (lon, lat) = merc_to_lonlat(coord.x, coord.y).unwrap_or((f64::NAN, f64::NAN));
        Coord { x: lon, y: lat }
    });
    let mut names: Vec<&String> = feature.properties.keys().collect();
    names.sort();
    let properties: serde_json::Map<String, serde_json::Value> = names
        .into_iter()
        .map(|name| (name.clone(), feature.properties[name].to_json()))
        .collect();
    let mut out = json!({
        "type": "Feature",
        "geometry": geometry_to_geojson(&wgs84),
        "properties": properties,
    });
    if let Some(id) = feature.id {
        out["id"] = json!(id);
    }
    Ok(out)
}

fn position(coord: &Coord<f64>) -> serde_json::Value {
    json!([coord.x, coord.y])
}

fn ring_positions(ring: &geo_types::LineString<f64>) -> serde_json::Value {
    serde_json::Value::Array(ring.0.iter().map(position).collect())
}

/// Serializes geometry (already in lon/lat) as a GeoJSON geometry object.
pub(crate) fn geometry_to_geojson(geometry: &Geometry<f64>) -> serde_json::Value {
    match geometry {
        Geometry::Point(point) => json!({"type": "Point", "coordinates": position(&point.0)}),
        Geometry::MultiPoint(points) => json!({
            "type": "MultiPoint",
            "coordinates": points.iter().map(|p| position(&p.0)).collect::<Vec<_>>(),
        }),
        Geometry::Line(line) => json!({
            "type": "LineString",
            "coordinates": [position(&line.start), position(&line.end)],
        }),
        Geometry::LineString(line) => {
            json!({"type": "LineString", "coordinates": ring_positions(line)})
        }
        Geometry::MultiLineString(lines) => json!({
            "type": "MultiLineString",
            "coordinates": lines.iter().map(ring_positions).collect::<Vec<_>>(),
        }),
        Geometry::Polygon(polygon) => json!({
            "type": "Polygon",
            "coordinates": polygon_positions(polygon),
        }),
        Geometry::MultiPolygon(polygons) => json!({
            "type": "MultiPolygon",
            "coordinates": polygons.iter().map(polygon_positions).collect::<Vec<_>>(),
        }),
        Geometry::Rect(rect) => geometry_to_geojson(&Geometry::Polygon(rect.to_polygon())),
        Geometry::Triangle(triangle) => {
            geometry_to_geojson(&Geometry::Polygon(triangle.to_polygon()))
        }
        Geometry::GeometryCollection(collection) => json!({
            "type": "GeometryCollection",
            "geometries": collection.iter().map(geometry_to_geojson).collect::<Vec<_>>(),
        }),
    }
}

fn polygon_positions(polygon: &geo_types::Polygon<f64>) -> serde_json::Value {
    let mut rings = vec![ring_positions(polygon.exterior())];
    rings.extend(polygon.interiors().iter().map(ring_positions));
    serde_json::Value::Array(rings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::QueryOptions;

    const WORLD_POLYGON: &str = r#"{
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[-10,-10],[10,-10],[10,10],[-10,10],[-10,-10]]]
            },
            "properties": {"name": "origin square", "rank": 1}
        }]
    }"#;

    #[test]
    fn add_geojson_then_query_finds_the_polygon() {
        let mut tile = Tile::new(0, 0, 0).unwrap();
        tile.add_geojson(WORLD_POLYGON, "world", &EncodeOptions::default())
            .unwrap();
        assert_eq!(tile.names(), &["world"]);
        assert!(!tile.is_empty());

        let results = tile.query(0.0, 0.0, &QueryOptions::default()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].layer, "world");
        assert_eq!(results[0].distance, 0.0);
    }

    #[test]
    fn add_geojson_records_empty_layers_as_painted() {
        // the feature lies wholly outside this z5 tile
        let mut tile = Tile::new(5, 0, 0).unwrap();
        tile.add_geojson(WORLD_POLYGON, "world", &EncodeOptions::default())
            .unwrap();
        assert!(tile.is_empty());
        assert_eq!(tile.painted_layers(), vec!["world".to_string()]);
        assert_eq!(tile.empty_layers(), vec!["world".to_string()]);
        assert!(tile.painted());
    }

    #[test]
    fn bad_geojson_is_an_invalid_argument() {
        let mut tile = Tile::new(0, 0, 0).unwrap();
        let result = tile.add_geojson("{not json", "world", &EncodeOptions::default());
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn to_geojson_round_trips_properties() {
        let mut tile = Tile::new(0, 0, 0).unwrap();
        tile.add_geojson(WORLD_POLYGON, "world", &EncodeOptions::default())
            .unwrap();
        let out = tile
            .to_geojson(&GeoJsonSelector::Name("world".to_string()))
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["type"], "FeatureCollection");
        assert_eq!(parsed["name"], "world");
        let features = parsed["features"].as_array().unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0]["properties"]["name"], "origin square");
        assert_eq!(features[0]["geometry"]["type"], "Polygon");
        // coordinates come back close to the input, within quantization
        let ring = features[0]["geometry"]["coordinates"][0].as_array().unwrap();
        let first = ring[0].as_array().unwrap();
        assert!((first[0].as_f64().unwrap().abs() - 10.0).abs() < 0.2);
    }

    #[test]
    fn to_geojson_selectors_agree() {
        let mut tile = Tile::new(0, 0, 0).unwrap();
        tile.add_geojson(WORLD_POLYGON, "world", &EncodeOptions::default())
            .unwrap();
        let by_name = tile
            .to_geojson(&GeoJsonSelector::Name("world".to_string()))
            .unwrap();
        let by_index = tile.to_geojson(&GeoJsonSelector::Index(0)).unwrap();
        assert_eq!(by_name, by_index);

        let array: serde_json::Value =
            serde_json::from_str(&tile.to_geojson(&GeoJsonSelector::Array).unwrap()).unwrap();
        assert!(array.is_array());
        assert_eq!(array[0]["name"], "world");

        let all: serde_json::Value =
            serde_json::from_str(&tile.to_geojson(&GeoJsonSelector::All).unwrap()).unwrap();
        assert_eq!(all["features"].as_array().unwrap().len(), 1);
        assert!(tile.to_geojson(&GeoJsonSelector::Index(7)).is_err());
        assert!(tile
            .to_geojson(&GeoJsonSelector::Name("missing".to_string()))
            .is_err());
    }
}
