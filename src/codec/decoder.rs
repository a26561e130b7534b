//! MVT decoding: tile scanning, layer structure, command streams.
//!
//! Decoding is layered so callers pay only for what they need: a tile scan
//! just finds layer byte ranges and names, a raw decode materializes the
//! wire structure, and a feature decode produces mercator geometry.

use std::collections::HashMap;
use std::ops::Range;

use geo_types::{
    Coord, Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon,
};

use crate::codec::{command, tag, Feature, GeomType, RawFeature, RawLayer, Value};
use crate::coords::GridTransform;
use crate::error::{Error, Result};
use crate::geometry::signed_area;
use crate::pbf::{Reader, WIRE_LEN};

/// Location of one layer message inside a tile buffer.
#[derive(Debug, Clone)]
pub struct LayerSlice {
    pub name: String,
    pub version: u32,
    pub has_features: bool,
    /// Byte range of the complete field, key and length prefix included.
    pub range: Range<usize>,
    /// Byte range of the layer message body.
    pub body: Range<usize>,
}

/// Scans a tile buffer into its layer slices without decoding features.
///
/// Unknown top-level tags are skipped; the validator is the place that
/// counts them.
pub fn scan_layers(buf: &[u8]) -> Result<Vec<LayerSlice>> {
    let mut reader = Reader::new(buf);
    let mut slices = Vec::new();
    loop {
        let start = reader.position();
        let Some(field) = reader.next_field()? else {
            break;
        };
        if field.tag == tag::TILE_LAYER && field.wire_type == WIRE_LEN {
            let body = reader.read_bytes()?;
            let end = reader.position();
            let summary = layer_summary(body)?;
            slices.push(LayerSlice {
                name: summary.0,
                version: summary.1,
                has_features: summary.2,
                range: start..end,
                body: end - body.len()..end,
            });
        } else {
            log::debug!("skipping unknown tile tag {}", field.tag);
            reader.skip(field.wire_type)?;
        }
    }
    Ok(slices)
}

/// Reads just the name, version, and feature presence of a layer message
/// body.
pub fn layer_summary(body: &[u8]) -> Result<(String, u32, bool)> {
    let mut reader = Reader::new(body);
    let mut name = String::new();
    let mut version = 1;
    let mut has_features = false;
    while let Some(field) = reader.next_field()? {
        match field.tag {
            tag::LAYER_NAME => name = reader.read_string()?.to_string(),
            tag::LAYER_VERSION => version = reader.read_uint32()?,
            tag::LAYER_FEATURE => {
                has_features = true;
                reader.skip(field.wire_type)?;
            }
            _ => reader.skip(field.wire_type)?,
        }
    }
    Ok((name, version, has_features))
}

fn decode_value(body: &[u8]) -> Result<Value> {
    let mut reader = Reader::new(body);
    let mut value = None;
    while let Some(field) = reader.next_field()? {
        value = Some(match field.tag {
            tag::VALUE_STRING => Value::String(reader.read_string()?.to_string()),
            tag::VALUE_FLOAT => Value::Float(reader.read_float()?),
            tag::VALUE_DOUBLE => Value::Double(reader.read_double()?),
            tag::VALUE_INT => Value::Int(reader.read_int64()?),
            tag::VALUE_UINT => Value::Uint(reader.read_uint64()?),
            tag::VALUE_SINT => Value::Sint(reader.read_sint64()?),
            tag::VALUE_BOOL => Value::Bool(reader.read_bool()?),
            _ => {
                reader.skip(field.wire_type)?;
                continue;
            }
        });
    }
    value.ok_or_else(|| Error::CorruptInput("value message with no value".to_string()))
}

fn decode_feature(body: &[u8]) -> Result<RawFeature> {
    let mut reader = Reader::new(body);
    let mut feature = RawFeature {
        id: None,
        geom_type: GeomType::Unknown,
        tags: Vec::new(),
        geometry: Vec::new(),
        raster: None,
    };
    while let Some(field) = reader.next_field()? {
        match field.tag {
            tag::FEATURE_ID => feature.id = Some(reader.read_uint64()?),
            tag::FEATURE_TAGS => {
                for value in reader.read_packed_uint32()? {
                    feature.tags.push(value?);
                }
            }
            tag::FEATURE_TYPE => feature.geom_type = GeomType::from_raw(reader.read_varint()?),
            tag::FEATURE_GEOMETRY => {
                for value in reader.read_packed_uint32()? {
                    feature.geometry.push(value?);
                }
            }
            tag::FEATURE_RASTER => feature.raster = Some(reader.read_bytes()?.to_vec()),
            _ => reader.skip(field.wire_type)?,
        }
    }
    Ok(feature)
}

/// Decodes a layer message body into its wire structure.
pub fn decode_raw_layer(body: &[u8]) -> Result<RawLayer> {
    let mut reader = Reader::new(body);
    let mut layer = RawLayer {
        name: String::new(),
        version: 1,
        extent: crate::coords::DEFAULT_EXTENT,
        keys: Vec::new(),
        values: Vec::new(),
        features: Vec::new(),
    };
    while let Some(field) = reader.next_field()? {
        match field.tag {
            tag::LAYER_NAME => layer.name = reader.read_string()?.to_string(),
            tag::LAYER_FEATURE => layer.features.push(decode_feature(reader.read_bytes()?)?),
            tag::LAYER_KEY => layer.keys.push(reader.read_string()?.to_string()),
            tag::LAYER_VALUE => layer.values.push(decode_value(reader.read_bytes()?)?),
            tag::LAYER_EXTENT => layer.extent = reader.read_uint32()?,
            tag::LAYER_VERSION => layer.version = reader.read_uint32()?,
            _ => reader.skip(field.wire_type)?,
        }
    }
    Ok(layer)
}

struct CommandCursor<'a> {
    commands: &'a [u32],
    index: usize,
    x: i64,
    y: i64,
}

impl CommandCursor<'_> {
    fn next_point(&mut self) -> Result<Coord<f64>> {
        let dx = self.param()?;
        let dy = self.param()?;
        self.x = self.x.saturating_add(dx);
        self.y = self.y.saturating_add(dy);
        Ok(Coord {
            x: self.x as f64,
            y: self.y as f64,
        })
    }

    fn param(&mut self) -> Result<i64> {
        let raw = *self.commands.get(self.index).ok_or_else(|| {
            Error::CorruptInput("geometry command stream ended mid-parameter".to_string())
        })?;
        self.index += 1;
        Ok(i64::from((raw >> 1) as i32 ^ -((raw & 1) as i32)))
    }
}

/// Decodes a packed command stream into grid-space geometry (y down).
///
/// Returns `None` for an empty stream. Zero-area polygon rings are dropped;
/// a hole arriving before any exterior opens its own polygon so the data
/// is still queryable.
pub fn decode_commands(commands: &[u32], geom_type: GeomType) -> Result<Option<Geometry<f64>>> {
    let mut cursor = CommandCursor {
        commands,
        index: 0,
        x: 0,
        y: 0,
    };
    let mut parts: Vec<Vec<Coord<f64>>> = Vec::new();
    let mut current: Vec<Coord<f64>> = Vec::new();

    while cursor.index < commands.len() {
        let header = commands[cursor.index];
        cursor.index += 1;
        let (id, count) = (header & 0x7, header >> 3);
        match id {
            command::MOVE_TO => {
                for _ in 0..count {
                    if geom_type == GeomType::Point {
                        current.push(cursor.next_point()?);
                    } else {
                        if current.len() > 1 {
                            parts.push(std::mem::take(&mut current));
                        } else {
                            current.clear();
                        }
                        current.push(cursor.next_point()?);
                    }
                }
            }
            command::LINE_TO => {
                if current.is_empty() {
                    return Err(Error::CorruptInput(
                        "LineTo before any MoveTo".to_string(),
                    ));
                }
                for _ in 0..count {
                    current.push(cursor.next_point()?);
                }
            }
            command::CLOSE_PATH => {
                if geom_type != GeomType::Polygon {
                    return Err(Error::CorruptInput(
                        "ClosePath outside polygon geometry".to_string(),
                    ));
                }
                if current.len() > 2 {
                    current.push(current[0]);
                    parts.push(std::mem::take(&mut current));
                } else {
                    log::debug!("dropping degenerate polygon ring");
                    current.clear();
                }
            }
            other => {
                return Err(Error::CorruptInput(format!(
                    "unknown geometry command {other}"
                )))
            }
        }
    }
    if current.len() > 1 || (geom_type == GeomType::Point && !current.is_empty()) {
        parts.push(current);
    }

    Ok(match geom_type {
        GeomType::Unknown => None,
        GeomType::Point => {
            let mut points: Vec<Point<f64>> = parts
                .into_iter()
                .flatten()
                .map(Point::from)
                .collect();
            match points.len() {
                0 => None,
                1 => Some(Geometry::Point(points.remove(0))),
                _ => Some(Geometry::MultiPoint(MultiPoint::new(points))),
            }
        }
        GeomType::LineString => {
            let mut lines: Vec<LineString<f64>> = parts
                .into_iter()
                .filter(|part| part.len() > 1)
                .map(LineString::new)
                .collect();
            match lines.len() {
                0 => None,
                1 => Some(Geometry::LineString(lines.remove(0))),
                _ => Some(Geometry::MultiLineString(MultiLineString::new(lines))),
            }
        }
        GeomType::Polygon => {
            let mut polygons: Vec<Polygon<f64>> = Vec::new();
            for part in parts {
                let ring = LineString::new(part);
                let area = signed_area(&ring);
                if area > 0.0 || polygons.is_empty() {
                    polygons.push(Polygon::new(ring, vec![]));
                } else if area < 0.0 {
                    if let Some(last) = polygons.last_mut() {
                        last.interiors_push(ring);
                    }
                } else {
                    log::debug!("dropping zero-area polygon ring");
                }
            }
            match polygons.len() {
                0 => None,
                1 => Some(Geometry::Polygon(polygons.remove(0))),
                _ => Some(Geometry::MultiPolygon(MultiPolygon::new(polygons))),
            }
        }
    })
}

/// Maps grid-space geometry into mercator meters.
pub fn grid_to_mercator(geometry: &Geometry<f64>, transform: &GridTransform) -> Geometry<f64> {
    use geo::MapCoords;
    geometry.map_coords(|coord| {
        let (x, y) = transform.to_merc(coord.x, coord.y);
        Coord { x, y }
    })
}

/// Materializes the attribute pairs of a raw feature.
///
/// Indexes outside the dictionaries are skipped, as is a dangling key at
/// the end of an odd-length tag list. `fields` restricts the output to the
/// named attributes.
pub fn feature_properties(
    raw: &RawFeature,
    layer: &RawLayer,
    fields: Option<&[String]>,
) -> HashMap<String, Value> {
    let mut properties = HashMap::new();
    for pair in raw.tags.chunks_exact(2) {
        let (key_index, value_index) = (pair[0] as usize, pair[1] as usize);
        if let (Some(key), Some(value)) = (layer.keys.get(key_index), layer.values.get(value_index))
        {
            if fields.is_none_or(|wanted| wanted.iter().any(|f| f == key)) {
                properties.insert(key.clone(), value.clone());
            }
        }
    }
    properties
}

/// Decodes every feature of a layer into mercator space.
pub fn decode_features(
    layer: &RawLayer,
    z: u32,
    x: u32,
    y: u32,
    fields: Option<&[String]>,
) -> Result<Vec<Feature>> {
    let transform = GridTransform::new(z, x, y, layer.extent);
    let mut features = Vec::with_capacity(layer.features.len());
    for raw in &layer.features {
        let geometry = decode_commands(&raw.geometry, raw.geom_type)?
            .map(|grid| grid_to_mercator(&grid, &transform));
        features.push(Feature {
            id: raw.id,
            geom_type: raw.geom_type,
            geometry,
            properties: feature_properties(raw, layer, fields),
            raster: raw.raster.clone(),
        });
    }
    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Command streams from the vector-tile specification examples.

    #[test]
    fn decodes_a_point() {
        let geometry = decode_commands(&[9, 50, 34], GeomType::Point)
            .unwrap()
            .unwrap();
        assert_eq!(geometry, Geometry::Point(Point::new(25.0, 17.0)));
    }

    #[test]
    fn decodes_a_multi_point() {
        let geometry = decode_commands(&[17, 10, 14, 3, 9], GeomType::Point)
            .unwrap()
            .unwrap();
        let Geometry::MultiPoint(points) = geometry else {
            panic!("expected a multipoint");
        };
        assert_eq!(points.0, vec![Point::new(5.0, 7.0), Point::new(3.0, 2.0)]);
    }

    #[test]
    fn decodes_a_linestring() {
        let geometry = decode_commands(&[9, 4, 4, 18, 0, 16, 16, 0], GeomType::LineString)
            .unwrap()
            .unwrap();
        let Geometry::LineString(line) = geometry else {
            panic!("expected a linestring");
        };
        assert_eq!(
            line.0,
            vec![
                Coord { x: 2.0, y: 2.0 },
                Coord { x: 2.0, y: 10.0 },
                Coord { x: 10.0, y: 10.0 },
            ]
        );
    }

    #[test]
    fn decodes_a_multi_linestring() {
        let geometry = decode_commands(
            &[9, 4, 4, 18, 0, 16, 16, 0, 9, 17, 17, 10, 4, 8],
            GeomType::LineString,
        )
        .unwrap()
        .unwrap();
        let Geometry::MultiLineString(lines) = geometry else {
            panic!("expected a multilinestring");
        };
        assert_eq!(lines.0.len(), 2);
        assert_eq!(lines.0[1].0[0], Coord { x: 1.0, y: 1.0 });
    }

    #[test]
    fn decodes_a_polygon_with_closed_ring() {
        let geometry = decode_commands(&[9, 6, 12, 18, 10, 12, 24, 44, 15], GeomType::Polygon)
            .unwrap()
            .unwrap();
        let Geometry::Polygon(polygon) = geometry else {
            panic!("expected a polygon");
        };
        let exterior = polygon.exterior();
        assert_eq!(exterior.0.len(), 4);
        assert_eq!(exterior.0.first(), exterior.0.last());
    }

    #[test]
    fn decodes_multi_polygon_with_hole() {
        let commands = [
            9, 0, 0, 26, 20, 0, 0, 20, 19, 0, 15, // exterior 0,0 .. 10,10
            9, 22, 2, 26, 18, 0, 0, 18, 17, 0, 15, // exterior 11,11 .. 20,20
            9, 4, 13, 26, 0, 8, 8, 0, 0, 7, 15, // hole inside the second
        ];
        let geometry = decode_commands(&commands, GeomType::Polygon)
            .unwrap()
            .unwrap();
        let Geometry::MultiPolygon(polygons) = geometry else {
            panic!("expected a multipolygon");
        };
        assert_eq!(polygons.0.len(), 2);
        assert_eq!(polygons.0[0].interiors().len(), 0);
        assert_eq!(polygons.0[1].interiors().len(), 1);
    }

    #[test]
    fn empty_stream_decodes_to_none() {
        assert!(decode_commands(&[], GeomType::Polygon).unwrap().is_none());
    }

    #[test]
    fn truncated_parameters_are_corrupt() {
        assert!(matches!(
            decode_commands(&[9, 50], GeomType::Point),
            Err(Error::CorruptInput(_))
        ));
    }

    #[test]
    fn line_to_without_move_to_is_corrupt() {
        assert!(matches!(
            decode_commands(&[18, 0, 16, 16, 0], GeomType::LineString),
            Err(Error::CorruptInput(_))
        ));
    }

    #[test]
    fn unknown_command_is_corrupt() {
        assert!(matches!(
            decode_commands(&[11, 0, 0], GeomType::Point),
            Err(Error::CorruptInput(_))
        ));
    }
}
