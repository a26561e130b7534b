//! MVT encoding: the geometry pipeline and layer building.
//!
//! Encoding a feature runs clip → grid transform → simplify → ring
//! normalization → quantization → command stream. Layer building interns
//! attribute keys and values into the per-layer dictionaries and emits the
//! layer message through the PBF writer.

use std::collections::HashMap;

use geo::BooleanOps;
use geo_types::{Coord, Geometry, LineString, MultiPolygon, Polygon};

use crate::codec::{command, tag, GeomType, RawLayer, Value, ValueKey};
use crate::coords::GridTransform;
use crate::error::Result;
use crate::geometry::clip::clip_geometry;
use crate::geometry::simplify::simplify_geometry;
use crate::geometry::validity::is_simple;
use crate::geometry::{assemble_polygons, close_ring, signed_area, wind_ring};
use crate::options::{EncodeOptions, FillType};
use crate::pbf::Writer;

/// Current wire version emitted by the encoder.
pub const ENCODE_VERSION: u32 = 2;

fn command_header(id: u32, count: u32) -> u32 {
    (id & 0x7) | (count << 3)
}

fn zigzag(value: i64) -> u32 {
    ((value << 1) ^ (value >> 63)) as u32
}

/// Emits packed commands for quantized grid geometry, tracking the pen.
#[derive(Debug, Default)]
struct GeomEncoder {
    x: i64,
    y: i64,
    data: Vec<u32>,
}

impl GeomEncoder {
    fn push_point(&mut self, point: Coord<i64>) {
        self.data.push(zigzag(point.x - self.x));
        self.data.push(zigzag(point.y - self.y));
        self.x = point.x;
        self.y = point.y;
    }

    /// One MoveTo carrying every point of a (multi)point feature.
    fn points(&mut self, points: &[Coord<i64>]) {
        if points.is_empty() {
            return;
        }
        self.data
            .push(command_header(command::MOVE_TO, points.len() as u32));
        for &point in points {
            self.push_point(point);
        }
    }

    /// MoveTo + LineTo for one linestring part.
    fn line(&mut self, points: &[Coord<i64>]) {
        if points.len() < 2 {
            return;
        }
        self.data.push(command_header(command::MOVE_TO, 1));
        self.push_point(points[0]);
        self.data
            .push(command_header(command::LINE_TO, points.len() as u32 - 1));
        for &point in &points[1..] {
            self.push_point(point);
        }
    }

    /// MoveTo + LineTo + ClosePath for one ring; `points` excludes the
    /// closing vertex.
    fn ring(&mut self, points: &[Coord<i64>]) {
        if points.len() < 3 {
            return;
        }
        self.line(points);
        self.data.push(command_header(command::CLOSE_PATH, 1));
    }

    fn finish(self) -> Option<Vec<u32>> {
        (!self.data.is_empty()).then_some(self.data)
    }
}

fn quantize(points: &[Coord<f64>]) -> Vec<Coord<i64>> {
    let mut out: Vec<Coord<i64>> = Vec::with_capacity(points.len());
    for point in points {
        let quantized = Coord {
            x: point.x.round() as i64,
            y: point.y.round() as i64,
        };
        if out.last() != Some(&quantized) {
            out.push(quantized);
        }
    }
    out
}

fn quantize_ring(ring: &LineString<f64>) -> Vec<Coord<i64>> {
    let mut points = quantize(&ring.0);
    if points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    points
}

/// Encodes grid-space geometry into a command stream.
///
/// Polygon rings must already be normalized (exterior positive, holes
/// negative, exterior-then-holes order). Returns `None` when quantization
/// leaves nothing to emit.
pub fn encode_geometry(geometry: &Geometry<f64>) -> Option<(GeomType, Vec<u32>)> {
    let mut encoder = GeomEncoder::default();
    match geometry {
        Geometry::Point(point) => {
            encoder.points(&quantize(&[Coord {
                x: point.x(),
                y: point.y(),
            }]));
            encoder.finish().map(|data| (GeomType::Point, data))
        }
        Geometry::MultiPoint(points) => {
            let coords: Vec<Coord<f64>> = points.iter().map(|p| p.0).collect();
            // consecutive duplicates collapse; a multipoint keeps them all
            let quantized: Vec<Coord<i64>> = coords
                .iter()
                .map(|c| Coord {
                    x: c.x.round() as i64,
                    y: c.y.round() as i64,
                })
                .collect();
            encoder.points(&quantized);
            encoder.finish().map(|data| (GeomType::Point, data))
        }
        Geometry::Line(line) => {
            encoder.line(&quantize(&[line.start, line.end]));
            encoder.finish().map(|data| (GeomType::LineString, data))
        }
        Geometry::LineString(line) => {
            encoder.line(&quantize(&line.0));
            encoder.finish().map(|data| (GeomType::LineString, data))
        }
        Geometry::MultiLineString(lines) => {
            for line in lines.iter() {
                encoder.line(&quantize(&line.0));
            }
            encoder.finish().map(|data| (GeomType::LineString, data))
        }
        Geometry::Polygon(polygon) => {
            encode_polygon_rings(&mut encoder, polygon);
            encoder.finish().map(|data| (GeomType::Polygon, data))
        }
        Geometry::MultiPolygon(polygons) => {
            for polygon in polygons.iter() {
                encode_polygon_rings(&mut encoder, polygon);
            }
            encoder.finish().map(|data| (GeomType::Polygon, data))
        }
        Geometry::Rect(rect) => encode_geometry(&Geometry::Polygon(rect.to_polygon())),
        Geometry::Triangle(triangle) => {
            encode_geometry(&Geometry::Polygon(triangle.to_polygon()))
        }
        Geometry::GeometryCollection(_) => {
            // collections are split into separate features upstream
            None
        }
    }
}

fn encode_polygon_rings(encoder: &mut GeomEncoder, polygon: &Polygon<f64>) {
    let exterior = quantize_ring(polygon.exterior());
    if exterior.len() < 3 {
        return;
    }
    encoder.ring(&exterior);
    for interior in polygon.interiors() {
        encoder.ring(&quantize_ring(interior));
    }
}

/// The per-feature geometry pipeline for one target tile.
#[derive(Debug, Clone)]
pub struct GeometryPipeline {
    transform: GridTransform,
    /// Buffered clip window in mercator meters.
    clip_bounds: [f64; 4],
    /// Grid-space translation applied after the transform.
    offset: (f64, f64),
    options: EncodeOptions,
}

impl GeometryPipeline {
    pub fn new(
        transform: GridTransform,
        clip_bounds: [f64; 4],
        options: EncodeOptions,
    ) -> Self {
        GeometryPipeline {
            transform,
            clip_bounds,
            offset: (0.0, 0.0),
            options,
        }
    }

    pub fn with_offset(mut self, offset_x: i64, offset_y: i64) -> Self {
        self.offset = (offset_x as f64, offset_y as f64);
        self
    }

    /// Runs one mercator geometry through the pipeline.
    ///
    /// Usually yields zero or one command streams; a geometry collection
    /// yields one per member so each becomes its own feature.
    pub fn process(&self, geometry: &Geometry<f64>) -> Vec<(GeomType, Vec<u32>)> {
        if let Geometry::GeometryCollection(collection) = geometry {
            return collection
                .iter()
                .flat_map(|member| self.process(member))
                .collect();
        }
        let Some(clipped) = clip_geometry(geometry, self.clip_bounds) else {
            return Vec::new();
        };
        let grid = {
            use geo::MapCoords;
            clipped.map_coords(|coord| {
                let (x, y) = self.transform.to_grid(coord.x, coord.y);
                Coord {
                    x: x + self.offset.0,
                    y: y + self.offset.1,
                }
            })
        };
        let simplified = simplify_geometry(&grid, self.options.simplify_distance);
        let prepared = match simplified {
            Geometry::Polygon(polygon) => {
                self.prepare_polygons(MultiPolygon::new(vec![polygon]))
            }
            Geometry::MultiPolygon(polygons) => self.prepare_polygons(polygons),
            other => Some(other),
        };
        prepared
            .as_ref()
            .and_then(encode_geometry)
            .into_iter()
            .collect()
    }

    fn prepare_polygons(&self, polygons: MultiPolygon<f64>) -> Option<Geometry<f64>> {
        let polygons = if self.options.multi_polygon_union && polygons.0.len() > 1 {
            polygons.union(&MultiPolygon::new(vec![]))
        } else {
            polygons
        };

        let mut normalized: Vec<Polygon<f64>> = if self.options.process_all_rings {
            let rings: Vec<LineString<f64>> = polygons
                .into_iter()
                .flat_map(|polygon| {
                    let (exterior, interiors) = polygon.into_inner();
                    std::iter::once(exterior).chain(interiors)
                })
                .collect();
            assemble_polygons(rings, self.options.fill_type)
        } else {
            polygons
                .into_iter()
                .filter_map(|polygon| self.normalize_polygon(polygon))
                .collect()
        };

        normalized.retain(|polygon| {
            signed_area(polygon.exterior()).abs() >= self.options.area_threshold
        });
        if self.options.strictly_simple {
            normalized.retain(|polygon| {
                let simple = is_simple(&Geometry::Polygon(polygon.clone()));
                if !simple {
                    log::warn!("dropping polygon that is not strictly simple");
                }
                simple
            });
        }

        match normalized.len() {
            0 => None,
            1 => Some(Geometry::Polygon(normalized.remove(0))),
            _ => Some(Geometry::MultiPolygon(MultiPolygon::new(normalized))),
        }
    }

    /// Winds and filters the rings of a structurally trusted polygon.
    fn normalize_polygon(&self, polygon: Polygon<f64>) -> Option<Polygon<f64>> {
        let (mut exterior, interiors) = polygon.into_inner();
        close_ring(&mut exterior);
        if exterior.0.len() < 4 || signed_area(&exterior) == 0.0 {
            return None;
        }
        wind_ring(&mut exterior, true);
        let holes: Vec<LineString<f64>> = interiors
            .into_iter()
            .filter_map(|mut hole| {
                close_ring(&mut hole);
                let area = signed_area(&hole).abs();
                if hole.0.len() < 4 || area == 0.0 || area < self.options.area_threshold {
                    return None;
                }
                wind_ring(&mut hole, false);
                Some(hole)
            })
            .collect();
        Some(Polygon::new(exterior, holes))
    }
}

/// Builds one layer message, interning attributes into the dictionaries.
#[derive(Debug)]
pub struct LayerBuilder {
    name: String,
    version: u32,
    extent: u32,
    keys: Vec<String>,
    key_lookup: HashMap<String, u32>,
    values: Vec<Value>,
    value_lookup: HashMap<ValueKey, u32>,
    features: Vec<BuiltFeature>,
}

#[derive(Debug)]
struct BuiltFeature {
    id: Option<u64>,
    geom_type: GeomType,
    tags: Vec<u32>,
    geometry: Vec<u32>,
    raster: Option<Vec<u8>>,
}

impl LayerBuilder {
    pub fn new(name: &str, extent: u32) -> Self {
        LayerBuilder {
            name: name.to_string(),
            version: ENCODE_VERSION,
            extent,
            keys: Vec::new(),
            key_lookup: HashMap::new(),
            values: Vec::new(),
            value_lookup: HashMap::new(),
            features: Vec::new(),
        }
    }

    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    fn intern_key(&mut self, key: &str) -> u32 {
        if let Some(&index) = self.key_lookup.get(key) {
            return index;
        }
        let index = self.keys.len() as u32;
        self.keys.push(key.to_string());
        self.key_lookup.insert(key.to_string(), index);
        index
    }

    fn intern_value(&mut self, value: &Value) -> u32 {
        let lookup = value.intern_key();
        if let Some(&index) = self.value_lookup.get(&lookup) {
            return index;
        }
        let index = self.values.len() as u32;
        self.values.push(value.clone());
        self.value_lookup.insert(lookup, index);
        index
    }

    fn tag_pairs(&mut self, properties: &HashMap<String, Value>) -> Vec<u32> {
        // sorted so identical inputs produce identical bytes
        let mut names: Vec<&String> = properties.keys().collect();
        names.sort();
        let mut tags = Vec::with_capacity(names.len() * 2);
        for name in names {
            let key_index = self.intern_key(name);
            let value_index = self.intern_value(&properties[name]);
            tags.push(key_index);
            tags.push(value_index);
        }
        tags
    }

    /// Adds a vector feature from an already-encoded command stream.
    pub fn add_feature(
        &mut self,
        id: Option<u64>,
        geom_type: GeomType,
        geometry: Vec<u32>,
        properties: &HashMap<String, Value>,
    ) {
        let tags = self.tag_pairs(properties);
        self.features.push(BuiltFeature {
            id,
            geom_type,
            tags,
            geometry,
            raster: None,
        });
    }

    /// Adds a raster feature carrying opaque image bytes.
    pub fn add_raster_feature(&mut self, bytes: &[u8], properties: &HashMap<String, Value>) {
        let tags = self.tag_pairs(properties);
        self.features.push(BuiltFeature {
            id: None,
            geom_type: GeomType::Unknown,
            tags,
            geometry: Vec::new(),
            raster: Some(bytes.to_vec()),
        });
    }

    /// Emits the layer message body.
    pub fn into_bytes(self) -> Vec<u8> {
        let mut writer = Writer::with_capacity(256);
        writer.write_string_field(tag::LAYER_NAME, &self.name);
        for feature in &self.features {
            let mut body = Writer::with_capacity(feature.geometry.len() * 2 + 16);
            if let Some(id) = feature.id {
                body.write_uint64_field(tag::FEATURE_ID, id);
            }
            if !feature.tags.is_empty() {
                body.write_packed_uint32_field(tag::FEATURE_TAGS, &feature.tags);
            }
            body.write_uint32_field(tag::FEATURE_TYPE, feature.geom_type.as_raw());
            if !feature.geometry.is_empty() {
                body.write_packed_uint32_field(tag::FEATURE_GEOMETRY, &feature.geometry);
            }
            if let Some(raster) = &feature.raster {
                body.write_bytes_field(tag::FEATURE_RASTER, raster);
            }
            writer.write_bytes_field(tag::LAYER_FEATURE, &body.into_inner());
        }
        for key in &self.keys {
            writer.write_string_field(tag::LAYER_KEY, key);
        }
        for value in &self.values {
            let mut body = Writer::with_capacity(16);
            match value {
                Value::String(s) => body.write_string_field(tag::VALUE_STRING, s),
                Value::Float(f) => body.write_float_field(tag::VALUE_FLOAT, *f),
                Value::Double(d) => body.write_double_field(tag::VALUE_DOUBLE, *d),
                Value::Int(i) => body.write_int64_field(tag::VALUE_INT, *i),
                Value::Uint(u) => body.write_uint64_field(tag::VALUE_UINT, *u),
                Value::Sint(i) => body.write_sint64_field(tag::VALUE_SINT, *i),
                Value::Bool(b) => body.write_bool_field(tag::VALUE_BOOL, *b),
            }
            writer.write_bytes_field(tag::LAYER_VALUE, &body.into_inner());
        }
        writer.write_uint32_field(tag::LAYER_EXTENT, self.extent);
        writer.write_uint32_field(tag::LAYER_VERSION, self.version);
        writer.into_inner()
    }
}

/// Re-encodes a layer so v1 content satisfies the v2 invariants: explicit
/// version, closed rings with at least four points, consistent winding.
pub fn upgrade_layer(raw: &RawLayer) -> Result<Vec<u8>> {
    use crate::codec::decoder::{decode_commands, feature_properties};

    let mut builder = LayerBuilder::new(&raw.name, raw.extent);
    for feature in &raw.features {
        let properties = feature_properties(feature, raw, None);
        if let Some(raster) = &feature.raster {
            builder.add_raster_feature(raster, &properties);
            continue;
        }
        let Some(grid) = decode_commands(&feature.geometry, feature.geom_type)? else {
            log::debug!("dropping feature with empty geometry during upgrade");
            continue;
        };
        let normalized = match grid {
            Geometry::Polygon(polygon) => {
                reassemble(MultiPolygon::new(vec![polygon]))
            }
            Geometry::MultiPolygon(polygons) => reassemble(polygons),
            other => Some(other),
        };
        let Some(normalized) = normalized else {
            log::debug!("dropping degenerate polygon during upgrade");
            continue;
        };
        if let Some((geom_type, commands)) = encode_geometry(&normalized) {
            builder.add_feature(feature.id, geom_type, commands, &properties);
        }
    }
    Ok(builder.into_bytes())
}

/// Re-derives ring roles from signed area, the recovery path for v1 rings
/// with unreliable winding or ordering.
fn reassemble(polygons: MultiPolygon<f64>) -> Option<Geometry<f64>> {
    let rings: Vec<LineString<f64>> = polygons
        .into_iter()
        .flat_map(|polygon| {
            let (exterior, interiors) = polygon.into_inner();
            std::iter::once(exterior).chain(interiors)
        })
        .collect();
    let mut assembled = assemble_polygons(rings, FillType::Positive);
    match assembled.len() {
        0 => None,
        1 => Some(Geometry::Polygon(assembled.remove(0))),
        _ => Some(Geometry::MultiPolygon(MultiPolygon::new(assembled))),
    }
}
