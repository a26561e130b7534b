//! MVT layer and feature codec.
//!
//! The wire format is the Mapbox Vector Tile encoding of layers, features,
//! key/value dictionaries, and packed command-stream geometry. The decoder
//! turns layer message bodies into structured features with mercator
//! geometry; the encoder runs the geometry pipeline (clip, simplify,
//! normalize, quantize) and emits fresh layer messages.

pub mod decoder;
pub mod encoder;

use std::collections::HashMap;

use geo_types::Geometry;

/// Field tags of the MVT wire messages.
pub(crate) mod tag {
    pub const TILE_LAYER: u32 = 3;

    pub const LAYER_NAME: u32 = 1;
    pub const LAYER_FEATURE: u32 = 2;
    pub const LAYER_KEY: u32 = 3;
    pub const LAYER_VALUE: u32 = 4;
    pub const LAYER_EXTENT: u32 = 5;
    pub const LAYER_VERSION: u32 = 15;

    pub const FEATURE_ID: u32 = 1;
    pub const FEATURE_TAGS: u32 = 2;
    pub const FEATURE_TYPE: u32 = 3;
    pub const FEATURE_GEOMETRY: u32 = 4;
    pub const FEATURE_RASTER: u32 = 5;

    pub const VALUE_STRING: u32 = 1;
    pub const VALUE_FLOAT: u32 = 2;
    pub const VALUE_DOUBLE: u32 = 3;
    pub const VALUE_INT: u32 = 4;
    pub const VALUE_UINT: u32 = 5;
    pub const VALUE_SINT: u32 = 6;
    pub const VALUE_BOOL: u32 = 7;
}

/// Geometry command identifiers of the packed command stream.
pub(crate) mod command {
    pub const MOVE_TO: u32 = 1;
    pub const LINE_TO: u32 = 2;
    pub const CLOSE_PATH: u32 = 7;
}

/// Feature geometry-type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeomType {
    Unknown,
    Point,
    LineString,
    Polygon,
}

impl GeomType {
    pub fn from_raw(raw: u64) -> GeomType {
        match raw {
            1 => GeomType::Point,
            2 => GeomType::LineString,
            3 => GeomType::Polygon,
            _ => GeomType::Unknown,
        }
    }

    pub fn as_raw(self) -> u32 {
        match self {
            GeomType::Unknown => 0,
            GeomType::Point => 1,
            GeomType::LineString => 2,
            GeomType::Polygon => 3,
        }
    }
}

/// A typed attribute value from a layer's values dictionary.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Float(f32),
    Double(f64),
    Int(i64),
    Uint(u64),
    Sint(i64),
    Bool(bool),
}

impl Value {
    /// Converts to JSON for `to_json` / GeoJSON property output.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Float(f) => serde_json::json!(f),
            Value::Double(d) => serde_json::json!(d),
            Value::Int(i) | Value::Sint(i) => serde_json::json!(i),
            Value::Uint(u) => serde_json::json!(u),
            Value::Bool(b) => serde_json::Value::Bool(*b),
        }
    }

    /// Hashable identity used for dictionary interning; floats compare by
    /// bit pattern.
    pub(crate) fn intern_key(&self) -> ValueKey {
        match self {
            Value::String(s) => ValueKey::String(s.clone()),
            Value::Float(f) => ValueKey::Float(f.to_bits()),
            Value::Double(d) => ValueKey::Double(d.to_bits()),
            Value::Int(i) => ValueKey::Int(*i),
            Value::Uint(u) => ValueKey::Uint(*u),
            Value::Sint(i) => ValueKey::Sint(*i),
            Value::Bool(b) => ValueKey::Bool(*b),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum ValueKey {
    String(String),
    Float(u32),
    Double(u64),
    Int(i64),
    Uint(u64),
    Sint(i64),
    Bool(bool),
}

/// A layer decoded down to its wire structure. Geometry stays as packed
/// commands; attributes stay as dictionary indexes.
#[derive(Debug, Clone)]
pub struct RawLayer {
    pub name: String,
    pub version: u32,
    pub extent: u32,
    pub keys: Vec<String>,
    pub values: Vec<Value>,
    pub features: Vec<RawFeature>,
}

/// A feature as stored on the wire.
#[derive(Debug, Clone)]
pub struct RawFeature {
    pub id: Option<u64>,
    pub geom_type: GeomType,
    /// Alternating (key index, value index) pairs.
    pub tags: Vec<u32>,
    /// Packed command stream.
    pub geometry: Vec<u32>,
    pub raster: Option<Vec<u8>>,
}

/// A fully decoded feature: mercator geometry and materialized attributes.
#[derive(Debug, Clone)]
pub struct Feature {
    pub id: Option<u64>,
    pub geom_type: GeomType,
    /// `None` for raster-only features.
    pub geometry: Option<Geometry<f64>>,
    pub properties: HashMap<String, Value>,
    pub raster: Option<Vec<u8>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geom_type_round_trips() {
        for geom_type in [
            GeomType::Unknown,
            GeomType::Point,
            GeomType::LineString,
            GeomType::Polygon,
        ] {
            assert_eq!(GeomType::from_raw(u64::from(geom_type.as_raw())), geom_type);
        }
        assert_eq!(GeomType::from_raw(17), GeomType::Unknown);
    }

    #[test]
    fn float_values_intern_by_bits() {
        assert_eq!(
            Value::Double(1.5).intern_key(),
            Value::Double(1.5).intern_key()
        );
        assert_ne!(
            Value::Double(1.5).intern_key(),
            Value::Float(1.5).intern_key()
        );
    }
}
