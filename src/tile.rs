//! The in-memory vector tile.
//!
//! A tile owns its encoded buffer: MVT bytes exactly as they will be
//! emitted, plus derived indexes (layer order, byte ranges, painted and
//! empty layer names). Mutations either append complete layer messages or
//! replace the buffer wholesale; earlier bytes are never rewritten.

use std::collections::{HashMap, HashSet};
use std::ops::Range;

use crate::codec::decoder::{decode_features, decode_raw_layer, scan_layers};
use crate::codec::encoder::upgrade_layer;
use crate::codec::{Feature, RawLayer};
use crate::compression::{decompress_if_needed, gzip_compress};
use crate::coords;
use crate::error::{Error, Result};
use crate::options::{DataOptions, GetDataOptions, OutputCompression};
use crate::pbf::Writer;
use crate::validator;

/// Where a layer's bytes live inside the tile buffer.
#[derive(Debug, Clone)]
pub(crate) struct LayerEntry {
    /// Complete field: key, length prefix, and body.
    pub range: Range<usize>,
    /// The layer message body.
    pub body: Range<usize>,
    pub version: u32,
}

/// A vector tile addressed by `(z, x, y)` in the Web-Mercator pyramid.
#[derive(Debug, Clone, Default)]
pub struct Tile {
    z: u32,
    x: u32,
    y: u32,
    tile_size: u32,
    buffer_size: i32,
    buffer: Vec<u8>,
    layers: Vec<String>,
    layer_index: HashMap<String, LayerEntry>,
    painted: HashSet<String>,
    empty: HashSet<String>,
}

impl Tile {
    /// Creates an empty tile with the default 4096 pixel tile size and 128
    /// pixel buffer.
    pub fn new(z: u32, x: u32, y: u32) -> Result<Self> {
        Tile::with_dimensions(z, x, y, coords::DEFAULT_EXTENT, 128)
    }

    /// Creates an empty tile with explicit dimensions.
    pub fn with_dimensions(
        z: u32,
        x: u32,
        y: u32,
        tile_size: u32,
        buffer_size: i32,
    ) -> Result<Self> {
        coords::validate(z, x, y, tile_size, buffer_size)?;
        Ok(Tile {
            z,
            x,
            y,
            tile_size,
            buffer_size,
            ..Default::default()
        })
    }

    pub fn z(&self) -> u32 {
        self.z
    }

    pub fn x(&self) -> u32 {
        self.x
    }

    pub fn y(&self) -> u32 {
        self.y
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn buffer_size(&self) -> i32 {
        self.buffer_size
    }

    pub fn set_tile_size(&mut self, tile_size: u32) -> Result<()> {
        coords::validate(self.z, self.x, self.y, tile_size, self.buffer_size)?;
        self.tile_size = tile_size;
        Ok(())
    }

    pub fn set_buffer_size(&mut self, buffer_size: i32) -> Result<()> {
        coords::validate(self.z, self.x, self.y, self.tile_size, buffer_size)?;
        self.buffer_size = buffer_size;
        Ok(())
    }

    /// Mercator bounding box `[minx, miny, maxx, maxy]` of the tile.
    pub fn extent(&self) -> [f64; 4] {
        coords::tile_extent(self.z, self.x, self.y)
    }

    /// The extent grown by the tile's pixel buffer.
    pub fn buffered_extent(&self) -> [f64; 4] {
        coords::buffered_extent(self.z, self.x, self.y, self.tile_size, self.buffer_size)
    }

    /// Layer names in buffer order.
    pub fn names(&self) -> &[String] {
        &self.layers
    }

    pub fn has_layer(&self, name: &str) -> bool {
        self.layer_index.contains_key(name)
    }

    /// True when the tile holds no layers.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// True when any layer was offered data during a build, whether or not
    /// features survived.
    pub fn painted(&self) -> bool {
        !self.painted.is_empty() || !self.buffer.is_empty()
    }

    /// Names offered to the encoder during builds, sorted.
    pub fn painted_layers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.painted.iter().cloned().collect();
        names.sort();
        names
    }

    /// Names whose encoded body ended up with zero features, sorted.
    pub fn empty_layers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.empty.iter().cloned().collect();
        names.sort();
        names
    }

    /// The encoded buffer as it stands.
    pub fn data(&self) -> &[u8] {
        &self.buffer
    }

    /// Replaces the buffer with `bytes` (raw, gzip, or zlib framed),
    /// clearing all indexes first. All-or-nothing: on error the tile keeps
    /// its previous content.
    pub fn set_data(&mut self, bytes: &[u8], options: &DataOptions) -> Result<()> {
        let staged = Staged::build(bytes, options, &HashSet::new())?;
        self.buffer.clear();
        self.layers.clear();
        self.layer_index.clear();
        self.painted.clear();
        self.empty.clear();
        self.commit(staged);
        Ok(())
    }

    /// Appends the layers of `bytes` to the buffer. Layers whose names are
    /// already present are skipped (first writer wins).
    pub fn add_data(&mut self, bytes: &[u8], options: &DataOptions) -> Result<()> {
        let existing: HashSet<String> = self.layer_index.keys().cloned().collect();
        let staged = Staged::build(bytes, options, &existing)?;
        self.commit(staged);
        Ok(())
    }

    fn commit(&mut self, staged: Staged) {
        let base = self.buffer.len();
        self.buffer.extend_from_slice(&staged.bytes);
        for layer in staged.layers {
            self.layer_index.insert(
                layer.name.clone(),
                LayerEntry {
                    range: base + layer.range.start..base + layer.range.end,
                    body: base + layer.body.start..base + layer.body.end,
                    version: layer.version,
                },
            );
            self.painted.insert(layer.name.clone());
            self.layers.push(layer.name);
        }
        for name in staged.empty {
            self.painted.insert(name.clone());
            self.empty.insert(name);
        }
    }

    /// Returns the encoded bytes, optionally gzip framed. `release` empties
    /// the tile after the bytes are taken.
    pub fn get_data(&mut self, options: &GetDataOptions) -> Result<Vec<u8>> {
        let out = match options.compression {
            OutputCompression::None => {
                if options.release {
                    let buffer = std::mem::take(&mut self.buffer);
                    self.clear();
                    return Ok(buffer);
                }
                self.buffer.clone()
            }
            OutputCompression::Gzip => {
                gzip_compress(&self.buffer, options.level, options.strategy)?
            }
        };
        if options.release {
            self.clear();
        }
        Ok(out)
    }

    /// Empties the buffer and all indexes but keeps the tile's identity.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.layers.clear();
        self.layer_index.clear();
        self.painted.clear();
        self.empty.clear();
    }

    /// Extracts one layer into a new tile sharing this tile's identity.
    pub fn layer(&self, name: &str) -> Result<Tile> {
        let entry = self.layer_index.get(name).ok_or_else(|| {
            Error::InvalidArgument(format!("layer '{name}' does not exist in the tile"))
        })?;
        let mut extracted = Tile::with_dimensions(
            self.z,
            self.x,
            self.y,
            self.tile_size,
            self.buffer_size,
        )?;
        extracted.buffer = self.buffer[entry.range.clone()].to_vec();
        extracted.layer_index.insert(
            name.to_string(),
            LayerEntry {
                range: 0..entry.range.len(),
                body: entry.body.start - entry.range.start
                    ..entry.body.end - entry.range.start,
                version: entry.version,
            },
        );
        extracted.layers.push(name.to_string());
        Ok(extracted)
    }

    /// Decodes the named layer's features for a renderer or other consumer,
    /// geometry in mercator meters.
    pub fn layer_features(&self, name: &str) -> Result<Vec<Feature>> {
        let raw = self.raw_layer(name)?;
        decode_features(&raw, self.z, self.x, self.y, None)
    }

    pub(crate) fn layer_entry(&self, name: &str) -> Option<&LayerEntry> {
        self.layer_index.get(name)
    }

    pub(crate) fn layer_field_bytes(&self, name: &str) -> Option<&[u8]> {
        self.layer_index
            .get(name)
            .map(|entry| &self.buffer[entry.range.clone()])
    }

    pub(crate) fn layer_body_bytes(&self, name: &str) -> Option<&[u8]> {
        self.layer_index
            .get(name)
            .map(|entry| &self.buffer[entry.body.clone()])
    }

    pub(crate) fn raw_layer(&self, name: &str) -> Result<RawLayer> {
        let body = self.layer_body_bytes(name).ok_or_else(|| {
            Error::InvalidArgument(format!("layer '{name}' does not exist in the tile"))
        })?;
        decode_raw_layer(body)
    }

    /// Appends a freshly encoded layer message body produced by a build
    /// step, maintaining the painted and empty sets.
    pub(crate) fn push_built_layer(&mut self, name: &str, body: &[u8], feature_count: usize) {
        self.painted.insert(name.to_string());
        if feature_count == 0 {
            log::debug!("layer '{name}' painted but empty, not emitting");
            self.empty.insert(name.to_string());
            return;
        }
        let start = self.buffer.len();
        let mut writer = Writer::with_capacity(body.len() + 8);
        writer.write_bytes_field(crate::codec::tag::TILE_LAYER, body);
        let field = writer.into_inner();
        self.buffer.extend_from_slice(&field);
        let end = self.buffer.len();
        self.layer_index.insert(
            name.to_string(),
            LayerEntry {
                range: start..end,
                body: end - body.len()..end,
                version: crate::codec::encoder::ENCODE_VERSION,
            },
        );
        self.layers.push(name.to_string());
    }

    /// Records that a layer name was offered data, without adding bytes.
    pub(crate) fn mark_painted(&mut self, name: &str) {
        self.painted.insert(name.to_string());
    }

    /// Splices a complete, already-encoded layer field from another tile.
    pub(crate) fn push_raw_layer(&mut self, name: &str, field_bytes: &[u8], version: u32) {
        let start = self.buffer.len();
        self.buffer.extend_from_slice(field_bytes);
        let end = self.buffer.len();
        // re-scan the spliced field for its body offset
        let body_len = body_length(field_bytes);
        self.layer_index.insert(
            name.to_string(),
            LayerEntry {
                range: start..end,
                body: end - body_len..end,
                version,
            },
        );
        self.painted.insert(name.to_string());
        self.layers.push(name.to_string());
    }
}

/// Body length of a complete layer field (key + length prefix + body).
fn body_length(field_bytes: &[u8]) -> usize {
    let mut reader = crate::pbf::Reader::new(field_bytes);
    if reader.next_field().is_ok() {
        if let Ok(body) = reader.read_bytes() {
            return body.len();
        }
    }
    0
}

/// Layers staged for an all-or-nothing commit.
struct Staged {
    bytes: Vec<u8>,
    layers: Vec<StagedLayer>,
    /// Painted-but-empty layer names that contribute no bytes.
    empty: Vec<String>,
}

struct StagedLayer {
    name: String,
    range: Range<usize>,
    body: Range<usize>,
    version: u32,
}

impl Staged {
    fn build(bytes: &[u8], options: &DataOptions, existing: &HashSet<String>) -> Result<Staged> {
        let raw = decompress_if_needed(bytes)?;
        if options.validate {
            let report = validator::validate_buffer(&raw);
            if let Some(error) = report.first_fatal() {
                return Err(error);
            }
        }
        let slices = scan_layers(&raw)?;
        let mut staged = Staged {
            bytes: Vec::with_capacity(raw.len()),
            layers: Vec::with_capacity(slices.len()),
            empty: Vec::new(),
        };
        let mut seen: HashSet<String> = HashSet::new();
        for slice in slices {
            if existing.contains(&slice.name) || !seen.insert(slice.name.clone()) {
                log::debug!("skipping duplicate layer '{}'", slice.name);
                continue;
            }
            if !(1..=2).contains(&slice.version) {
                if options.validate {
                    return Err(Error::UnsupportedVersion(slice.version));
                }
                log::warn!(
                    "accepting layer '{}' with unsupported version {}",
                    slice.name,
                    slice.version
                );
            }
            if !slice.has_features {
                staged.empty.push(slice.name);
                continue;
            }
            if options.upgrade && slice.version == 1 {
                let layer = decode_raw_layer(&raw[slice.body.clone()])?;
                let upgraded = upgrade_layer(&layer)?;
                let start = staged.bytes.len();
                let mut writer = Writer::with_capacity(upgraded.len() + 8);
                writer.write_bytes_field(crate::codec::tag::TILE_LAYER, &upgraded);
                staged.bytes.extend_from_slice(&writer.into_inner());
                let end = staged.bytes.len();
                staged.layers.push(StagedLayer {
                    name: slice.name,
                    range: start..end,
                    body: end - upgraded.len()..end,
                    version: crate::codec::encoder::ENCODE_VERSION,
                });
            } else {
                let start = staged.bytes.len();
                staged.bytes.extend_from_slice(&raw[slice.range.clone()]);
                let end = staged.bytes.len();
                let body_len = slice.body.len();
                staged.layers.push(StagedLayer {
                    name: slice.name,
                    range: start..end,
                    body: end - body_len..end,
                    version: slice.version,
                });
            }
        }
        Ok(staged)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use geo_types::{Geometry, Point};

    use super::*;
    use crate::codec::encoder::{encode_geometry, LayerBuilder};

    fn tile_bytes(layer_names: &[&str]) -> Vec<u8> {
        let mut writer = Writer::new();
        for name in layer_names {
            let mut builder = LayerBuilder::new(name, 4096);
            let (geom_type, data) =
                encode_geometry(&Geometry::Point(Point::new(100.0, 100.0))).unwrap();
            builder.add_feature(None, geom_type, data, &HashMap::new());
            writer.write_bytes_field(crate::codec::tag::TILE_LAYER, &builder.into_bytes());
        }
        writer.into_inner()
    }

    #[test]
    fn new_validates_identity() {
        assert!(Tile::new(9, 112, 195).is_ok());
        assert!(Tile::new(1, 2, 0).is_err());
        assert!(Tile::with_dimensions(1, 0, 0, 0, 0).is_err());
    }

    #[test]
    fn set_data_indexes_layers() {
        let mut tile = Tile::new(0, 0, 0).unwrap();
        tile.set_data(&tile_bytes(&["water", "roads"]), &DataOptions::default())
            .unwrap();
        assert_eq!(tile.names(), &["water", "roads"]);
        assert!(tile.has_layer("water"));
        assert!(!tile.is_empty());
        assert!(tile.painted());
    }

    #[test]
    fn add_data_keeps_first_writer() {
        let mut tile = Tile::new(0, 0, 0).unwrap();
        tile.set_data(&tile_bytes(&["water"]), &DataOptions::default())
            .unwrap();
        let before = tile.layer_field_bytes("water").unwrap().to_vec();
        tile.add_data(&tile_bytes(&["water", "roads"]), &DataOptions::default())
            .unwrap();
        assert_eq!(tile.names(), &["water", "roads"]);
        assert_eq!(tile.layer_field_bytes("water").unwrap(), &before[..]);
    }

    #[test]
    fn layer_extraction_preserves_bytes() {
        let mut tile = Tile::new(0, 0, 0).unwrap();
        tile.set_data(&tile_bytes(&["water", "roads"]), &DataOptions::default())
            .unwrap();
        let extracted = tile.layer("roads").unwrap();
        assert_eq!(extracted.names(), &["roads"]);
        assert_eq!(extracted.z(), tile.z());
        assert_eq!(
            extracted.data(),
            tile.layer_field_bytes("roads").unwrap()
        );
        assert!(tile.layer("missing").is_err());
    }

    #[test]
    fn clear_keeps_identity() {
        let mut tile = Tile::new(2, 1, 1).unwrap();
        tile.set_data(&tile_bytes(&["water"]), &DataOptions::default())
            .unwrap();
        tile.clear();
        assert!(tile.is_empty());
        assert!(tile.data().is_empty());
        assert_eq!((tile.z(), tile.x(), tile.y()), (2, 1, 1));
    }

    #[test]
    fn get_data_release_empties_the_tile() {
        let mut tile = Tile::new(0, 0, 0).unwrap();
        let bytes = tile_bytes(&["water"]);
        tile.set_data(&bytes, &DataOptions::default()).unwrap();
        let taken = tile
            .get_data(&GetDataOptions {
                release: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(taken, bytes);
        assert!(tile.is_empty());
        assert!(tile.data().is_empty());
    }

    #[test]
    fn get_data_gzip_round_trips() {
        let mut tile = Tile::new(0, 0, 0).unwrap();
        let bytes = tile_bytes(&["water"]);
        tile.set_data(&bytes, &DataOptions::default()).unwrap();
        let compressed = tile
            .get_data(&GetDataOptions {
                compression: OutputCompression::Gzip,
                level: 9,
                ..Default::default()
            })
            .unwrap();
        assert!(crate::compression::is_gzip(&compressed));
        assert_eq!(decompress_if_needed(&compressed).unwrap(), bytes);
        // without release the buffer is intact
        assert_eq!(tile.data(), &bytes[..]);
    }

    #[test]
    fn gzip_framed_input_is_accepted() {
        let bytes = tile_bytes(&["water"]);
        let framed =
            gzip_compress(&bytes, 6, crate::options::CompressionStrategy::Default).unwrap();
        let mut tile = Tile::new(0, 0, 0).unwrap();
        tile.set_data(&framed, &DataOptions::default()).unwrap();
        assert_eq!(tile.names(), &["water"]);
        assert_eq!(tile.data(), &bytes[..]);
    }

    #[test]
    fn corrupt_data_leaves_tile_unchanged() {
        let mut tile = Tile::new(0, 0, 0).unwrap();
        tile.set_data(&tile_bytes(&["water"]), &DataOptions::default())
            .unwrap();
        let before = tile.data().to_vec();
        // field 3 wire 2 with a length pointing past the end
        let corrupt = [0x1a, 0x7f, 0x01, 0x02];
        assert!(tile.set_data(&corrupt, &DataOptions::default()).is_err());
        assert_eq!(tile.data(), &before[..]);
        assert_eq!(tile.names(), &["water"]);
    }

    #[test]
    fn layer_features_decode_on_demand() {
        let mut tile = Tile::new(0, 0, 0).unwrap();
        tile.set_data(&tile_bytes(&["water"]), &DataOptions::default())
            .unwrap();
        let features = tile.layer_features("water").unwrap();
        assert_eq!(features.len(), 1);
        assert!(features[0].geometry.is_some());
    }
}
