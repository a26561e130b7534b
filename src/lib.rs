//! A Mapbox Vector Tile engine.
//!
//! `merctile` builds, mutates, composites, queries, and hands off for
//! rendering protocol-buffer encoded tiles of geographic vector data. A
//! tile is addressed by `(z, x, y)` in the Web-Mercator pyramid and holds
//! named layers of geometric features with attributes.
//!
//! The central type is [`Tile`]: it owns its encoded buffer and mutates by
//! appending complete layer messages ([`Tile::add_data`],
//! [`Tile::add_geojson`], [`Tile::add_image_layer`], [`Tile::composite`])
//! or replacing the buffer wholesale ([`Tile::set_data`]). Decoding is
//! selective: queries and feature iteration decode single layers on
//! demand from the byte-range index.
//!
//! ```
//! use merctile::{EncodeOptions, QueryOptions, Tile};
//!
//! # fn main() -> merctile::Result<()> {
//! let geojson = r#"{"type": "Feature", "properties": {"name": "null island"},
//!     "geometry": {"type": "Point", "coordinates": [0.0, 0.0]}}"#;
//!
//! let mut tile = Tile::new(0, 0, 0)?;
//! tile.add_geojson(geojson, "places", &EncodeOptions::default())?;
//!
//! let hits = tile.query(0.0, 0.0, &QueryOptions { tolerance: 10_000.0, layer: None })?;
//! assert_eq!(hits[0].layer, "places");
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod compression;
pub mod coords;
pub mod geometry;
pub mod pbf;
pub mod projection;

mod composite;
mod error;
mod geojson;
mod introspect;
mod options;
mod query;
mod raster;
mod tile;
mod validator;

pub use codec::{Feature, GeomType, Value};
pub use error::{Error, Result};
pub use geojson::GeoJsonSelector;
pub use introspect::{SimplicityFinding, ValidityFinding};
pub use options::{
    CompositeOptions, CompressionStrategy, DataOptions, EncodeOptions, FillType, GetDataOptions,
    ImageFormat, OutputCompression, QueryManyOptions, QueryOptions, RasterOptions, ScalingMethod,
    ThreadingMode, ToJsonOptions, ValidityReportOptions,
};
pub use query::{QueryManyFeature, QueryManyHit, QueryManyResult, QueryResult};
pub use tile::Tile;
pub use validator::{info, LayerInfo, TileInfo, ValidityError};
