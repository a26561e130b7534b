//! Tile addressing and mercator extent math.
//!
//! Tiles live in the Web-Mercator pyramid: at zoom `z` the mercator plane
//! is split into `2^z × 2^z` tiles with the origin tile in the upper-left
//! corner. Within a tile, grid coordinates run from `0` to the layer's
//! `extent` with the y axis pointing down.

use crate::error::{Error, Result};
use crate::projection::MAX_MERC;

/// Default grid resolution within a tile.
pub const DEFAULT_EXTENT: u32 = 4096;

/// Maximal zoom level. This covers all tile grids whose coordinates are
/// representable with signed 32-bit integers.
pub const MAX_ZOOM: u32 = 30;

/// Validates a tile address and its pixel dimensions.
pub fn validate(z: u32, x: u32, y: u32, tile_size: u32, buffer_size: i32) -> Result<()> {
    if z > MAX_ZOOM {
        return Err(Error::InvalidArgument(format!(
            "zoom level {z} exceeds the maximum of {MAX_ZOOM}"
        )));
    }
    let max_coord = 1u64 << z;
    if u64::from(x) >= max_coord || u64::from(y) >= max_coord {
        return Err(Error::InvalidArgument(format!(
            "tile coordinate ({x}, {y}) is out of range for zoom {z}"
        )));
    }
    if tile_size == 0 {
        return Err(Error::InvalidArgument(
            "tile_size must be greater than zero".to_string(),
        ));
    }
    if i64::from(tile_size) + 2 * i64::from(buffer_size) <= 0 {
        return Err(Error::InvalidArgument(format!(
            "buffer_size {buffer_size} would collapse a {tile_size} pixel tile"
        )));
    }
    Ok(())
}

/// Mercator bounding box `[minx, miny, maxx, maxy]` of tile `(z, x, y)`.
pub fn tile_extent(z: u32, x: u32, y: u32) -> [f64; 4] {
    let span = tile_span(z);
    let minx = -MAX_MERC + f64::from(x) * span;
    let maxy = MAX_MERC - f64::from(y) * span;
    [minx, maxy - span, minx + span, maxy]
}

/// Mercator bounding box grown by `buffer_size` pixels of a
/// `tile_size`-pixel tile on every side.
pub fn buffered_extent(
    z: u32,
    x: u32,
    y: u32,
    tile_size: u32,
    buffer_size: i32,
) -> [f64; 4] {
    let [minx, miny, maxx, maxy] = tile_extent(z, x, y);
    let pad = tile_span(z) * f64::from(buffer_size) / f64::from(tile_size);
    [minx - pad, miny - pad, maxx + pad, maxy + pad]
}

/// Mercator width (and height) of one tile at zoom `z`.
pub fn tile_span(z: u32) -> f64 {
    2.0 * MAX_MERC / (1u64 << z) as f64
}

/// Affine mapping between mercator meters and a tile's integer grid.
#[derive(Debug, Clone, Copy)]
pub struct GridTransform {
    minx: f64,
    maxy: f64,
    /// Mercator meters per grid unit.
    resolution: f64,
}

impl GridTransform {
    /// Transform for tile `(z, x, y)` at grid resolution `extent`.
    pub fn new(z: u32, x: u32, y: u32, extent: u32) -> Self {
        let bbox = tile_extent(z, x, y);
        GridTransform {
            minx: bbox[0],
            maxy: bbox[3],
            resolution: tile_span(z) / f64::from(extent.max(1)),
        }
    }

    /// Grid coordinates (y down) of a mercator point.
    pub fn to_grid(&self, mx: f64, my: f64) -> (f64, f64) {
        (
            (mx - self.minx) / self.resolution,
            (self.maxy - my) / self.resolution,
        )
    }

    /// Mercator coordinates of a grid point.
    pub fn to_merc(&self, gx: f64, gy: f64) -> (f64, f64) {
        (
            self.minx + gx * self.resolution,
            self.maxy - gy * self.resolution,
        )
    }
}
