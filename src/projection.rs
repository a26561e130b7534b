//! WGS84 ↔ Web-Mercator (EPSG:3857) reprojection.
//!
//! The only coordinate systems this crate deals with: geographic longitude
//! and latitude on the WGS84 ellipsoid, and the spherical-mercator plane the
//! tile pyramid is defined on.

use std::f64::consts::PI;

use crate::error::{Error, Result};

/// Spherical earth radius used by EPSG:3857.
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Half the extent of the mercator plane along each axis.
pub const MAX_MERC: f64 = EARTH_RADIUS * PI;

/// Latitude beyond which the mercator projection diverges.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Projects geographic `(lon, lat)` degrees to mercator meters.
///
/// Latitude is clamped to the mercator domain, so the forward direction is
/// total over all in-range inputs.
pub fn lonlat_to_merc(lon: f64, lat: f64) -> (f64, f64) {
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
    let x = lon * MAX_MERC / 180.0;
    let y = EARTH_RADIUS * ((PI / 4.0) + (lat * PI / 360.0)).tan().ln();
    (x, y)
}

/// Projects mercator meters back to geographic `(lon, lat)` degrees.
///
/// Fails with [`Error::Projection`] when the input is not finite, which can
/// only arise from a corrupted hit point; finite inputs always reproject.
pub fn merc_to_lonlat(x: f64, y: f64) -> Result<(f64, f64)> {
    if !x.is_finite() || !y.is_finite() {
        return Err(Error::Projection(format!(
            "mercator coordinate ({x}, {y}) is not finite"
        )));
    }
    let lon = x * 180.0 / MAX_MERC;
    let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - PI / 2.0) * 180.0 / PI;
    Ok((lon, lat))
}
