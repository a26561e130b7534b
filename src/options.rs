//! Option records and the closed enum sets used by the public operations.
//!
//! Every optional behavior is modeled as a configuration record with
//! defaulted fields; the enums here are the authoritative closed sets, and
//! anything outside them is rejected at the API boundary.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Rule used to resolve polygon interiors versus holes from ring winding
/// and area sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FillType {
    EvenOdd,
    NonZero,
    #[default]
    Positive,
    Negative,
}

/// Raster resampling method recorded on image layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScalingMethod {
    Near,
    #[default]
    Bilinear,
    Bicubic,
    Spline16,
    Spline36,
    Hanning,
    Hamming,
    Hermite,
    Kaiser,
    Quadric,
    Catrom,
    Gaussian,
    Bessel,
    Mitchell,
    Sinc,
    Lanczos,
    Blackman,
}

impl ScalingMethod {
    /// Parses the lowercase method name, e.g. `"gaussian"`.
    pub fn from_name(name: &str) -> Result<Self> {
        serde_json::from_value(serde_json::Value::String(name.to_string())).map_err(|_| {
            Error::InvalidArgument(format!("'{name}' is not a valid scaling method"))
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScalingMethod::Near => "near",
            ScalingMethod::Bilinear => "bilinear",
            ScalingMethod::Bicubic => "bicubic",
            ScalingMethod::Spline16 => "spline16",
            ScalingMethod::Spline36 => "spline36",
            ScalingMethod::Hanning => "hanning",
            ScalingMethod::Hamming => "hamming",
            ScalingMethod::Hermite => "hermite",
            ScalingMethod::Kaiser => "kaiser",
            ScalingMethod::Quadric => "quadric",
            ScalingMethod::Catrom => "catrom",
            ScalingMethod::Gaussian => "gaussian",
            ScalingMethod::Bessel => "bessel",
            ScalingMethod::Mitchell => "mitchell",
            ScalingMethod::Sinc => "sinc",
            ScalingMethod::Lanczos => "lanczos",
            ScalingMethod::Blackman => "blackman",
        }
    }
}

/// Format tag attached to raster payloads. The bytes themselves are opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    #[default]
    Webp,
    Jpeg,
    Png,
    Tiff,
}

impl ImageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Webp => "webp",
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Png => "png",
            ImageFormat::Tiff => "tiff",
        }
    }

    /// Parses the lowercase format name.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "webp" => Ok(ImageFormat::Webp),
            "jpeg" => Ok(ImageFormat::Jpeg),
            "png" => Ok(ImageFormat::Png),
            "tiff" => Ok(ImageFormat::Tiff),
            _ => Err(Error::InvalidArgument(format!(
                "'{name}' is not a valid image format"
            ))),
        }
    }
}

/// Deflate strategy for compressed output. The backend treats this as an
/// advisory hint; every strategy yields a valid stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CompressionStrategy {
    #[default]
    Default,
    Filtered,
    HuffmanOnly,
    Rle,
    Fixed,
}

/// Output framing for [`crate::tile::Tile::get_data`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputCompression {
    #[default]
    None,
    Gzip,
}

bitflags! {
    /// Scheduling contract for composite work.
    ///
    /// `DEFERRED` runs everything on the caller's thread; `ASYNC` may fan
    /// per-source work onto a worker pool and joins before returning; the
    /// union lets the implementation choose per task.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ThreadingMode: u8 {
        const DEFERRED = 0b01;
        const ASYNC = 0b10;
    }
}

impl Default for ThreadingMode {
    fn default() -> Self {
        ThreadingMode::DEFERRED
    }
}

/// Options for `set_data` / `add_data`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataOptions {
    /// Run structural validation and fail on findings instead of accepting
    /// the buffer as-is.
    pub validate: bool,
    /// Rewrite v1 layer content to satisfy v2 invariants.
    pub upgrade: bool,
}

/// Options for `get_data`.
#[derive(Debug, Clone, Copy)]
pub struct GetDataOptions {
    pub compression: OutputCompression,
    /// Empty the tile's buffer after the bytes are taken.
    pub release: bool,
    /// Deflate level `0..=9`.
    pub level: u32,
    pub strategy: CompressionStrategy,
}

impl Default for GetDataOptions {
    fn default() -> Self {
        GetDataOptions {
            compression: OutputCompression::None,
            release: false,
            level: 6,
            strategy: CompressionStrategy::Default,
        }
    }
}

/// Geometry-pipeline options shared by GeoJSON ingest and re-encoding
/// composites.
#[derive(Debug, Clone, Copy)]
pub struct EncodeOptions {
    /// Rings with an absolute area (in grid units) below this are dropped.
    pub area_threshold: f64,
    /// Douglas-Peucker tolerance in grid units; `0.0` disables.
    pub simplify_distance: f64,
    /// Drop output rings that fail the OGC simplicity check.
    pub strictly_simple: bool,
    /// Union overlapping multi-polygon members before encoding.
    pub multi_polygon_union: bool,
    pub fill_type: FillType,
    /// Re-derive ring roles from signed area instead of trusting source
    /// ring order.
    pub process_all_rings: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        EncodeOptions {
            area_threshold: 0.1,
            simplify_distance: 0.0,
            strictly_simple: true,
            multi_polygon_union: false,
            fill_type: FillType::default(),
            process_all_rings: false,
        }
    }
}

impl EncodeOptions {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.area_threshold < 0.0 {
            return Err(Error::InvalidArgument(
                "area_threshold can not be negative".to_string(),
            ));
        }
        if self.simplify_distance < 0.0 {
            return Err(Error::InvalidArgument(
                "simplify_distance can not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Options for `composite`.
#[derive(Debug, Clone)]
pub struct CompositeOptions {
    pub scale_factor: f64,
    pub offset_x: i64,
    pub offset_y: i64,
    pub area_threshold: f64,
    pub strictly_simple: bool,
    pub multi_polygon_union: bool,
    pub fill_type: FillType,
    pub scale_denominator: f64,
    /// Force re-encoding even when a byte splice would be possible.
    pub reencode: bool,
    /// Clip target extent `[minx, miny, maxx, maxy]` in mercator meters;
    /// defaults to the target tile's buffered extent.
    pub max_extent: Option<[f64; 4]>,
    pub simplify_distance: f64,
    pub process_all_rings: bool,
    pub image_format: ImageFormat,
    pub scaling_method: ScalingMethod,
    pub threading_mode: ThreadingMode,
}

impl Default for CompositeOptions {
    fn default() -> Self {
        CompositeOptions {
            scale_factor: 1.0,
            offset_x: 0,
            offset_y: 0,
            area_threshold: 0.1,
            strictly_simple: true,
            multi_polygon_union: false,
            fill_type: FillType::default(),
            scale_denominator: 0.0,
            reencode: false,
            max_extent: None,
            simplify_distance: 0.0,
            process_all_rings: false,
            image_format: ImageFormat::default(),
            scaling_method: ScalingMethod::default(),
            threading_mode: ThreadingMode::default(),
        }
    }
}

impl CompositeOptions {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.scale_factor <= 0.0 {
            return Err(Error::InvalidArgument(
                "scale_factor must be greater than zero".to_string(),
            ));
        }
        if self.area_threshold < 0.0 {
            return Err(Error::InvalidArgument(
                "area_threshold can not be negative".to_string(),
            ));
        }
        if self.simplify_distance < 0.0 {
            return Err(Error::InvalidArgument(
                "simplify_distance can not be negative".to_string(),
            ));
        }
        if self.scale_denominator < 0.0 {
            return Err(Error::InvalidArgument(
                "scale_denominator must be non negative".to_string(),
            ));
        }
        if self.threading_mode.is_empty() {
            return Err(Error::InvalidArgument(
                "threading_mode is invalid".to_string(),
            ));
        }
        if let Some([minx, miny, maxx, maxy]) = self.max_extent {
            if !(minx < maxx && miny < maxy) {
                return Err(Error::InvalidArgument(
                    "max_extent must be a non-empty [minx,miny,maxx,maxy] box".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub(crate) fn encode_options(&self) -> EncodeOptions {
        EncodeOptions {
            area_threshold: self.area_threshold,
            simplify_distance: self.simplify_distance,
            strictly_simple: self.strictly_simple,
            multi_polygon_union: self.multi_polygon_union,
            fill_type: self.fill_type,
            process_all_rings: self.process_all_rings,
        }
    }
}

/// Options for `add_image_layer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterOptions {
    pub image_format: ImageFormat,
    pub scaling_method: ScalingMethod,
}

/// Options for single-point `query`.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Match distance in mercator meters; polygons ignore it and require
    /// containment.
    pub tolerance: f64,
    /// Restrict the query to one layer; `None` queries every layer in
    /// buffer order.
    pub layer: Option<String>,
}

/// Options for multi-point `query_many`. The layer is mandatory.
#[derive(Debug, Clone, Default)]
pub struct QueryManyOptions {
    pub tolerance: f64,
    pub layer: String,
    /// Attribute names to materialize; empty requests every layer-declared
    /// field.
    pub fields: Vec<String>,
}

/// Options for `to_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToJsonOptions {
    /// Decode command streams into coordinate arrays instead of emitting
    /// the raw packed commands.
    pub decode_geometry: bool,
}

/// Options for the geometry validity report.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidityReportOptions {
    /// Check each member of a multi geometry separately so findings name
    /// the offending part.
    pub split_multi_features: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaling_method_parses_known_names() {
        assert_eq!(
            ScalingMethod::from_name("gaussian").unwrap(),
            ScalingMethod::Gaussian
        );
        assert_eq!(
            ScalingMethod::from_name("near").unwrap(),
            ScalingMethod::Near
        );
        assert!(ScalingMethod::from_name("nearest").is_err());
    }

    #[test]
    fn composite_defaults_are_valid() {
        assert!(CompositeOptions::default().validate().is_ok());
    }

    #[test]
    fn empty_threading_mode_is_rejected() {
        let options = CompositeOptions {
            threading_mode: ThreadingMode::empty(),
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn negative_area_threshold_is_rejected() {
        let options = CompositeOptions {
            area_threshold: -1.0,
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }
}
