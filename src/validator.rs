//! Structural tile validation and the `info` report.
//!
//! Validation walks the wire structure without decoding command streams,
//! collecting findings into a report instead of failing: `info` always
//! succeeds, and ingest with `validate` turns the first fatal finding into
//! an error.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::codec::tag;
use crate::compression::{decompress_if_needed, is_gzip, is_zlib};
use crate::error::Error;
use crate::pbf::{Reader, WIRE_LEN};

/// A structural finding, serialized with the wire-diagnostic spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum ValidityError {
    #[serde(rename = "INVALID_PBF_BUFFER")]
    InvalidPbfBuffer,
    #[serde(rename = "TILE_HAS_UNKNOWN_TAG")]
    TileHasUnknownTag,
    #[serde(rename = "TILE_REPEATED_LAYER_NAMES")]
    TileRepeatedLayerNames,
    #[serde(rename = "TILE_HAS_DIFFERENT_VERSIONS")]
    TileHasDifferentVersions,
    #[serde(rename = "LAYER_HAS_UNSUPPORTED_VERSION")]
    LayerHasUnsupportedVersion,
    #[serde(rename = "LAYER_HAS_NO_NAME")]
    LayerHasNoName,
    #[serde(rename = "LAYER_HAS_INVALID_EXTENT")]
    LayerHasInvalidExtent,
    #[serde(rename = "VALUE_HAS_NO_VALUE")]
    ValueHasNoValue,
    #[serde(rename = "VALUE_HAS_MULTIPLE_VALUES")]
    ValueHasMultipleValues,
    #[serde(rename = "FEATURE_HAS_ODD_TAG_COUNT")]
    FeatureHasOddTagCount,
    #[serde(rename = "FEATURE_TAG_OUT_OF_RANGE")]
    FeatureTagOutOfRange,
    #[serde(rename = "FEATURE_HAS_RASTER_AND_GEOM")]
    FeatureHasRasterAndGeom,
    #[serde(rename = "FEATURE_HAS_NO_GEOM_DATA")]
    FeatureHasNoGeomData,
}

impl ValidityError {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidityError::InvalidPbfBuffer => "INVALID_PBF_BUFFER",
            ValidityError::TileHasUnknownTag => "TILE_HAS_UNKNOWN_TAG",
            ValidityError::TileRepeatedLayerNames => "TILE_REPEATED_LAYER_NAMES",
            ValidityError::TileHasDifferentVersions => "TILE_HAS_DIFFERENT_VERSIONS",
            ValidityError::LayerHasUnsupportedVersion => "LAYER_HAS_UNSUPPORTED_VERSION",
            ValidityError::LayerHasNoName => "LAYER_HAS_NO_NAME",
            ValidityError::LayerHasInvalidExtent => "LAYER_HAS_INVALID_EXTENT",
            ValidityError::ValueHasNoValue => "VALUE_HAS_NO_VALUE",
            ValidityError::ValueHasMultipleValues => "VALUE_HAS_MULTIPLE_VALUES",
            ValidityError::FeatureHasOddTagCount => "FEATURE_HAS_ODD_TAG_COUNT",
            ValidityError::FeatureTagOutOfRange => "FEATURE_TAG_OUT_OF_RANGE",
            ValidityError::FeatureHasRasterAndGeom => "FEATURE_HAS_RASTER_AND_GEOM",
            ValidityError::FeatureHasNoGeomData => "FEATURE_HAS_NO_GEOM_DATA",
        }
    }
}

/// Per-layer slice of the report: feature counts by geometry type plus the
/// layer's structural findings.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LayerInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub features: u64,
    pub point_features: u64,
    pub linestring_features: u64,
    pub polygon_features: u64,
    pub unknown_features: u64,
    pub raster_features: u64,
    pub version: u32,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub errors: BTreeSet<ValidityError>,
}

/// The full report for a tile buffer.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TileInfo {
    pub layers: Vec<LayerInfo>,
    pub errors: bool,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub tile_errors: BTreeSet<ValidityError>,
}

impl TileInfo {
    pub fn has_errors(&self) -> bool {
        self.errors
    }

    /// Maps the report onto the error a validating ingest should raise.
    pub(crate) fn first_fatal(&self) -> Option<Error> {
        for layer in &self.layers {
            if layer.errors.contains(&ValidityError::LayerHasUnsupportedVersion) {
                return Some(Error::UnsupportedVersion(layer.version));
            }
        }
        if self.errors {
            let mut names: Vec<&str> = self
                .tile_errors
                .iter()
                .map(ValidityError::as_str)
                .collect();
            for layer in &self.layers {
                names.extend(layer.errors.iter().map(ValidityError::as_str));
            }
            names.dedup();
            return Some(Error::CorruptInput(format!(
                "tile failed validation: {}",
                names.join(", ")
            )));
        }
        None
    }
}

fn validate_value(body: &[u8]) -> Result<(), ValidityError> {
    let mut reader = Reader::new(body);
    let mut count = 0;
    loop {
        match reader.next_field() {
            Ok(Some(field)) => {
                if (tag::VALUE_STRING..=tag::VALUE_BOOL).contains(&field.tag) {
                    count += 1;
                }
                if reader.skip(field.wire_type).is_err() {
                    return Err(ValidityError::InvalidPbfBuffer);
                }
            }
            Ok(None) => break,
            Err(_) => return Err(ValidityError::InvalidPbfBuffer),
        }
    }
    match count {
        0 => Err(ValidityError::ValueHasNoValue),
        1 => Ok(()),
        _ => Err(ValidityError::ValueHasMultipleValues),
    }
}

struct FeatureSummary {
    geom_type: u64,
    tags: Vec<u32>,
    has_geometry: bool,
    has_raster: bool,
}

fn scan_feature(body: &[u8]) -> Result<FeatureSummary, ValidityError> {
    let mut reader = Reader::new(body);
    let mut summary = FeatureSummary {
        geom_type: 0,
        tags: Vec::new(),
        has_geometry: false,
        has_raster: false,
    };
    loop {
        match reader.next_field() {
            Ok(Some(field)) => {
                let result = match field.tag {
                    tag::FEATURE_TAGS => reader.read_packed_uint32().and_then(|packed| {
                        for value in packed {
                            summary.tags.push(value?);
                        }
                        Ok(())
                    }),
                    tag::FEATURE_TYPE => reader.read_varint().map(|raw| {
                        summary.geom_type = raw;
                    }),
                    tag::FEATURE_GEOMETRY => {
                        summary.has_geometry = true;
                        reader.skip(field.wire_type)
                    }
                    tag::FEATURE_RASTER => {
                        summary.has_raster = true;
                        reader.skip(field.wire_type)
                    }
                    _ => reader.skip(field.wire_type),
                };
                if result.is_err() {
                    return Err(ValidityError::InvalidPbfBuffer);
                }
            }
            Ok(None) => break,
            Err(_) => return Err(ValidityError::InvalidPbfBuffer),
        }
    }
    Ok(summary)
}

fn validate_layer(body: &[u8]) -> LayerInfo {
    let mut info = LayerInfo {
        version: 1,
        ..Default::default()
    };
    let mut key_count: u64 = 0;
    let mut value_count: u64 = 0;
    let mut extent: Option<u32> = None;
    let mut features: Vec<FeatureSummary> = Vec::new();

    let mut reader = Reader::new(body);
    loop {
        match reader.next_field() {
            Ok(Some(field)) => {
                let result = match field.tag {
                    tag::LAYER_NAME => reader.read_string().map(|name| {
                        info.name = Some(name.to_string());
                    }),
                    tag::LAYER_FEATURE => reader.read_bytes().map(|feature_body| {
                        match scan_feature(feature_body) {
                            Ok(summary) => features.push(summary),
                            Err(error) => {
                                info.errors.insert(error);
                            }
                        }
                    }),
                    tag::LAYER_KEY => reader.read_string().map(|_| {
                        key_count += 1;
                    }),
                    tag::LAYER_VALUE => reader.read_bytes().map(|value_body| {
                        value_count += 1;
                        if let Err(error) = validate_value(value_body) {
                            info.errors.insert(error);
                        }
                    }),
                    tag::LAYER_EXTENT => reader.read_uint32().map(|e| {
                        extent = Some(e);
                    }),
                    tag::LAYER_VERSION => reader.read_uint32().map(|v| {
                        info.version = v;
                    }),
                    _ => reader.skip(field.wire_type),
                };
                if result.is_err() {
                    info.errors.insert(ValidityError::InvalidPbfBuffer);
                    break;
                }
            }
            Ok(None) => break,
            Err(_) => {
                info.errors.insert(ValidityError::InvalidPbfBuffer);
                break;
            }
        }
    }

    if info.name.is_none() {
        info.errors.insert(ValidityError::LayerHasNoName);
    }
    if !(1..=2).contains(&info.version) {
        info.errors.insert(ValidityError::LayerHasUnsupportedVersion);
    }
    if extent == Some(0) {
        info.errors.insert(ValidityError::LayerHasInvalidExtent);
    }

    for feature in &features {
        if feature.has_raster {
            info.raster_features += 1;
            if feature.has_geometry {
                info.errors.insert(ValidityError::FeatureHasRasterAndGeom);
            }
        } else if !feature.has_geometry {
            info.unknown_features += 1;
            info.errors.insert(ValidityError::FeatureHasNoGeomData);
        } else {
            match feature.geom_type {
                1 => info.point_features += 1,
                2 => info.linestring_features += 1,
                3 => info.polygon_features += 1,
                _ => info.unknown_features += 1,
            }
        }
        if feature.tags.len() % 2 != 0 {
            info.errors.insert(ValidityError::FeatureHasOddTagCount);
        }
        for pair in feature.tags.chunks_exact(2) {
            if u64::from(pair[0]) >= key_count || u64::from(pair[1]) >= value_count {
                info.errors.insert(ValidityError::FeatureTagOutOfRange);
            }
        }
    }
    info.features = info.point_features
        + info.linestring_features
        + info.polygon_features
        + info.unknown_features
        + info.raster_features;
    info
}

/// Validates an uncompressed tile buffer into a structured report.
pub fn validate_buffer(buf: &[u8]) -> TileInfo {
    let mut report = TileInfo::default();
    let mut seen_names: BTreeSet<String> = BTreeSet::new();
    let mut shared_version: Option<u32> = None;

    let mut reader = Reader::new(buf);
    loop {
        match reader.next_field() {
            Ok(Some(field)) => {
                if field.tag == tag::TILE_LAYER && field.wire_type == WIRE_LEN {
                    match reader.read_bytes() {
                        Ok(body) => {
                            let layer = validate_layer(body);
                            if let Some(name) = &layer.name {
                                if !seen_names.insert(name.clone()) {
                                    report
                                        .tile_errors
                                        .insert(ValidityError::TileRepeatedLayerNames);
                                }
                            }
                            match shared_version {
                                None => shared_version = Some(layer.version),
                                Some(version) if version != layer.version => {
                                    report
                                        .tile_errors
                                        .insert(ValidityError::TileHasDifferentVersions);
                                }
                                Some(_) => {}
                            }
                            report.layers.push(layer);
                        }
                        Err(_) => {
                            report.tile_errors.insert(ValidityError::InvalidPbfBuffer);
                            break;
                        }
                    }
                } else {
                    report.tile_errors.insert(ValidityError::TileHasUnknownTag);
                    if reader.skip(field.wire_type).is_err() {
                        report.tile_errors.insert(ValidityError::InvalidPbfBuffer);
                        break;
                    }
                }
            }
            Ok(None) => break,
            Err(_) => {
                report.tile_errors.insert(ValidityError::InvalidPbfBuffer);
                break;
            }
        }
    }

    report.errors = !report.tile_errors.is_empty()
        || report.layers.iter().any(|layer| !layer.errors.is_empty());
    report
}

/// Builds the `info` report for a tile buffer, inflating compressed input
/// first. Never fails; unreadable input is reported as a finding.
pub fn info(bytes: &[u8]) -> TileInfo {
    if is_gzip(bytes) || is_zlib(bytes) {
        match decompress_if_needed(bytes) {
            Ok(raw) => validate_buffer(&raw),
            Err(_) => {
                let mut report = TileInfo::default();
                report.tile_errors.insert(ValidityError::InvalidPbfBuffer);
                report.errors = true;
                report
            }
        }
    } else {
        validate_buffer(bytes)
    }
}
