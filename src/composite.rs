//! Compositing: merging source tiles into a target tile.
//!
//! Two modes. The byte-splice fast path appends source layer messages
//! verbatim when nothing about the target requires re-projection. The
//! re-encode path decodes source features to mercator and runs them
//! through the encoder pipeline against the target's grid. Either way the
//! target is only mutated after every source has been processed.

use rayon::prelude::*;

use crate::codec::decoder::decode_features;
use crate::codec::encoder::{GeometryPipeline, LayerBuilder};
use crate::codec::Feature;
use crate::coords::GridTransform;
use crate::error::{Error, Result};
use crate::options::{CompositeOptions, ThreadingMode};
use crate::tile::Tile;

impl Tile {
    /// Merges `sources`, in order, into this tile.
    ///
    /// Layer name conflicts keep the first writer (the target's layers
    /// win over every source, earlier sources win over later ones); a
    /// conflicting source layer still marks the name as painted. On error
    /// the target is left bit-identical.
    pub fn composite(&mut self, sources: &[&Tile], options: &CompositeOptions) -> Result<()> {
        options.validate()?;
        if sources.is_empty() {
            return Ok(());
        }
        let mut staged = self.clone();
        for (index, source) in sources.iter().enumerate() {
            composite_one(&mut staged, source, options)
                .map_err(|e| Error::into_composite(e, index))?;
        }
        *self = staged;
        Ok(())
    }
}

/// A source can be byte-spliced when its layers are already encoded in the
/// target's grid: same pyramid address, unit scale, no offset, and no
/// clipping extent override.
fn can_splice(target: &Tile, source: &Tile, options: &CompositeOptions) -> bool {
    !options.reencode
        && source.z() == target.z()
        && source.x() == target.x()
        && source.y() == target.y()
        && options.scale_factor == 1.0
        && options.offset_x == 0
        && options.offset_y == 0
        && options.max_extent.is_none()
}

fn composite_one(target: &mut Tile, source: &Tile, options: &CompositeOptions) -> Result<()> {
    if can_splice(target, source, options) {
        for name in source.names().to_vec() {
            if target.has_layer(&name) {
                log::debug!("layer '{name}' already present in target, keeping it");
                target.mark_painted(&name);
                continue;
            }
            let (field, version) = match (
                source.layer_field_bytes(&name),
                source.layer_entry(&name),
            ) {
                (Some(field), Some(entry)) => (field.to_vec(), entry.version),
                _ => continue,
            };
            target.push_raw_layer(&name, &field, version);
        }
        return Ok(());
    }
    reencode_source(target, source, options)
}

fn reencode_source(target: &mut Tile, source: &Tile, options: &CompositeOptions) -> Result<()> {
    let extent = crate::coords::DEFAULT_EXTENT;
    let transform = GridTransform::new(target.z(), target.x(), target.y(), extent);
    let clip_bounds = options
        .max_extent
        .unwrap_or_else(|| target.buffered_extent());
    let pipeline = GeometryPipeline::new(transform, clip_bounds, options.encode_options())
        .with_offset(options.offset_x, options.offset_y);

    // each source layer decodes over an independent buffer slice, so the
    // async mode fans the decode out and joins before any encoding
    let names = source.names().to_vec();
    let decode = |name: &String| -> Result<(String, Vec<Feature>)> {
        let raw = source.raw_layer(name)?;
        let features = decode_features(&raw, source.z(), source.x(), source.y(), None)?;
        Ok((name.clone(), features))
    };
    let decoded: Vec<(String, Vec<Feature>)> =
        if options.threading_mode.contains(ThreadingMode::ASYNC) {
            names
                .par_iter()
                .map(decode)
                .collect::<Result<Vec<_>>>()?
        } else {
            names.iter().map(decode).collect::<Result<Vec<_>>>()?
        };

    for (name, features) in decoded {
        if target.has_layer(&name) {
            log::debug!("layer '{name}' already present in target, keeping it");
            target.mark_painted(&name);
            continue;
        }
        let mut builder = LayerBuilder::new(&name, extent);
        for feature in features {
            if let Some(raster) = &feature.raster {
                builder.add_raster_feature(raster, &feature.properties);
                continue;
            }
            let Some(geometry) = &feature.geometry else {
                continue;
            };
            for (geom_type, data) in pipeline.process(geometry) {
                builder.add_feature(feature.id, geom_type, data, &feature.properties);
            }
        }
        let count = builder.feature_count();
        target.push_built_layer(&name, &builder.into_bytes(), count);
    }
    Ok(())
}
