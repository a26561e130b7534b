//! Raster layers: opaque image bytes attached to tiles.
//!
//! The engine never decodes image pixels. An image layer is a single
//! feature carrying the caller's bytes verbatim plus the format and
//! scaling tags a downstream renderer needs to interpret them.

use std::collections::HashMap;

use crate::codec::encoder::LayerBuilder;
use crate::codec::Value;
use crate::error::{Error, Result};
use crate::options::RasterOptions;
use crate::tile::Tile;

impl Tile {
    /// Adds `bytes` as a raster layer named `layer_name`.
    ///
    /// The bytes are stored verbatim; `options` records the format tag and
    /// the resampling method a renderer should use when scaling.
    pub fn add_image_layer(
        &mut self,
        bytes: &[u8],
        layer_name: &str,
        options: &RasterOptions,
    ) -> Result<()> {
        if bytes.is_empty() {
            return Err(Error::Io("image buffer is empty".to_string()));
        }
        if self.has_layer(layer_name) {
            log::debug!("layer '{layer_name}' already exists, keeping the first writer");
            return Ok(());
        }
        let mut properties = HashMap::new();
        properties.insert(
            "image_format".to_string(),
            Value::String(options.image_format.as_str().to_string()),
        );
        properties.insert(
            "scaling_method".to_string(),
            Value::String(options.scaling_method.as_str().to_string()),
        );
        let mut builder = LayerBuilder::new(layer_name, crate::coords::DEFAULT_EXTENT);
        builder.add_raster_feature(bytes, &properties);
        let count = builder.feature_count();
        self.push_built_layer(layer_name, &builder.into_bytes(), count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{ImageFormat, ScalingMethod};

    const JPEG_STUB: &[u8] = &[0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10, 0x4a, 0x46, 0x49, 0x46];

    #[test]
    fn image_layer_shows_up_in_names() {
        let mut tile = Tile::with_dimensions(1, 0, 0, 256, 128).unwrap();
        tile.add_image_layer(
            JPEG_STUB,
            "img",
            &RasterOptions {
                image_format: ImageFormat::Jpeg,
                scaling_method: ScalingMethod::Gaussian,
            },
        )
        .unwrap();
        assert_eq!(tile.names(), &["img"]);
        assert!(!tile.is_empty());
        assert!(tile.painted());
    }

    #[test]
    fn image_bytes_survive_verbatim() {
        let mut tile = Tile::new(0, 0, 0).unwrap();
        tile.add_image_layer(JPEG_STUB, "img", &RasterOptions::default())
            .unwrap();
        let features = tile.layer_features("img").unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].raster.as_deref(), Some(JPEG_STUB));
        assert!(features[0].geometry.is_none());
        assert_eq!(
            features[0].properties.get("image_format"),
            Some(&Value::String("webp".to_string()))
        );
    }

    #[test]
    fn empty_image_buffer_is_an_io_error() {
        let mut tile = Tile::new(0, 0, 0).unwrap();
        assert!(matches!(
            tile.add_image_layer(&[], "img", &RasterOptions::default()),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn raster_layer_counts_in_info() {
        let mut tile = Tile::new(0, 0, 0).unwrap();
        tile.add_image_layer(JPEG_STUB, "img", &RasterOptions::default())
            .unwrap();
        let report = crate::validator::info(tile.data());
        assert!(!report.errors);
        assert_eq!(report.layers[0].raster_features, 1);
    }
}
