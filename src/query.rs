//! Point and multi-point spatial queries over decoded features.
//!
//! Queries take geographic lon/lat input, reproject to mercator, measure
//! against decoded geometry, and back-project hit points. Distances and
//! tolerances are mercator meters.

use std::collections::BTreeMap;

use geo::BoundingRect;

use crate::codec::decoder::decode_features;
use crate::codec::Feature;
use crate::error::{Error, Result};
use crate::geometry::ops::point_to_geometry_distance;
use crate::options::{QueryManyOptions, QueryOptions};
use crate::projection::{lonlat_to_merc, merc_to_lonlat};
use crate::tile::Tile;

/// One ranked hit of a single-point query.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub feature: Feature,
    pub layer: String,
    /// Mercator meters from the query point; zero for polygon containment.
    pub distance: f64,
    /// Hit point, back-projected to longitude.
    pub x_hit: f64,
    /// Hit point, back-projected to latitude.
    pub y_hit: f64,
}

/// A feature matched by a multi-point query.
#[derive(Debug, Clone)]
pub struct QueryManyFeature {
    pub feature: Feature,
    pub layer: String,
}

/// One hit of a multi-point query, referencing a feature by index.
#[derive(Debug, Clone, Copy)]
pub struct QueryManyHit {
    pub distance: f64,
    pub feature_id: u32,
}

/// Result of a multi-point query: deduplicated features plus per-point hit
/// lists sorted by ascending distance.
#[derive(Debug, Clone, Default)]
pub struct QueryManyResult {
    pub features: BTreeMap<u32, QueryManyFeature>,
    pub hits: BTreeMap<usize, Vec<QueryManyHit>>,
}

fn within_tolerance(feature: &Feature, x: f64, y: f64, tolerance: f64) -> bool {
    // cheap reject on the bounding box before the exact distance test
    feature
        .geometry
        .as_ref()
        .and_then(|geometry| geometry.bounding_rect())
        .is_none_or(|rect| {
            x >= rect.min().x - tolerance
                && x <= rect.max().x + tolerance
                && y >= rect.min().y - tolerance
                && y <= rect.max().y + tolerance
        })
}

impl Tile {
    /// Queries every feature within `tolerance` mercator meters of the
    /// geographic point.
    ///
    /// Results are ranked by distance descending; ties break by layer name
    /// ascending, then decode order.
    pub fn query(&self, lon: f64, lat: f64, options: &QueryOptions) -> Result<Vec<QueryResult>> {
        let mut results = Vec::new();
        if self.is_empty() {
            return Ok(results);
        }
        let (x, y) = lonlat_to_merc(lon, lat);

        let searched: Vec<String> = match &options.layer {
            Some(name) => {
                if self.has_layer(name) {
                    vec![name.clone()]
                } else {
                    Vec::new()
                }
            }
            None => self.names().to_vec(),
        };
        for name in searched {
            let raw = self.raw_layer(&name)?;
            let features = decode_features(&raw, self.z(), self.x(), self.y(), None)?;
            for feature in features {
                let Some(geometry) = &feature.geometry else {
                    continue;
                };
                if !within_tolerance(&feature, x, y, options.tolerance) {
                    continue;
                }
                let hit = point_to_geometry_distance(geometry, x, y);
                if hit.is_hit() && hit.distance <= options.tolerance {
                    let (x_hit, y_hit) = merc_to_lonlat(hit.x_hit, hit.y_hit)?;
                    results.push(QueryResult {
                        feature,
                        layer: name.clone(),
                        distance: hit.distance,
                        x_hit,
                        y_hit,
                    });
                }
            }
        }
        results.sort_by(|a, b| {
            b.distance
                .total_cmp(&a.distance)
                .then_with(|| a.layer.cmp(&b.layer))
        });
        Ok(results)
    }

    /// Queries one layer with a batch of geographic points.
    ///
    /// A feature hit by any point is stored once in `features` under a
    /// dense index; each point's hits reference features by that index and
    /// are sorted by ascending distance.
    pub fn query_many(
        &self,
        points: &[(f64, f64)],
        options: &QueryManyOptions,
    ) -> Result<QueryManyResult> {
        if options.layer.is_empty() {
            return Err(Error::InvalidArgument("layer is required".to_string()));
        }
        if !self.has_layer(&options.layer) {
            return Err(Error::InvalidArgument(
                "could not find layer in vector tile".to_string(),
            ));
        }

        let projected: Vec<(f64, f64)> = points
            .iter()
            .map(|&(lon, lat)| lonlat_to_merc(lon, lat))
            .collect();

        let raw = self.raw_layer(&options.layer)?;
        let fields = (!options.fields.is_empty()).then_some(options.fields.as_slice());
        let features = decode_features(&raw, self.z(), self.x(), self.y(), fields)?;

        let mut result = QueryManyResult::default();
        let mut index: u32 = 0;
        for feature in features {
            let Some(geometry) = feature.geometry.clone() else {
                continue;
            };
            let mut has_hit = false;
            for (point_index, &(x, y)) in projected.iter().enumerate() {
                if !within_tolerance(&feature, x, y, options.tolerance) {
                    continue;
                }
                let hit = point_to_geometry_distance(&geometry, x, y);
                if hit.is_hit() && hit.distance <= options.tolerance {
                    has_hit = true;
                    result.features.entry(index).or_insert_with(|| QueryManyFeature {
                        feature: feature.clone(),
                        layer: options.layer.clone(),
                    });
                    result
                        .hits
                        .entry(point_index)
                        .or_default()
                        .push(QueryManyHit {
                            distance: hit.distance,
                            feature_id: index,
                        });
                }
            }
            if has_hit {
                index += 1;
            }
        }
        for hits in result.hits.values_mut() {
            hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use geo_types::{Coord, Geometry, LineString, Point, Polygon};

    use super::*;
    use crate::codec::encoder::{GeometryPipeline, LayerBuilder};
    use crate::codec::Value;
    use crate::coords::GridTransform;
    use crate::options::{DataOptions, EncodeOptions};
    use crate::pbf::Writer;
    use crate::projection::lonlat_to_merc;

    /// Builds a (0,0,0) tile with one layer of mercator-space features.
    fn world_tile(layers: &[(&str, Vec<(Geometry<f64>, Vec<(&str, Value)>)>)]) -> Tile {
        let transform = GridTransform::new(0, 0, 0, 4096);
        let bounds = crate::coords::buffered_extent(0, 0, 0, 4096, 128);
        let pipeline = GeometryPipeline::new(transform, bounds, EncodeOptions::default());
        let mut writer = Writer::new();
        for (name, features) in layers {
            let mut builder = LayerBuilder::new(name, 4096);
            for (geometry, properties) in features {
                let properties: HashMap<String, Value> = properties
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect();
                for (geom_type, data) in pipeline.process(geometry) {
                    builder.add_feature(None, geom_type, data, &properties);
                }
            }
            writer.write_bytes_field(crate::codec::tag::TILE_LAYER, &builder.into_bytes());
        }
        let mut tile = Tile::new(0, 0, 0).unwrap();
        tile.set_data(&writer.into_inner(), &DataOptions::default())
            .unwrap();
        tile
    }

    fn polygon_around_origin() -> Geometry<f64> {
        // +/- 10 degrees around (0, 0), in mercator meters
        let (minx, miny) = lonlat_to_merc(-10.0, -10.0);
        let (maxx, maxy) = lonlat_to_merc(10.0, 10.0);
        Geometry::Polygon(Polygon::new(
            LineString::from(vec![
                Coord { x: minx, y: miny },
                Coord { x: maxx, y: miny },
                Coord { x: maxx, y: maxy },
                Coord { x: minx, y: maxy },
                Coord { x: minx, y: miny },
            ]),
            vec![],
        ))
    }

    #[test]
    fn polygon_containment_hits_at_zero_distance() {
        let tile = world_tile(&[(
            "world",
            vec![(polygon_around_origin(), vec![("kind", Value::String("land".into()))])],
        )]);
        let results = tile.query(0.0, 0.0, &QueryOptions::default()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].layer, "world");
        assert_eq!(results[0].distance, 0.0);
        assert_eq!(
            results[0].feature.properties.get("kind"),
            Some(&Value::String("land".into()))
        );
    }

    #[test]
    fn tolerance_zero_misses_outside_polygon() {
        let tile = world_tile(&[("world", vec![(polygon_around_origin(), vec![])])]);
        let results = tile.query(40.0, 0.0, &QueryOptions::default()).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn point_feature_needs_tolerance() {
        let (x, y) = lonlat_to_merc(1.0, 1.0);
        let tile = world_tile(&[("poi", vec![(Geometry::Point(Point::new(x, y)), vec![])])]);
        let miss = tile.query(0.0, 0.0, &QueryOptions::default()).unwrap();
        assert!(miss.is_empty());
        let hit = tile
            .query(
                0.0,
                0.0,
                &QueryOptions {
                    tolerance: 1_000_000.0,
                    layer: None,
                },
            )
            .unwrap();
        assert_eq!(hit.len(), 1);
        assert!(hit[0].distance > 0.0 && hit[0].distance <= 1_000_000.0);
        // the hit point back-projects near the feature, within grid
        // quantization error (half a grid unit at z0 is a few kilometers)
        assert!((hit[0].x_hit - 1.0).abs() < 0.1);
        assert!((hit[0].y_hit - 1.0).abs() < 0.1);
    }

    #[test]
    fn layer_filter_restricts_results() {
        let tile = world_tile(&[
            ("land", vec![(polygon_around_origin(), vec![])]),
            ("water", vec![(polygon_around_origin(), vec![])]),
        ]);
        let all = tile.query(0.0, 0.0, &QueryOptions::default()).unwrap();
        assert_eq!(all.len(), 2);
        let one = tile
            .query(
                0.0,
                0.0,
                &QueryOptions {
                    tolerance: 0.0,
                    layer: Some("water".to_string()),
                },
            )
            .unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].layer, "water");
        let none = tile
            .query(
                0.0,
                0.0,
                &QueryOptions {
                    tolerance: 0.0,
                    layer: Some("missing".to_string()),
                },
            )
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn results_rank_by_distance_descending() {
        let (x1, y1) = lonlat_to_merc(1.0, 0.0);
        let (x2, y2) = lonlat_to_merc(5.0, 0.0);
        let tile = world_tile(&[(
            "poi",
            vec![
                (Geometry::Point(Point::new(x1, y1)), vec![]),
                (Geometry::Point(Point::new(x2, y2)), vec![]),
            ],
        )]);
        let results = tile
            .query(
                0.0,
                0.0,
                &QueryOptions {
                    tolerance: f64::MAX,
                    layer: None,
                },
            )
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].distance >= results[1].distance);
    }

    #[test]
    fn query_many_requires_a_layer() {
        let tile = world_tile(&[("world", vec![(polygon_around_origin(), vec![])])]);
        assert!(tile
            .query_many(&[(0.0, 0.0)], &QueryManyOptions::default())
            .is_err());
        assert!(tile
            .query_many(
                &[(0.0, 0.0)],
                &QueryManyOptions {
                    layer: "missing".to_string(),
                    ..Default::default()
                }
            )
            .is_err());
    }

    #[test]
    fn query_many_dedups_features_and_sorts_hits() {
        let tile = world_tile(&[(
            "world",
            vec![(
                polygon_around_origin(),
                vec![("name", Value::String("origin".into()))],
            )],
        )]);
        let result = tile
            .query_many(
                &[(0.0, 0.0), (5.0, 5.0), (60.0, 0.0)],
                &QueryManyOptions {
                    tolerance: 0.0,
                    layer: "world".to_string(),
                    fields: vec![],
                },
            )
            .unwrap();
        // one feature hit by two points, stored once
        assert_eq!(result.features.len(), 1);
        assert_eq!(result.hits.len(), 2);
        assert!(result.hits.contains_key(&0));
        assert!(result.hits.contains_key(&1));
        assert!(!result.hits.contains_key(&2));
        assert_eq!(result.hits[&0][0].feature_id, 0);
        assert_eq!(
            result.features[&0].feature.properties.get("name"),
            Some(&Value::String("origin".into()))
        );
    }

    #[test]
    fn query_many_field_projection_drops_attributes() {
        let tile = world_tile(&[(
            "world",
            vec![(
                polygon_around_origin(),
                vec![
                    ("name", Value::String("origin".into())),
                    ("rank", Value::Int(4)),
                ],
            )],
        )]);
        let result = tile
            .query_many(
                &[(0.0, 0.0)],
                &QueryManyOptions {
                    tolerance: 0.0,
                    layer: "world".to_string(),
                    fields: vec!["rank".to_string()],
                },
            )
            .unwrap();
        let feature = &result.features[&0].feature;
        assert_eq!(feature.properties.len(), 1);
        assert_eq!(feature.properties.get("rank"), Some(&Value::Int(4)));
    }
}
