use std::collections::HashMap;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use geo_types::{Coord, Geometry, LineString};
use merctile::codec::encoder::{encode_geometry, LayerBuilder};
use merctile::pbf::Writer;
use merctile::{DataOptions, QueryOptions, Tile, Value};

/// One layer of jagged linestrings spread across the grid.
fn fixture_bytes() -> Vec<u8> {
    let mut builder = LayerBuilder::new("roads", 4096);
    for i in 0..256 {
        let base = f64::from(i) * 16.0;
        let line = LineString::from(
            (0..32)
                .map(|j| Coord {
                    x: base + f64::from(j) * 8.0,
                    y: 2048.0 + f64::from((i * 31 + j * 17) % 64),
                })
                .collect::<Vec<_>>(),
        );
        let (geom_type, data) = encode_geometry(&Geometry::LineString(line)).unwrap();
        let mut properties = HashMap::new();
        properties.insert("id".to_string(), Value::Int(i64::from(i)));
        properties.insert(
            "class".to_string(),
            Value::String(if i % 3 == 0 { "major" } else { "minor" }.to_string()),
        );
        builder.add_feature(Some(u64::from(i)), geom_type, data, &properties);
    }
    let mut writer = Writer::new();
    writer.write_bytes_field(3, &builder.into_bytes());
    writer.into_inner()
}

fn codec_benches(c: &mut Criterion) {
    let bytes = fixture_bytes();

    c.bench_function("set_data", |b| {
        b.iter(|| {
            let mut tile = Tile::new(0, 0, 0).unwrap();
            tile.set_data(black_box(&bytes), &DataOptions::default())
                .unwrap();
            tile
        })
    });

    c.bench_function("info", |b| {
        b.iter(|| merctile::info(black_box(&bytes)))
    });

    let mut tile = Tile::new(0, 0, 0).unwrap();
    tile.set_data(&bytes, &DataOptions::default()).unwrap();

    c.bench_function("layer_features", |b| {
        b.iter(|| tile.layer_features(black_box("roads")).unwrap())
    });

    c.bench_function("query", |b| {
        b.iter(|| {
            tile.query(
                black_box(0.0),
                black_box(0.0),
                &QueryOptions {
                    tolerance: 100_000.0,
                    layer: None,
                },
            )
            .unwrap()
        })
    });
}

criterion_group!(benches, codec_benches);
criterion_main!(benches);
