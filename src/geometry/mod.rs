//! Geometry model and operations.
//!
//! The geometry sum type is [`geo_types::Geometry<f64>`]; visitors are
//! exhaustive pattern matches over it. Tile-grid coordinates use the y-down
//! convention of the MVT wire format, so the ring helpers here define
//! signed area with respect to that axis: an exterior ring has positive
//! area, a hole has negative area.

pub mod clip;
pub mod ops;
pub mod simplify;
pub mod validity;

use geo_types::{LineString, Polygon};

use crate::options::FillType;

/// Shoelace area of a ring in y-down coordinates. Positive for exterior
/// winding, negative for holes.
pub fn signed_area(ring: &LineString<f64>) -> f64 {
    let coords = &ring.0;
    if coords.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for window in coords.windows(2) {
        sum += window[0].x * window[1].y - window[1].x * window[0].y;
    }
    // close implicitly in case the ring is missing its final vertex
    let first = coords[0];
    let last = coords[coords.len() - 1];
    if first != last {
        sum += last.x * first.y - first.x * last.y;
    }
    sum / 2.0
}

/// Appends the first vertex when a ring is not closed.
pub fn close_ring(ring: &mut LineString<f64>) {
    if let (Some(&first), Some(&last)) = (ring.0.first(), ring.0.last()) {
        if first != last {
            ring.0.push(first);
        }
    }
}

/// Reverses a ring so its signed area matches `exterior`.
pub fn wind_ring(ring: &mut LineString<f64>, exterior: bool) {
    let area = signed_area(ring);
    if (exterior && area < 0.0) || (!exterior && area > 0.0) {
        ring.0.reverse();
    }
}

fn ring_contains(outer: &LineString<f64>, inner: &LineString<f64>) -> bool {
    // representative-point test is sufficient for non-crossing rings
    inner.0.first().is_some_and(|pt| {
        let mut inside = false;
        for window in outer.0.windows(2) {
            let (a, b) = (window[0], window[1]);
            if (a.y > pt.y) != (b.y > pt.y)
                && pt.x < (b.x - a.x) * (pt.y - a.y) / (b.y - a.y) + a.x
            {
                inside = !inside;
            }
        }
        inside
    })
}

/// Builds polygons out of loose rings by resolving which rings are
/// exteriors and which are holes under the given fill rule.
///
/// Rings with fewer than four vertices or zero area are discarded. The
/// output rings are wound for the wire format: exteriors positive, holes
/// negative.
pub fn assemble_polygons(rings: Vec<LineString<f64>>, fill_type: FillType) -> Vec<Polygon<f64>> {
    struct Classified {
        ring: LineString<f64>,
        area: f64,
        depth: usize,
        parent: Option<usize>,
    }

    let mut classified: Vec<Classified> = rings
        .into_iter()
        .filter_map(|mut ring| {
            close_ring(&mut ring);
            if ring.0.len() < 4 {
                return None;
            }
            let area = signed_area(&ring);
            if area == 0.0 {
                return None;
            }
            Some(Classified {
                ring,
                area,
                depth: 0,
                parent: None,
            })
        })
        .collect();

    // nesting depth by containment among the surviving rings
    for i in 0..classified.len() {
        let mut depth = 0;
        let mut parent = None;
        for j in 0..classified.len() {
            if i != j && ring_contains(&classified[j].ring, &classified[i].ring) {
                depth += 1;
                let deeper = parent
                    .map(|p: usize| ring_contains(&classified[p].ring, &classified[j].ring))
                    .unwrap_or(true);
                if deeper {
                    parent = Some(j);
                }
            }
        }
        classified[i].depth = depth;
        classified[i].parent = parent;
    }

    #[derive(PartialEq, Clone, Copy)]
    enum Role {
        Exterior,
        Hole,
        Invisible,
    }

    let roles: Vec<Role> = (0..classified.len())
        .map(|i| match fill_type {
            FillType::Positive => {
                if classified[i].area > 0.0 {
                    Role::Exterior
                } else {
                    Role::Hole
                }
            }
            FillType::Negative => {
                if classified[i].area < 0.0 {
                    Role::Exterior
                } else {
                    Role::Hole
                }
            }
            FillType::EvenOdd => {
                if classified[i].depth % 2 == 0 {
                    Role::Exterior
                } else {
                    Role::Hole
                }
            }
            FillType::NonZero => {
                // winding number outside the ring is the sum over its
                // ancestor chain; crossing the ring adds its own sign
                let mut outside = 0i32;
                let mut ancestor = classified[i].parent;
                while let Some(p) = ancestor {
                    outside += classified[p].area.signum() as i32;
                    ancestor = classified[p].parent;
                }
                let inside = outside + classified[i].area.signum() as i32;
                if outside == 0 && inside != 0 {
                    Role::Exterior
                } else if outside != 0 && inside == 0 {
                    Role::Hole
                } else {
                    Role::Invisible
                }
            }
        })
        .collect();

    let mut polygons: Vec<Polygon<f64>> = Vec::new();
    let mut polygon_of: Vec<Option<usize>> = vec![None; classified.len()];

    // exteriors first, in input order
    for (index, ring) in classified.iter().enumerate() {
        if roles[index] == Role::Exterior {
            let mut exterior = ring.ring.clone();
            wind_ring(&mut exterior, true);
            polygon_of[index] = Some(polygons.len());
            polygons.push(Polygon::new(exterior, vec![]));
        }
    }
    // then holes, attached to their nearest exterior ancestor
    for (index, ring) in classified.iter().enumerate() {
        if polygon_of[index].is_some() || roles[index] == Role::Invisible {
            continue;
        }
        let mut ancestor = ring.parent;
        while let Some(p) = ancestor {
            if let Some(slot) = polygon_of[p] {
                let mut hole = ring.ring.clone();
                wind_ring(&mut hole, false);
                polygons[slot].interiors_push(hole);
                break;
            }
            ancestor = classified[p].parent;
        }
        // a hole with no surviving exterior is dropped
    }
    polygons
}
