//! Ring/group extraction and tile-local reassembly.
//!
//! The slicer works on bare coordinate sequences, not `geo` geometries. This
//! module converts between the two worlds:
//!
//! - [`extract_groups`] decomposes a (possibly nested) geometry into
//!   independent [`Group`]s: for polygons an oriented outer ring plus its
//!   holes, filtered by minimum area; for lines a single sequence filtered by
//!   minimum length.
//! - [`reassemble_polygons`] / [`reassemble_lines`] / [`reassemble_points`]
//!   rebuild emit-ready geometries from clipped tile-local sequences.
//!
//! Canonical ring orientation throughout the crate: outer rings have positive
//! shoelace signed area in the stored (x right, y down) frame, holes negative.
//! This matches `geo`'s default polygon orientation.

use geo::line_intersection::{line_intersection, LineIntersection};
use geo::{Coord, CoordsIter, Geometry, Line, LineString, MultiLineString, MultiPoint, Point, Polygon};

use crate::{Error, Result};

/// One ring or line as a bare coordinate sequence.
pub type CoordSeq = Vec<Coord<f64>>;

/// Coordinate sequences that must travel through the slicer together.
/// For polygons, index 0 is the outer ring and the rest are holes; for lines
/// there is exactly one sequence.
pub type Group = Vec<CoordSeq>;

/// A leaf geometry produced by flattening collections.
enum Leaf<'a> {
    Point(&'a Point<f64>),
    Line(&'a LineString<f64>),
    Polygon(&'a Polygon<f64>),
}

/// Flatten nested collections into leaves with an explicit worklist.
///
/// Returns [`Error::UnsupportedGeometry`] for `Line`/`Rect`/`Triangle`, which
/// upstream feature collection never produces — reaching one here is a
/// programming error, not bad data.
fn flatten(geom: &Geometry<f64>) -> Result<Vec<Leaf<'_>>> {
    let mut leaves = Vec::new();
    let mut stack = vec![geom];
    while let Some(g) = stack.pop() {
        match g {
            Geometry::Point(p) => leaves.push(Leaf::Point(p)),
            Geometry::LineString(l) => leaves.push(Leaf::Line(l)),
            Geometry::Polygon(p) => leaves.push(Leaf::Polygon(p)),
            Geometry::MultiPoint(mp) => leaves.extend(mp.0.iter().map(Leaf::Point)),
            Geometry::MultiLineString(mls) => leaves.extend(mls.0.iter().map(Leaf::Line)),
            Geometry::MultiPolygon(mp) => leaves.extend(mp.0.iter().map(Leaf::Polygon)),
            Geometry::GeometryCollection(gc) => stack.extend(gc.0.iter()),
            Geometry::Line(_) => return Err(Error::UnsupportedGeometry("Line")),
            Geometry::Rect(_) => return Err(Error::UnsupportedGeometry("Rect")),
            Geometry::Triangle(_) => return Err(Error::UnsupportedGeometry("Triangle")),
        }
    }
    // stack traversal reverses collection members; keep input order
    leaves.reverse();
    Ok(leaves)
}

/// Reject geometries with NaN or infinite coordinates before any slicing.
pub fn validate_finite(geom: &Geometry<f64>) -> Result<()> {
    for c in geom.coords_iter() {
        if !c.x.is_finite() || !c.y.is_finite() {
            return Err(Error::InvalidGeometry(format!(
                "non-finite coordinate ({}, {})",
                c.x, c.y
            )));
        }
    }
    Ok(())
}

/// Shoelace signed area of a ring (closed or open).
fn ring_signed_area(coords: &[Coord<f64>]) -> f64 {
    if coords.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for w in coords.windows(2) {
        sum += w[0].x * w[1].y - w[1].x * w[0].y;
    }
    let (first, last) = (coords[0], coords[coords.len() - 1]);
    if first != last {
        sum += last.x * first.y - first.x * last.y;
    }
    sum / 2.0
}

/// Total euclidean length of a coordinate sequence.
pub fn seq_length(coords: &[Coord<f64>]) -> f64 {
    coords
        .windows(2)
        .map(|w| (w[1].x - w[0].x).hypot(w[1].y - w[0].y))
        .sum()
}

/// Orient a ring so its signed area matches `want_positive`, returning the
/// coordinates as an owned sequence.
fn oriented(ring: &LineString<f64>, area: f64, want_positive: bool) -> CoordSeq {
    let mut coords = ring.0.clone();
    if (area > 0.0) != want_positive {
        coords.reverse();
    }
    coords
}

/// Decompose a geometry into slicer groups.
///
/// Polygon rings below `min_area` (absolute area) are dropped; if the outer
/// ring falls below the threshold the whole group is dropped, holes are
/// dropped individually. Lines shorter than `min_length` are dropped. Points
/// and degenerate pieces contribute nothing — points are bucketed
/// separately by the renderer and never pass through here.
pub fn extract_groups(geom: &Geometry<f64>, min_area: f64, min_length: f64) -> Result<Vec<Group>> {
    let mut groups = Vec::new();
    for leaf in flatten(geom)? {
        match leaf {
            Leaf::Point(_) => {}
            Leaf::Line(line) => {
                if line.0.len() >= 2 && seq_length(&line.0) >= min_length {
                    groups.push(vec![line.0.clone()]);
                }
            }
            Leaf::Polygon(poly) => {
                let outer = poly.exterior();
                if outer.0.len() < 4 {
                    continue;
                }
                let outer_area = ring_signed_area(&outer.0);
                if outer_area.abs() < min_area {
                    continue;
                }
                let mut group = vec![oriented(outer, outer_area, true)];
                for hole in poly.interiors() {
                    if hole.0.len() < 4 {
                        continue;
                    }
                    let hole_area = ring_signed_area(&hole.0);
                    if hole_area.abs() >= min_area {
                        group.push(oriented(hole, hole_area, false));
                    }
                }
                groups.push(group);
            }
        }
    }
    Ok(groups)
}

// ============================================================================
// Reassembly after clipping
// ============================================================================

/// Close a ring in place by repeating the first coordinate if needed.
pub fn close_ring(coords: &mut CoordSeq) {
    if let (Some(&first), Some(&last)) = (coords.first(), coords.last()) {
        if first != last {
            coords.push(first);
        }
    }
}

/// Rebuild polygons from clipped groups: sequence 0 of each group becomes an
/// exterior ring (closed automatically), the rest holes. Degenerate holes are
/// dropped; a group whose outer ring is degenerate is dropped entirely.
///
/// Returns `None` when nothing survives.
pub fn reassemble_polygons(groups: &[Group]) -> Option<Geometry<f64>> {
    let mut polygons = Vec::new();
    for group in groups {
        let Some(outer) = ring_from_seq(&group[0]) else {
            continue;
        };
        let holes: Vec<LineString<f64>> = group[1..]
            .iter()
            .filter_map(|seq| ring_from_seq(seq))
            .collect();
        polygons.push(Polygon::new(outer, holes));
    }
    geometry_from_parts(polygons, Geometry::Polygon, |ps| {
        Geometry::MultiPolygon(ps.into())
    })
}

fn ring_from_seq(seq: &[Coord<f64>]) -> Option<LineString<f64>> {
    let mut coords = seq.to_vec();
    close_ring(&mut coords);
    // 3 distinct points + closing point
    if coords.len() < 4 {
        return None;
    }
    Some(LineString::new(coords))
}

/// Rebuild lines from clipped groups; sequences shorter than two points are
/// dropped. Returns `None` when nothing survives.
pub fn reassemble_lines(groups: &[Group]) -> Option<Geometry<f64>> {
    let lines: Vec<LineString<f64>> = groups
        .iter()
        .flatten()
        .filter(|seq| seq.len() >= 2)
        .map(|seq| LineString::new(seq.clone()))
        .collect();
    geometry_from_parts(lines, Geometry::LineString, |ls| {
        Geometry::MultiLineString(MultiLineString::new(ls))
    })
}

/// Rebuild points from unit-length sequences.
pub fn reassemble_points(coords: &[Coord<f64>]) -> Option<Geometry<f64>> {
    let points: Vec<Point<f64>> = coords.iter().map(|&c| Point::from(c)).collect();
    geometry_from_parts(points, Geometry::Point, |ps| {
        Geometry::MultiPoint(MultiPoint::new(ps))
    })
}

fn geometry_from_parts<T>(
    mut parts: Vec<T>,
    single: impl Fn(T) -> Geometry<f64>,
    multi: impl Fn(Vec<T>) -> Geometry<f64>,
) -> Option<Geometry<f64>> {
    match parts.len() {
        0 => None,
        1 => Some(single(parts.pop().unwrap())),
        _ => Some(multi(parts)),
    }
}

// ============================================================================
// Tile-local snapping and ring validity
// ============================================================================

/// Snap every coordinate of a tile-local polygon geometry to a grid of
/// `1/denom` pixels, dropping rings that collapse. The grid is coarser than
/// source precision so nearly-coincident points introduced by clipping merge
/// instead of producing micro self-intersections.
///
/// Returns `None` if the geometry collapses entirely.
pub fn snap_polygons(geom: &Geometry<f64>, denom: f64) -> Option<Geometry<f64>> {
    let snap_ring = |ring: &LineString<f64>| -> Option<LineString<f64>> {
        let mut coords: CoordSeq = Vec::with_capacity(ring.0.len());
        for c in &ring.0 {
            let snapped = Coord {
                x: (c.x * denom).round() / denom,
                y: (c.y * denom).round() / denom,
            };
            if coords.last() != Some(&snapped) {
                coords.push(snapped);
            }
        }
        // snapping can merge the closing point into its neighbor
        close_ring(&mut coords);
        (coords.len() >= 4).then(|| LineString::new(coords))
    };

    let polygons = match geom {
        Geometry::Polygon(p) => vec![p.clone()],
        Geometry::MultiPolygon(mp) => mp.0.clone(),
        _ => return Some(geom.clone()),
    };

    let snapped: Vec<Polygon<f64>> = polygons
        .iter()
        .filter_map(|poly| {
            let outer = snap_ring(poly.exterior())?;
            let holes = poly.interiors().iter().filter_map(snap_ring).collect();
            Some(Polygon::new(outer, holes))
        })
        .collect();
    geometry_from_parts(snapped, Geometry::Polygon, |ps| {
        Geometry::MultiPolygon(ps.into())
    })
}

/// Check every ring of a polygonal geometry for self-intersections and
/// self-touches. Returns the first problem found.
pub fn validate_polygons(geom: &Geometry<f64>) -> std::result::Result<(), String> {
    let polygons: Vec<&Polygon<f64>> = match geom {
        Geometry::Polygon(p) => vec![p],
        Geometry::MultiPolygon(mp) => mp.0.iter().collect(),
        _ => return Ok(()),
    };
    for poly in polygons {
        validate_ring(poly.exterior(), "exterior ring")?;
        for (i, hole) in poly.interiors().iter().enumerate() {
            validate_ring(hole, &format!("interior ring {i}"))?;
        }
    }
    Ok(())
}

/// Validate a single closed ring: enough points, no repeated non-adjacent
/// vertex (spike), no crossing between non-adjacent edges.
fn validate_ring(ring: &LineString<f64>, name: &str) -> std::result::Result<(), String> {
    let coords = &ring.0;
    if coords.len() < 4 {
        return Err(format!("{name} has fewer than 3 distinct points"));
    }
    // exclude the closing point so the first/last vertex pair is not a spike
    let n = if coords.first() == coords.last() {
        coords.len() - 1
    } else {
        coords.len()
    };

    for i in 0..n {
        for j in (i + 2)..n {
            // first and last edge/vertex are adjacent around the ring
            if i == 0 && j == n - 1 {
                continue;
            }
            if coords[i] == coords[j] {
                return Err(format!("{name} touches itself at ({}, {})", coords[i].x, coords[i].y));
            }
            let a = Line::new(coords[i], coords[(i + 1) % n]);
            let b = Line::new(coords[j], coords[(j + 1) % n]);
            match line_intersection(a, b) {
                Some(LineIntersection::SinglePoint { intersection, .. }) => {
                    let at_endpoints = (intersection == a.start || intersection == a.end)
                        && (intersection == b.start || intersection == b.end);
                    if !at_endpoints {
                        return Err(format!("{name} has a self-intersection"));
                    }
                }
                Some(LineIntersection::Collinear { .. }) => {
                    return Err(format!("{name} has overlapping collinear edges"));
                }
                None => {}
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Geometry, GeometryCollection, MultiPolygon};

    fn square(min: f64, max: f64) -> Polygon<f64> {
        polygon![
            (x: min, y: min),
            (x: max, y: min),
            (x: max, y: max),
            (x: min, y: max),
        ]
    }

    // ========== Extraction ==========

    #[test]
    fn test_extract_polygon_orients_outer_positive() {
        // geo's polygon! closes the ring; input wound either way
        let poly = square(0.0, 4.0);
        let groups = extract_groups(&Geometry::Polygon(poly), 0.0, 0.0).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 1);
        assert!(ring_signed_area(&groups[0][0]) > 0.0);
    }

    #[test]
    fn test_extract_hole_oriented_opposite() {
        let poly = Polygon::new(square(0.0, 10.0).exterior().clone(), vec![
            square(2.0, 4.0).exterior().clone(),
        ]);
        let groups = extract_groups(&Geometry::Polygon(poly), 0.0, 0.0).unwrap();
        assert_eq!(groups[0].len(), 2);
        assert!(ring_signed_area(&groups[0][0]) > 0.0);
        assert!(ring_signed_area(&groups[0][1]) < 0.0);
    }

    #[test]
    fn test_extract_drops_group_when_outer_below_min_area() {
        let tiny = square(0.0, 1e-6);
        let groups = extract_groups(&Geometry::Polygon(tiny), 1e-9, 0.0).unwrap();
        assert!(groups.is_empty());
    }

    #[test]
    fn test_extract_drops_only_small_holes() {
        let poly = Polygon::new(square(0.0, 10.0).exterior().clone(), vec![
            square(2.0, 2.001).exterior().clone(), // area 1e-6
            square(5.0, 7.0).exterior().clone(),   // area 4
        ]);
        let groups = extract_groups(&Geometry::Polygon(poly), 0.01, 0.0).unwrap();
        assert_eq!(groups[0].len(), 2, "outer plus the surviving hole");
    }

    #[test]
    fn test_extract_line_min_length() {
        let short = Geometry::LineString(LineString::from(vec![(0.0, 0.0), (0.0, 0.5)]));
        let long = Geometry::LineString(LineString::from(vec![(0.0, 0.0), (0.0, 5.0)]));
        assert!(extract_groups(&short, 0.0, 1.0).unwrap().is_empty());
        assert_eq!(extract_groups(&long, 0.0, 1.0).unwrap().len(), 1);
    }

    #[test]
    fn test_extract_flattens_nested_collections() {
        let gc = Geometry::GeometryCollection(GeometryCollection::new_from(vec![
            Geometry::GeometryCollection(GeometryCollection::new_from(vec![
                Geometry::Polygon(square(0.0, 1.0)),
            ])),
            Geometry::MultiPolygon(MultiPolygon::new(vec![square(2.0, 3.0), square(4.0, 5.0)])),
        ]));
        let groups = extract_groups(&gc, 0.0, 0.0).unwrap();
        assert_eq!(groups.len(), 3);
    }

    #[test]
    fn test_extract_rejects_exotic_types() {
        let rect = Geometry::Rect(geo::Rect::new(
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 1.0, y: 1.0 },
        ));
        assert!(matches!(
            extract_groups(&rect, 0.0, 0.0),
            Err(Error::UnsupportedGeometry("Rect"))
        ));
    }

    #[test]
    fn test_validate_finite_rejects_nan() {
        let bad = Geometry::LineString(LineString::from(vec![(0.0, 0.0), (f64::NAN, 1.0)]));
        assert!(validate_finite(&bad).is_err());
        let good = Geometry::LineString(LineString::from(vec![(0.0, 0.0), (1.0, 1.0)]));
        assert!(validate_finite(&good).is_ok());
    }

    // ========== Reassembly ==========

    #[test]
    fn test_extract_reassemble_round_trip_preserves_topology() {
        let original = Polygon::new(square(0.0, 10.0).exterior().clone(), vec![
            square(2.0, 4.0).exterior().clone(),
        ]);
        let groups = extract_groups(&Geometry::Polygon(original), 0.0, 0.0).unwrap();
        let rebuilt = reassemble_polygons(&groups).unwrap();

        let groups2 = extract_groups(&rebuilt, 0.0, 0.0).unwrap();
        let rebuilt2 = reassemble_polygons(&groups2).unwrap();

        let Geometry::Polygon(p) = rebuilt2 else {
            panic!("expected a single polygon");
        };
        assert_eq!(p.interiors().len(), 1);
        assert!((ring_signed_area(&p.exterior().0).abs() - 100.0).abs() < 1e-9);
        assert!((ring_signed_area(&p.interiors()[0].0).abs() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_reassemble_closes_open_rings() {
        let open: Group = vec![vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 4.0, y: 0.0 },
            Coord { x: 4.0, y: 4.0 },
            Coord { x: 0.0, y: 4.0 },
        ]];
        let geom = reassemble_polygons(&[open]).unwrap();
        let Geometry::Polygon(p) = geom else {
            panic!("expected polygon")
        };
        assert_eq!(p.exterior().0.first(), p.exterior().0.last());
    }

    #[test]
    fn test_reassemble_multiple_groups_to_multipolygon() {
        let g1: Group = vec![square(0.0, 1.0).exterior().0.clone()];
        let g2: Group = vec![square(2.0, 3.0).exterior().0.clone()];
        assert!(matches!(
            reassemble_polygons(&[g1, g2]),
            Some(Geometry::MultiPolygon(_))
        ));
    }

    #[test]
    fn test_reassemble_drops_degenerate_outer_with_holes() {
        let group: Group = vec![
            vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 1.0 }],
            square(0.2, 0.4).exterior().0.clone(),
        ];
        assert!(reassemble_polygons(&[group]).is_none());
    }

    #[test]
    fn test_reassemble_lines_filters_short_sequences() {
        let groups: Vec<Group> = vec![vec![
            vec![Coord { x: 0.0, y: 0.0 }],
            vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 0.0 }],
        ]];
        let geom = reassemble_lines(&groups).unwrap();
        assert!(matches!(geom, Geometry::LineString(_)));
    }

    #[test]
    fn test_reassemble_multiple_lines_to_multi_line_string() {
        let groups: Vec<Group> = vec![
            vec![vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 0.0 }]],
            vec![vec![Coord { x: 0.0, y: 2.0 }, Coord { x: 1.0, y: 2.0 }]],
        ];
        let geom = reassemble_lines(&groups).unwrap();
        let Geometry::MultiLineString(mls) = geom else {
            panic!("expected multi line string");
        };
        assert_eq!(mls.0.len(), 2);
    }

    #[test]
    fn test_reassemble_points() {
        let one = reassemble_points(&[Coord { x: 1.0, y: 2.0 }]).unwrap();
        assert!(matches!(one, Geometry::Point(_)));
        let many =
            reassemble_points(&[Coord { x: 1.0, y: 2.0 }, Coord { x: 3.0, y: 4.0 }]).unwrap();
        assert!(matches!(many, Geometry::MultiPoint(_)));
        assert!(reassemble_points(&[]).is_none());
    }

    // ========== Snapping and validation ==========

    #[test]
    fn test_snap_merges_nearly_coincident_points() {
        let poly = Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 0.01), // merges with previous at 1/16 px grid
            (x: 10.0, y: 10.0),
            (x: 0.0, y: 10.0),
        ]);
        let snapped = snap_polygons(&poly, 16.0).unwrap();
        let Geometry::Polygon(p) = snapped else {
            panic!("expected polygon")
        };
        assert_eq!(p.exterior().0.len(), 5);
    }

    #[test]
    fn test_snap_drops_collapsed_polygon() {
        let sliver = Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0),
            (x: 0.01, y: 0.0),
            (x: 0.01, y: 0.01),
        ]);
        assert!(snap_polygons(&sliver, 16.0).is_none());
    }

    #[test]
    fn test_validate_accepts_simple_square() {
        assert!(validate_polygons(&Geometry::Polygon(square(0.0, 4.0))).is_ok());
    }

    #[test]
    fn test_validate_rejects_bowtie() {
        let bowtie = Geometry::Polygon(Polygon::new(
            LineString::from(vec![
                (0.0, 0.0),
                (10.0, 10.0),
                (10.0, 0.0),
                (0.0, 10.0),
                (0.0, 0.0),
            ]),
            vec![],
        ));
        let err = validate_polygons(&bowtie).unwrap_err();
        assert!(err.contains("self-intersection"), "got: {err}");
    }

    #[test]
    fn test_validate_rejects_spike() {
        let spike = Geometry::Polygon(Polygon::new(
            LineString::from(vec![
                (0.0, 0.0),
                (4.0, 0.0),
                (4.0, 4.0),
                (2.0, 4.0),
                (2.0, 6.0),
                (2.0, 4.0),
                (0.0, 4.0),
                (0.0, 0.0),
            ]),
            vec![],
        ));
        assert!(validate_polygons(&spike).is_err());
    }

    #[test]
    fn test_validate_checks_holes() {
        let bad_hole = LineString::from(vec![
            (2.0, 2.0),
            (8.0, 8.0),
            (8.0, 2.0),
            (2.0, 8.0),
            (2.0, 2.0),
        ]);
        let poly = Geometry::Polygon(Polygon::new(
            square(0.0, 10.0).exterior().clone(),
            vec![bad_hole],
        ));
        let err = validate_polygons(&poly).unwrap_err();
        assert!(err.contains("interior ring"), "got: {err}");
    }
}
