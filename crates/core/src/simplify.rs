//! Zoom scaling and Douglas-Peucker simplification of world geometry.
//!
//! Simplification runs once per zoom on the scaled geometry, before group
//! extraction. Validity is deliberately not enforced here: the stripe clipper
//! downstream does not require valid polygons, and self-intersections
//! introduced at coarse tolerances are repaired (or rejected per tile) after
//! reassembly.

use geo::{Geometry, MapCoords, Simplify};

/// Scale world coordinates so one tile at `zoom` spans one unit.
pub fn scale_to_zoom(geom: &Geometry<f64>, zoom: u8) -> Geometry<f64> {
    let scale = (1u64 << zoom) as f64;
    geom.map_coords(|c| (c.x * scale, c.y * scale).into())
}

/// Simplify with the given tolerance (in the geometry's current units).
/// Points pass through untouched; non-positive tolerance is a no-op.
pub fn simplify(geom: &Geometry<f64>, tolerance: f64) -> Geometry<f64> {
    if tolerance <= 0.0 {
        return geom.clone();
    }
    match geom {
        Geometry::LineString(ls) => Geometry::LineString(ls.simplify(&tolerance)),
        Geometry::MultiLineString(mls) => Geometry::MultiLineString(mls.simplify(&tolerance)),
        Geometry::Polygon(p) => Geometry::Polygon(p.simplify(&tolerance)),
        Geometry::MultiPolygon(mp) => Geometry::MultiPolygon(mp.simplify(&tolerance)),
        Geometry::GeometryCollection(gc) => Geometry::GeometryCollection(
            gc.0.iter().map(|g| simplify(g, tolerance)).collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Coord, LineString};

    #[test]
    fn test_scale_doubles_per_zoom() {
        let geom = Geometry::LineString(LineString::from(vec![(0.25, 0.5), (1.0, 1.0)]));
        let scaled = scale_to_zoom(&geom, 3);
        let Geometry::LineString(ls) = scaled else {
            panic!("expected line string");
        };
        assert_eq!(ls.0[0], Coord { x: 2.0, y: 4.0 });
        assert_eq!(ls.0[1], Coord { x: 8.0, y: 8.0 });
    }

    #[test]
    fn test_simplify_removes_near_collinear_points() {
        let ls = LineString::from(vec![(0.0, 0.0), (5.0, 0.001), (10.0, 0.0)]);
        let out = simplify(&Geometry::LineString(ls), 0.5);
        let Geometry::LineString(ls) = out else {
            panic!("expected line string");
        };
        assert_eq!(ls.0.len(), 2);
    }

    #[test]
    fn test_simplify_keeps_significant_detail() {
        let ls = LineString::from(vec![(0.0, 0.0), (5.0, 3.0), (10.0, 0.0)]);
        let out = simplify(&Geometry::LineString(ls), 0.5);
        let Geometry::LineString(ls) = out else {
            panic!("expected line string");
        };
        assert_eq!(ls.0.len(), 3);
    }

    #[test]
    fn test_simplify_polygon_preserves_closure() {
        let poly = polygon![
            (x: 0.0, y: 0.0),
            (x: 4.0, y: 0.01),
            (x: 8.0, y: 0.0),
            (x: 8.0, y: 8.0),
            (x: 0.0, y: 8.0),
        ];
        let out = simplify(&Geometry::Polygon(poly), 0.5);
        let Geometry::Polygon(p) = out else {
            panic!("expected polygon");
        };
        assert_eq!(p.exterior().0.first(), p.exterior().0.last());
        assert!(p.exterior().0.len() < 6);
    }

    #[test]
    fn test_zero_tolerance_is_identity() {
        let ls = LineString::from(vec![(0.0, 0.0), (5.0, 0.001), (10.0, 0.0)]);
        let geom = Geometry::LineString(ls);
        assert_eq!(simplify(&geom, 0.0), geom);
    }
}
