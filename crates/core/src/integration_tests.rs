//! End-to-end integration tests for the rendering pipeline.
//!
//! These tests run the full path:
//! world geometry → per-zoom scaling → simplification → slicing → reassembly
//! → encoded tile records
//!
//! # Testing Strategy
//!
//! We assert on semantics, not encoded bytes:
//! - which tiles a feature lands in, per zoom
//! - decoded tile-local coordinates staying inside the buffered tile
//! - feature-id uniqueness under concurrent rendering

#[cfg(test)]
mod tests {
    use crate::render::{FeatureIds, FeatureRenderer, RenderedFeature, SimpleFeature};
    use crate::tile::{lng_lat_to_world, TileCoord, TileExtents, TILE_SIZE_PX};
    use crate::{Error, Result};
    use geo::{point, polygon, Geometry, LineString};
    use std::collections::HashSet;
    use std::sync::Arc;

    /// Surface trace logs (wrap re-runs, skipped tiles) when running with
    /// RUST_LOG set.
    fn init_logs() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    /// Encodes a geometry as its flat coordinate list so tests can decode
    /// and inspect tile-local positions.
    fn coord_encoder(geometry: &Geometry<f64>) -> Result<Vec<u8>> {
        use geo::CoordsIter;
        let coords: Vec<(f64, f64)> = geometry.coords_iter().map(|c| (c.x, c.y)).collect();
        serde_json::to_vec(&coords).map_err(|e| Error::Encode(e.to_string()))
    }

    fn decode(feature: &RenderedFeature) -> Vec<(f64, f64)> {
        serde_json::from_slice(&feature.geometry).unwrap()
    }

    fn renderer(max_zoom: u8) -> FeatureRenderer<fn(&Geometry<f64>) -> Result<Vec<u8>>> {
        FeatureRenderer::new(
            Arc::new(TileExtents::full(max_zoom)),
            coord_encoder,
            Arc::new(FeatureIds::new()),
        )
    }

    fn tiles_at_zoom(out: &[RenderedFeature], zoom: u8) -> HashSet<TileCoord> {
        out.iter()
            .filter(|f| f.tile.z == zoom)
            .map(|f| f.tile)
            .collect()
    }

    // ===== Coverage =====

    #[test]
    fn test_world_polygon_covers_every_tile_at_every_zoom() {
        init_logs();
        let r = renderer(4);
        let world = Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 1.0),
        ]);
        let feature = SimpleFeature::new(world, 0, 4).with_buffer_pixels(0.0);
        let mut out = Vec::new();
        r.render(&feature, &mut out).unwrap();

        for zoom in 0..=4u8 {
            let n = 1u32 << zoom;
            let tiles = tiles_at_zoom(&out, zoom);
            assert_eq!(tiles.len() as u32, n * n, "zoom {zoom}");
            // every tile is a pure fill: the shared square, nothing clipped
            let first: Vec<_> = out.iter().filter(|f| f.tile.z == zoom).collect();
            for f in &first {
                let coords = decode(f);
                assert_eq!(coords.len(), 5, "fill square at {}", f.tile);
            }
        }
    }

    // ===== Boundary behavior =====

    #[test]
    fn test_clipped_coordinates_stay_inside_buffered_tile() {
        let r = renderer(3);
        let blob = Geometry::Polygon(polygon![
            (x: 0.11, y: 0.13),
            (x: 0.67, y: 0.09),
            (x: 0.83, y: 0.58),
            (x: 0.41, y: 0.91),
            (x: 0.07, y: 0.55),
        ]);
        let buffer_px = 8.0;
        let feature = SimpleFeature::new(blob, 3, 3).with_buffer_pixels(buffer_px);
        let mut out = Vec::new();
        r.render(&feature, &mut out).unwrap();
        assert!(!out.is_empty());

        for f in &out {
            for (x, y) in decode(f) {
                assert!(x >= -buffer_px - 1e-9 && x <= TILE_SIZE_PX + buffer_px + 1e-9);
                assert!(y >= -buffer_px - 1e-9 && y <= TILE_SIZE_PX + buffer_px + 1e-9);
            }
        }
    }

    #[test]
    fn test_edge_aligned_square_splits_cleanly_between_neighbors() {
        let r = renderer(1);
        let square = Geometry::Polygon(polygon![
            (x: 0.25, y: 0.25),
            (x: 0.75, y: 0.25),
            (x: 0.75, y: 0.75),
            (x: 0.25, y: 0.75),
        ]);
        let feature = SimpleFeature::new(square, 1, 1).with_buffer_pixels(0.0);
        let mut out = Vec::new();
        r.render(&feature, &mut out).unwrap();

        let tiles = tiles_at_zoom(&out, 1);
        let expected: HashSet<TileCoord> = [
            TileCoord::new(0, 0, 1),
            TileCoord::new(1, 0, 1),
            TileCoord::new(0, 1, 1),
            TileCoord::new(1, 1, 1),
        ]
        .into_iter()
        .collect();
        assert_eq!(tiles, expected);

        // with zero buffer each quarter clips exactly to the shared edges
        for f in &out {
            for (x, y) in decode(f) {
                assert!((0.0..=TILE_SIZE_PX).contains(&x));
                assert!((0.0..=TILE_SIZE_PX).contains(&y));
            }
        }
    }

    // ===== World wrap =====

    #[test]
    fn test_antimeridian_line_lands_on_both_world_edges() {
        init_logs();
        let r = renderer(2);
        // a line from 170°E to 170°W crosses the antimeridian, which is the
        // left/right seam of the world square
        let (ax, ay) = lng_lat_to_world(170.0, 10.0);
        let (bx, by) = lng_lat_to_world(-170.0, 10.0);
        // unwrap the second endpoint past the right edge so the segment is
        // continuous in world coordinates
        let line = Geometry::LineString(LineString::from(vec![(ax, ay), (1.0 + bx, by)]));
        let feature = SimpleFeature::new(line, 2, 2)
            .with_buffer_pixels(0.0)
            .with_min_pixel_size(0.0);
        let mut out = Vec::new();
        r.render(&feature, &mut out).unwrap();

        let tiles = tiles_at_zoom(&out, 2);
        assert!(tiles.iter().any(|t| t.x == 0), "{tiles:?}");
        assert!(tiles.iter().any(|t| t.x == 3), "{tiles:?}");
        // nothing lands in the interior columns the line never touches
        assert!(tiles.iter().all(|t| t.x == 0 || t.x == 3), "{tiles:?}");
    }

    #[test]
    fn test_interior_polygon_never_wraps() {
        let r = renderer(2);
        let square = Geometry::Polygon(polygon![
            (x: 0.3, y: 0.3),
            (x: 0.7, y: 0.3),
            (x: 0.7, y: 0.7),
            (x: 0.3, y: 0.7),
        ]);
        let feature = SimpleFeature::new(square, 2, 2);
        let mut out = Vec::new();
        r.render(&feature, &mut out).unwrap();
        for f in &out {
            assert!(f.tile.x >= 1 && f.tile.x <= 2, "{}", f.tile);
            assert!(f.tile.y >= 1 && f.tile.y <= 2, "{}", f.tile);
        }
    }

    // ===== Minimum size =====

    #[test]
    fn test_tiny_triangle_only_appears_once_large_enough() {
        let r = renderer(12);
        // ~1e-4 world units on a side: one pixel around z5
        let speck = Geometry::Polygon(polygon![
            (x: 0.5000, y: 0.5000),
            (x: 0.5001, y: 0.5000),
            (x: 0.5001, y: 0.5001),
        ]);
        let feature = SimpleFeature::new(speck, 0, 12).with_min_pixel_size(1.0);
        let mut out = Vec::new();
        r.render(&feature, &mut out).unwrap();

        assert!(!out.is_empty());
        let min_emitted = out.iter().map(|f| f.tile.z).min().unwrap();
        // area in px² at zoom z is 0.5 * (1e-4 * 2^z * 256)²; crosses 1 px²
        // between z5 (0.33) and z6 (1.3)
        assert_eq!(min_emitted, 6);
    }

    // ===== Hole subtraction =====

    #[test]
    fn test_hole_removes_interior_tile_entirely() {
        let r = renderer(2);
        // outer covers the world, hole exactly covers tile (1, 1) at z2
        let donut = Geometry::Polygon(polygon![
            exterior: [
                (x: 0.0, y: 0.0),
                (x: 1.0, y: 0.0),
                (x: 1.0, y: 1.0),
                (x: 0.0, y: 1.0),
            ],
            interiors: [
                [
                    (x: 0.25, y: 0.25),
                    (x: 0.25, y: 0.5),
                    (x: 0.5, y: 0.5),
                    (x: 0.5, y: 0.25),
                ],
            ],
        ]);
        let feature = SimpleFeature::new(donut, 2, 2).with_buffer_pixels(0.0);
        let mut out = Vec::new();
        r.render(&feature, &mut out).unwrap();

        let tiles = tiles_at_zoom(&out, 2);
        assert!(!tiles.contains(&TileCoord::new(1, 1, 2)), "{tiles:?}");
        assert_eq!(tiles.len(), 15, "{tiles:?}");
    }

    // ===== Concurrency =====

    #[test]
    fn test_concurrent_renders_produce_distinct_ids() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 125;

        let r = Arc::new(renderer(0));
        let mut all_ids = Vec::new();

        std::thread::scope(|scope| {
            let mut handles = Vec::new();
            for t in 0..THREADS {
                let r = Arc::clone(&r);
                handles.push(scope.spawn(move || {
                    let mut ids = Vec::with_capacity(PER_THREAD);
                    for i in 0..PER_THREAD {
                        let x = (t * PER_THREAD + i) as f64 / 1000.0;
                        let feature =
                            SimpleFeature::new(Geometry::Point(point!(x: x, y: 0.5)), 0, 0);
                        let mut out = Vec::new();
                        r.render(&feature, &mut out).unwrap();
                        assert_eq!(out.len(), 1);
                        ids.push(out[0].feature_id);
                    }
                    ids
                }));
            }
            for h in handles {
                all_ids.extend(h.join().unwrap());
            }
        });

        assert_eq!(all_ids.len(), THREADS * PER_THREAD);
        let distinct: HashSet<i64> = all_ids.iter().copied().collect();
        assert_eq!(distinct.len(), THREADS * PER_THREAD);
        assert!(all_ids.iter().all(|&id| id >= 1));
    }
}
