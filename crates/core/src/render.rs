//! Per-zoom feature rendering: the loop that turns one world-coordinate
//! feature into encoded tile-local records.
//!
//! For every zoom in the feature's range the renderer resolves per-zoom
//! parameters, scales and simplifies the geometry, extracts groups, hands
//! them to the slicer, reassembles each tile's clipped pieces and pushes
//! [`RenderedFeature`] records to the sink. Points skip the clipping pipeline
//! and are bucketed directly, optionally tagged with a label-grid group for
//! downstream density thinning.
//!
//! Per-tile reassembly failures are logged and skipped; the remaining tiles
//! of the feature still emit. Tiles fully interior to a polygon share one
//! encoded full-tile square rather than re-encoding per tile, which is what
//! keeps ocean-sized features cheap.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use geo::orient::{Direction, Orient};
use geo::{Coord, Geometry, LineString, Polygon};
use log::warn;

use crate::geom::{self, Group};
use crate::simplify;
use crate::slice::{slice_into_tiles, slice_points};
use crate::tile::{TileCoord, TileExtents, TILE_SIZE_PX};
use crate::{Attrs, Error, GeometryError, Result};

/// Default bleed past a tile's edge, in pixels.
pub const DEFAULT_BUFFER_PX: f64 = 4.0;
/// Default simplification tolerance, in pixels.
pub const DEFAULT_TOLERANCE_PX: f64 = 0.1;
/// Default minimum feature size, in pixels (squared for areas).
pub const DEFAULT_MIN_SIZE_PX: f64 = 1.0;

/// Tile-local snap grid: 1/16 of a pixel, coarse enough to merge the
/// nearly-coincident points clipping introduces.
const SNAP_GRID_DENOM: f64 = 16.0;

/// Label-grid membership of a rendered point, used downstream to cap the
/// number of labels per grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelGroup {
    pub group_id: u64,
    pub limit: i32,
}

/// One emitted record: a tile, the encoded tile-local geometry, and the
/// metadata the downstream sort and archive writer need.
#[derive(Debug, Clone)]
pub struct RenderedFeature {
    pub tile: TileCoord,
    pub geometry: Bytes,
    pub attributes: Attrs,
    pub z_order: i32,
    pub label_group: Option<LabelGroup>,
    /// Shared across all tiles and zooms of one input feature.
    pub feature_id: i64,
}

/// Process-wide monotonic feature-id generator, shared by all rendering
/// threads. Passed in explicitly so tests can construct deterministic ids.
#[derive(Debug)]
pub struct FeatureIds(AtomicI64);

impl FeatureIds {
    pub fn new() -> Self {
        Self(AtomicI64::new(1))
    }

    pub fn next(&self) -> i64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for FeatureIds {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-zoom rendering parameters of one feature. Implementations are read
/// only; a feature may be rendered from many threads concurrently.
pub trait RenderableFeature {
    fn world_geometry(&self) -> &Geometry<f64>;
    fn min_zoom(&self) -> u8;
    fn max_zoom(&self) -> u8;

    fn attributes_at_zoom(&self, zoom: u8) -> Attrs;

    fn z_order(&self) -> i32 {
        0
    }

    fn buffer_pixels_at_zoom(&self, _zoom: u8) -> f64 {
        DEFAULT_BUFFER_PX
    }

    fn tolerance_at_zoom(&self, _zoom: u8) -> f64 {
        DEFAULT_TOLERANCE_PX
    }

    fn min_pixel_size_at_zoom(&self, _zoom: u8) -> f64 {
        DEFAULT_MIN_SIZE_PX
    }

    /// Label-grid cell size in pixels; below 1.0 thinning is a no-op and no
    /// group is attached.
    fn label_grid_pixel_size_at_zoom(&self, _zoom: u8) -> f64 {
        0.0
    }

    fn label_grid_limit_at_zoom(&self, _zoom: u8) -> i32 {
        0
    }
}

/// A feature with fixed per-zoom parameters, built up with `with_*` calls.
#[derive(Debug, Clone)]
pub struct SimpleFeature {
    geometry: Geometry<f64>,
    min_zoom: u8,
    max_zoom: u8,
    attributes: Attrs,
    z_order: i32,
    buffer_px: f64,
    tolerance_px: f64,
    min_size_px: f64,
    label_grid_size_px: f64,
    label_grid_limit: i32,
}

impl SimpleFeature {
    pub fn new(geometry: Geometry<f64>, min_zoom: u8, max_zoom: u8) -> Self {
        Self {
            geometry,
            min_zoom,
            max_zoom,
            attributes: Attrs::new(),
            z_order: 0,
            buffer_px: DEFAULT_BUFFER_PX,
            tolerance_px: DEFAULT_TOLERANCE_PX,
            min_size_px: DEFAULT_MIN_SIZE_PX,
            label_grid_size_px: 0.0,
            label_grid_limit: 0,
        }
    }

    pub fn with_attributes(mut self, attributes: Attrs) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_z_order(mut self, z_order: i32) -> Self {
        self.z_order = z_order;
        self
    }

    pub fn with_buffer_pixels(mut self, pixels: f64) -> Self {
        self.buffer_px = pixels;
        self
    }

    pub fn with_tolerance_pixels(mut self, pixels: f64) -> Self {
        self.tolerance_px = pixels;
        self
    }

    pub fn with_min_pixel_size(mut self, pixels: f64) -> Self {
        self.min_size_px = pixels;
        self
    }

    pub fn with_label_grid(mut self, cell_pixels: f64, limit: i32) -> Self {
        self.label_grid_size_px = cell_pixels;
        self.label_grid_limit = limit;
        self
    }
}

impl RenderableFeature for SimpleFeature {
    fn world_geometry(&self) -> &Geometry<f64> {
        &self.geometry
    }

    fn min_zoom(&self) -> u8 {
        self.min_zoom
    }

    fn max_zoom(&self) -> u8 {
        self.max_zoom
    }

    fn attributes_at_zoom(&self, _zoom: u8) -> Attrs {
        self.attributes.clone()
    }

    fn z_order(&self) -> i32 {
        self.z_order
    }

    fn buffer_pixels_at_zoom(&self, _zoom: u8) -> f64 {
        self.buffer_px
    }

    fn tolerance_at_zoom(&self, _zoom: u8) -> f64 {
        self.tolerance_px
    }

    fn min_pixel_size_at_zoom(&self, _zoom: u8) -> f64 {
        self.min_size_px
    }

    fn label_grid_pixel_size_at_zoom(&self, _zoom: u8) -> f64 {
        self.label_grid_size_px
    }

    fn label_grid_limit_at_zoom(&self, _zoom: u8) -> i32 {
        self.label_grid_limit
    }
}

/// Maps a reassembled tile-local geometry to the archive's wire encoding.
/// Opaque to the renderer; any `Fn(&Geometry) -> Result<Vec<u8>>` works.
pub trait GeometryEncoder {
    fn encode(&self, geometry: &Geometry<f64>) -> Result<Vec<u8>>;
}

impl<F> GeometryEncoder for F
where
    F: Fn(&Geometry<f64>) -> Result<Vec<u8>>,
{
    fn encode(&self, geometry: &Geometry<f64>) -> Result<Vec<u8>> {
        self(geometry)
    }
}

/// Receives rendered records, unordered across tiles. A downstream sort
/// establishes archive order.
pub trait FeatureSink {
    fn accept(&mut self, feature: RenderedFeature);
}

impl FeatureSink for Vec<RenderedFeature> {
    fn accept(&mut self, feature: RenderedFeature) {
        self.push(feature);
    }
}

/// Renders features across their zoom range. Stateless apart from shared
/// read-only configuration and the id counter; safe to call from many
/// threads at once.
pub struct FeatureRenderer<E> {
    extents: Arc<TileExtents>,
    encoder: E,
    ids: Arc<FeatureIds>,
}

impl<E: GeometryEncoder> FeatureRenderer<E> {
    pub fn new(extents: Arc<TileExtents>, encoder: E, ids: Arc<FeatureIds>) -> Self {
        Self {
            extents,
            encoder,
            ids,
        }
    }

    /// Render one feature across all its zoom levels, pushing records to
    /// `sink`. Fails up front on malformed input or unsupported geometry
    /// types; per-tile reassembly problems are logged and skipped.
    pub fn render(&self, feature: &impl RenderableFeature, sink: &mut impl FeatureSink) -> Result<()> {
        let geometry = feature.world_geometry();
        geom::validate_finite(geometry)?;
        let feature_id = self.ids.next();
        self.render_geometry(geometry, feature, feature_id, sink)
    }

    fn render_geometry(
        &self,
        geometry: &Geometry<f64>,
        feature: &impl RenderableFeature,
        feature_id: i64,
        sink: &mut impl FeatureSink,
    ) -> Result<()> {
        match geometry {
            Geometry::Point(p) => self.render_points(&[p.0], feature, feature_id, sink),
            Geometry::MultiPoint(mp) => {
                let coords: Vec<Coord<f64>> = mp.0.iter().map(|p| p.0).collect();
                self.render_points(&coords, feature, feature_id, sink)
            }
            Geometry::LineString(_) | Geometry::MultiLineString(_) => {
                self.render_shape(geometry, false, feature, feature_id, sink)
            }
            Geometry::Polygon(_) | Geometry::MultiPolygon(_) => {
                self.render_shape(geometry, true, feature, feature_id, sink)
            }
            Geometry::GeometryCollection(gc) => {
                for g in &gc.0 {
                    self.render_geometry(g, feature, feature_id, sink)?;
                }
                Ok(())
            }
            Geometry::Line(_) => Err(Error::UnsupportedGeometry("Line")),
            Geometry::Rect(_) => Err(Error::UnsupportedGeometry("Rect")),
            Geometry::Triangle(_) => Err(Error::UnsupportedGeometry("Triangle")),
        }
    }

    fn zoom_range(&self, feature: &impl RenderableFeature) -> std::ops::RangeInclusive<u8> {
        feature.min_zoom()..=feature.max_zoom().min(self.extents.max_zoom())
    }

    fn render_points(
        &self,
        coords: &[Coord<f64>],
        feature: &impl RenderableFeature,
        feature_id: i64,
        sink: &mut impl FeatureSink,
    ) -> Result<()> {
        for zoom in self.zoom_range(feature).rev() {
            let scale = (1u64 << zoom) as f64;
            let scaled: Vec<Coord<f64>> = coords
                .iter()
                .map(|c| Coord {
                    x: c.x * scale,
                    y: c.y * scale,
                })
                .collect();
            let buffer = feature.buffer_pixels_at_zoom(zoom) / TILE_SIZE_PX;
            let tiles = slice_points(&scaled, buffer, zoom, self.extents.for_zoom(zoom));
            if tiles.is_empty() {
                continue;
            }
            let label_group = label_group_for(feature, zoom, &scaled);
            let attrs = feature.attributes_at_zoom(zoom);
            for (tile, locals) in tiles {
                let Some(geometry) = geom::reassemble_points(&locals) else {
                    continue;
                };
                let encoded = self.encoder.encode(&geometry)?;
                sink.accept(RenderedFeature {
                    tile,
                    geometry: Bytes::from(encoded),
                    attributes: attrs.clone(),
                    z_order: feature.z_order(),
                    label_group,
                    feature_id,
                });
            }
        }
        Ok(())
    }

    fn render_shape(
        &self,
        geometry: &Geometry<f64>,
        is_area: bool,
        feature: &impl RenderableFeature,
        feature_id: i64,
        sink: &mut impl FeatureSink,
    ) -> Result<()> {
        // cheap reject for a bare line: its world length scales linearly
        // with zoom, so the comparison needs no simplification work
        let single_line_length = match geometry {
            Geometry::LineString(ls) if !is_area => Some(geom::seq_length(&ls.0)),
            _ => None,
        };

        for zoom in self.zoom_range(feature).rev() {
            let scale = (1u64 << zoom) as f64;
            let min_px = feature.min_pixel_size_at_zoom(zoom);
            if let Some(length) = single_line_length {
                if length * scale * TILE_SIZE_PX < min_px {
                    continue;
                }
            }

            let tolerance = feature.tolerance_at_zoom(zoom) / TILE_SIZE_PX;
            let buffer = feature.buffer_pixels_at_zoom(zoom) / TILE_SIZE_PX;
            let min_units = min_px / TILE_SIZE_PX;

            let scaled = simplify::scale_to_zoom(geometry, zoom);
            let simplified = simplify::simplify(&scaled, tolerance);
            let groups =
                geom::extract_groups(&simplified, min_units * min_units, min_units)?;
            if groups.is_empty() {
                continue;
            }

            let sliced = slice_into_tiles(&groups, buffer, is_area, zoom, self.extents.for_zoom(zoom));
            let attrs = feature.attributes_at_zoom(zoom);
            for (&tile, contents) in sliced.tile_data() {
                let assembled = if is_area {
                    assemble_area(contents)
                } else {
                    Ok(geom::reassemble_lines(contents))
                };
                let geometry = match assembled {
                    Ok(Some(g)) => g,
                    Ok(None) => continue,
                    Err(reason) => {
                        warn!(
                            "{}",
                            GeometryError {
                                feature_id,
                                tile,
                                reason,
                            }
                        );
                        continue;
                    }
                };
                let encoded = self.encoder.encode(&geometry)?;
                sink.accept(RenderedFeature {
                    tile,
                    geometry: Bytes::from(encoded),
                    attributes: attrs.clone(),
                    z_order: feature.z_order(),
                    label_group: None,
                    feature_id,
                });
            }

            if is_area {
                let filled = sliced.filled_tiles();
                if !filled.is_empty() {
                    // one encoded square is shared by every filled tile
                    let square = fill_square(feature.buffer_pixels_at_zoom(zoom));
                    let encoded = Bytes::from(self.encoder.encode(&square)?);
                    for tile in filled {
                        sink.accept(RenderedFeature {
                            tile,
                            geometry: encoded.clone(),
                            attributes: attrs.clone(),
                            z_order: feature.z_order(),
                            label_group: None,
                            feature_id,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Snap, validate and orient one tile's reassembled polygon. Errors are
/// per-tile recoverable; `None` means the tile collapsed below the snap grid.
fn assemble_area(contents: &[Group]) -> std::result::Result<Option<Geometry<f64>>, String> {
    let Some(assembled) = geom::reassemble_polygons(contents) else {
        return Ok(None);
    };
    let Some(snapped) = geom::snap_polygons(&assembled, SNAP_GRID_DENOM) else {
        return Ok(None);
    };
    geom::validate_polygons(&snapped)?;
    Ok(Some(orient_for_encoding(snapped)))
}

fn orient_for_encoding(geometry: Geometry<f64>) -> Geometry<f64> {
    match geometry {
        Geometry::Polygon(p) => Geometry::Polygon(p.orient(Direction::Default)),
        Geometry::MultiPolygon(mp) => Geometry::MultiPolygon(mp.orient(Direction::Default)),
        other => other,
    }
}

/// Buffered full-tile square, in tile-local pixels.
fn fill_square(buffer_px: f64) -> Geometry<f64> {
    let lo = -buffer_px;
    let hi = TILE_SIZE_PX + buffer_px;
    let ring = LineString::from(vec![(lo, lo), (hi, lo), (hi, hi), (lo, hi), (lo, lo)]);
    Geometry::Polygon(Polygon::new(ring, vec![]).orient(Direction::Default))
}

/// Label-grid group for a point feature at one zoom, or `None` when thinning
/// is disabled or the cell rounds below one pixel. Multi-point features are
/// keyed by their first coordinate.
fn label_group_for(
    feature: &impl RenderableFeature,
    zoom: u8,
    scaled: &[Coord<f64>],
) -> Option<LabelGroup> {
    let cell_px = feature.label_grid_pixel_size_at_zoom(zoom);
    let limit = feature.label_grid_limit_at_zoom(zoom);
    if cell_px < 1.0 || limit <= 0 {
        return None;
    }
    let first = scaled.first()?;
    Some(LabelGroup {
        group_id: label_grid_id(first.x * TILE_SIZE_PX, first.y * TILE_SIZE_PX, cell_px),
        limit,
    })
}

/// Quantize a world-pixel position into a grid-cell id: cell row in the high
/// 32 bits, cell column in the low 32.
fn label_grid_id(x_px: f64, y_px: f64, cell_px: f64) -> u64 {
    let gx = (x_px / cell_px).floor() as i64;
    let gy = (y_px / cell_px).floor() as i64;
    ((gy as u64) << 32) | (gx as u64 & 0xFFFF_FFFF)
}
