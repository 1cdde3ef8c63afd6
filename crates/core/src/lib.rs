//! Core library for slicing world-coordinate geometries into vector map tiles.
//!
//! This crate implements the hot path of a planet-scale tiler: given one
//! simplified geometry in normalized world coordinates (zoom `z` spans
//! `[0, 2^z)` on each axis) plus per-zoom rendering parameters, it produces
//! the exact set of buffered, clipped, tile-local geometries for every zoom
//! level and tile the feature touches — including antimeridian world-wrap
//! duplication and a fill short-circuit that marks tiles fully interior to a
//! polygon instead of clipping an ocean-sized ring tile by tile.
//!
//! Ingestion, tag matching, tile encoding and archive writing are all
//! upstream/downstream concerns; this crate talks to them through the
//! [`render::GeometryEncoder`] and [`render::FeatureSink`] traits.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use geo::{Geometry, polygon};
//! use tilecut_core::render::{FeatureIds, FeatureRenderer, SimpleFeature};
//! use tilecut_core::tile::TileExtents;
//!
//! let extents = Arc::new(TileExtents::full(14));
//! let ids = Arc::new(FeatureIds::new());
//! let encoder = |geom: &geo::Geometry<f64>| Ok(format!("{geom:?}").into_bytes());
//! let renderer = FeatureRenderer::new(extents, encoder, ids);
//!
//! let feature = SimpleFeature::new(
//!     Geometry::Polygon(polygon![
//!         (x: 0.2, y: 0.2),
//!         (x: 0.8, y: 0.2),
//!         (x: 0.8, y: 0.8),
//!         (x: 0.2, y: 0.8),
//!     ]),
//!     0,
//!     14,
//! );
//!
//! let mut out = Vec::new();
//! renderer.render(&feature, &mut out).unwrap();
//! ```

use thiserror::Error;

use crate::tile::TileCoord;

pub mod geom;
#[cfg(test)]
mod integration_tests;
pub mod render;
pub mod simplify;
pub mod slice;
pub mod tile;

/// Feature attribute map, shared across all tiles of one feature at one zoom.
pub type Attrs = serde_json::Map<String, serde_json::Value>;

/// Errors that abort rendering of a whole feature.
///
/// Per-tile reassembly failures are *not* represented here — those are
/// recoverable ([`GeometryError`]), logged and skipped without aborting the
/// remaining tiles of the feature.
#[derive(Error, Debug)]
pub enum Error {
    /// A geometry type the renderer does not handle reached the extractor.
    /// This is an upstream contract violation, not a data problem.
    #[error("unsupported geometry type: {0}")]
    UnsupportedGeometry(&'static str),

    /// Malformed input geometry (NaN/infinite coordinates). The whole feature
    /// is rejected; no partial output is produced.
    #[error("invalid input geometry: {0}")]
    InvalidGeometry(String),

    /// The downstream geometry encoder failed.
    #[error("geometry encoding failed: {0}")]
    Encode(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Recoverable failure to assemble one tile's geometry after clipping
/// (self-intersecting or degenerate result). Carries enough identity for the
/// renderer to log and skip exactly that tile.
#[derive(Error, Debug)]
#[error("feature {feature_id} produced invalid geometry in tile {}/{}/{}: {reason}", tile.z, tile.x, tile.y)]
pub struct GeometryError {
    pub feature_id: i64,
    pub tile: TileCoord,
    pub reason: String,
}
