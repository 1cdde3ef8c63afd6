//! Tile coordinates, per-zoom extents and world-coordinate math.
//!
//! All slicing happens in normalized world coordinates where the whole tile
//! pyramid at zoom `z` spans `[0, 2^z)` on each axis with y increasing
//! southward. Geographic input is projected into that space once with Web
//! Mercator (EPSG:3857) before rendering.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Side length of one tile in output pixels.
pub const TILE_SIZE_PX: f64 = 256.0;

/// Tile coordinates: x, y, and zoom level. Valid range for x and y is
/// `[0, 2^z)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

impl TileCoord {
    /// Create a new tile coordinate.
    pub fn new(x: u32, y: u32, z: u8) -> Self {
        Self { x, y, z }
    }

    /// The tile's bounds in world coordinates at its own zoom: the unit
    /// square `[x, x+1) × [y, y+1)`.
    pub fn world_bounds(&self) -> (f64, f64, f64, f64) {
        let (x, y) = (self.x as f64, self.y as f64);
        (x, y, x + 1.0, y + 1.0)
    }
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Number of tiles along one axis at a zoom level.
pub fn tiles_at_zoom(zoom: u8) -> i32 {
    1i32 << zoom
}

/// Project longitude/latitude (degrees) to normalized world coordinates in
/// `[0, 1) × [0, 1)` using Web Mercator.
///
/// Latitudes beyond the Web Mercator limits (±85.0511°) clamp to the top and
/// bottom edges of the world square.
pub fn lng_lat_to_world(lng: f64, lat: f64) -> (f64, f64) {
    let x = (lng + 180.0) / 360.0;
    let lat_rad = lat.to_radians();
    let y = (1.0 - lat_rad.tan().asinh() / PI) / 2.0;
    (x.clamp(0.0, 1.0), y.clamp(0.0, 1.0))
}

/// Inverse of [`lng_lat_to_world`].
pub fn world_to_lng_lat(x: f64, y: f64) -> (f64, f64) {
    let lng = x * 360.0 - 180.0;
    let lat = (PI * (1.0 - 2.0 * y)).sinh().atan().to_degrees();
    (lng, lat)
}

/// Inclusive tile-index bounds for one zoom level, used to prune slicing
/// work to an area of interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoomExtents {
    min_x: i32,
    max_x: i32,
    min_y: i32,
    max_y: i32,
}

impl ZoomExtents {
    /// Extents covering every tile at the given zoom.
    pub fn full(zoom: u8) -> Self {
        let max = tiles_at_zoom(zoom) - 1;
        Self {
            min_x: 0,
            max_x: max,
            min_y: 0,
            max_y: max,
        }
    }

    /// True if tile column `x` intersects the area of interest. `x` must
    /// already be wrapped into `[0, 2^z)`.
    pub fn test_x(&self, x: i32) -> bool {
        x >= self.min_x && x <= self.max_x
    }

    /// True if tile row `y` intersects the area of interest.
    pub fn test_y(&self, y: i32) -> bool {
        y >= self.min_y && y <= self.max_y
    }
}

/// Per-zoom tile extents derived from a bounding box, indexable for zooms
/// `0..=max_zoom`.
#[derive(Debug, Clone)]
pub struct TileExtents {
    zooms: Vec<ZoomExtents>,
}

impl TileExtents {
    /// Extents covering the whole world at every zoom up to `max_zoom`.
    pub fn full(max_zoom: u8) -> Self {
        Self {
            zooms: (0..=max_zoom).map(ZoomExtents::full).collect(),
        }
    }

    /// Extents covering a bounding box given in normalized world coordinates
    /// (`[0, 1]` on each axis).
    pub fn from_world_bounds(max_zoom: u8, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        let zooms = (0..=max_zoom)
            .map(|zoom| {
                let n = tiles_at_zoom(zoom);
                let clamp = |tile: f64| (tile.floor() as i32).clamp(0, n - 1);
                ZoomExtents {
                    min_x: clamp(min_x * n as f64),
                    // subtract an epsilon-free open upper bound: a bbox edge
                    // exactly on a tile boundary does not pull in the next tile
                    max_x: clamp((max_x * n as f64 - 1.0).max(0.0).ceil()),
                    min_y: clamp(min_y * n as f64),
                    max_y: clamp((max_y * n as f64 - 1.0).max(0.0).ceil()),
                }
            })
            .collect();
        Self { zooms }
    }

    /// Extents covering a geographic bounding box (degrees).
    pub fn from_lng_lat_bounds(
        max_zoom: u8,
        lng_min: f64,
        lat_min: f64,
        lng_max: f64,
        lat_max: f64,
    ) -> Self {
        let (min_x, min_y) = lng_lat_to_world(lng_min, lat_max);
        let (max_x, max_y) = lng_lat_to_world(lng_max, lat_min);
        Self::from_world_bounds(max_zoom, min_x, min_y, max_x, max_y)
    }

    /// Maximum zoom these extents were built for.
    pub fn max_zoom(&self) -> u8 {
        (self.zooms.len() - 1) as u8
    }

    /// The extents for one zoom level. Panics if `zoom` exceeds `max_zoom`.
    pub fn for_zoom(&self, zoom: u8) -> &ZoomExtents {
        &self.zooms[zoom as usize]
    }
}
