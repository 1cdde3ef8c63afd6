//! Two-axis stripe clipping of coordinate groups into buffered tiles.
//!
//! [`slice_into_tiles`] takes groups of rings/lines in tile units at one zoom
//! (1.0 = one tile edge) and produces, per tile, the tile-local clipped
//! sequences plus — for polygons — the set of tiles fully covered by the
//! interior, which need no boundary geometry at all.
//!
//! The clip runs in two passes: an X pass cuts every ring/line into one
//! vertical stripe per tile column, then a Y pass cuts each stripe into tile
//! rows. Both passes are Sutherland-Hodgman style per segment: in-band
//! vertices are kept, exact crossings are inserted at the band edges, and
//! outside vertices are dropped so ring closure regenerates runs along the
//! clip edges.
//!
//! The Y pass is where the fill short-circuit lives: a vertical run lying
//! exactly on a stripe's left or right clip edge, traversed in the direction
//! that puts the interior inside the stripe, covers whole tile rows without
//! contributing geometry to them. A column's filled rows are the intersection
//! of left-covered and right-covered rows; holes subtract their own covered
//! rows. Rows that any ring of the group touches partially are "detail" rows:
//! covering runs backfill synthetic edge points into those rows so their
//! rings still close after the skip.
//!
//! Geometry crossing the left or right pyramid edge is wrapped by re-running
//! the whole slice shifted one world width, so antimeridian features come out
//! merged rather than split.

use std::collections::{BTreeSet, HashMap};

use geo::Coord;
use log::trace;
use smallvec::SmallVec;

use crate::geom::{CoordSeq, Group};
use crate::tile::{tiles_at_zoom, TileCoord, ZoomExtents, TILE_SIZE_PX};

// ============================================================================
// Small sparse containers
// ============================================================================

/// Sorted-vec map keyed by a tile index. The slicer's access pattern is
/// insert-during-scan over a handful of nearby keys, then iterate once in
/// order, which favors binary search over hashing.
#[derive(Debug)]
pub(crate) struct SparseVec<T> {
    entries: Vec<(i32, T)>,
}

impl<T> SparseVec<T> {
    pub(crate) fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub(crate) fn get_or_insert_with(&mut self, key: i32, default: impl FnOnce() -> T) -> &mut T {
        match self.entries.binary_search_by_key(&key, |e| e.0) {
            Ok(i) => &mut self.entries[i].1,
            Err(i) => {
                self.entries.insert(i, (key, default()));
                &mut self.entries[i].1
            }
        }
    }

    pub(crate) fn get(&self, key: i32) -> Option<&T> {
        self.entries
            .binary_search_by_key(&key, |e| e.0)
            .ok()
            .map(|i| &self.entries[i].1)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (i32, &T)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    pub(crate) fn keys(&self) -> impl Iterator<Item = i32> + '_ {
        self.entries.iter().map(|(k, _)| *k)
    }

    pub(crate) fn map<U>(self, mut f: impl FnMut(T) -> U) -> SparseVec<U> {
        SparseVec {
            entries: self.entries.into_iter().map(|(k, v)| (k, f(v))).collect(),
        }
    }
}

/// Set of `i32` values stored as sorted disjoint inclusive spans. Tile-row
/// fill state is almost always a single long run, so spans beat bitsets.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct RangeSet {
    spans: Vec<(i32, i32)>,
}

impl RangeSet {
    pub(crate) fn add(&mut self, lo: i32, hi: i32) {
        if lo > hi {
            return;
        }
        let start = self.spans.partition_point(|s| s.1 < lo.saturating_sub(1));
        let mut end = start;
        let (mut new_lo, mut new_hi) = (lo, hi);
        while end < self.spans.len() && self.spans[end].0 <= hi.saturating_add(1) {
            new_lo = new_lo.min(self.spans[end].0);
            new_hi = new_hi.max(self.spans[end].1);
            end += 1;
        }
        self.spans.splice(start..end, [(new_lo, new_hi)]);
    }

    pub(crate) fn remove(&mut self, lo: i32, hi: i32) {
        if lo > hi || self.spans.is_empty() {
            return;
        }
        let mut result = Vec::with_capacity(self.spans.len() + 1);
        for &(a, b) in &self.spans {
            if b < lo || a > hi {
                result.push((a, b));
                continue;
            }
            if a < lo {
                result.push((a, lo - 1));
            }
            if b > hi {
                result.push((hi + 1, b));
            }
        }
        self.spans = result;
    }

    pub(crate) fn subtract(&mut self, other: &RangeSet) {
        for &(a, b) in &other.spans {
            self.remove(a, b);
        }
    }

    pub(crate) fn intersection(&self, other: &RangeSet) -> RangeSet {
        let mut out = RangeSet::default();
        let (mut i, mut j) = (0, 0);
        while i < self.spans.len() && j < other.spans.len() {
            let (a1, b1) = self.spans[i];
            let (a2, b2) = other.spans[j];
            let lo = a1.max(a2);
            let hi = b1.min(b2);
            if lo <= hi {
                out.spans.push((lo, hi));
            }
            if b1 < b2 {
                i += 1;
            } else {
                j += 1;
            }
        }
        out
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = i32> + '_ {
        self.spans.iter().flat_map(|&(a, b)| a..=b)
    }
}

// ============================================================================
// Stripe buffer
// ============================================================================

/// Coordinate sequence builder that drops exact consecutive duplicates and
/// merges collinear continuations along either axis. Merging is what turns a
/// chain of per-segment crossing points into one long run along a clip edge,
/// which the fill detection depends on.
#[derive(Debug, Default)]
struct StripeBuf {
    coords: CoordSeq,
}

impl StripeBuf {
    fn push(&mut self, x: f64, y: f64) {
        let c = Coord { x, y };
        if self.coords.last() == Some(&c) {
            return;
        }
        let n = self.coords.len();
        if n >= 2 {
            let prev = self.coords[n - 2];
            let last = self.coords[n - 1];
            // extend, never fold back, so zig-zag reversals survive
            let same_x = prev.x == last.x && last.x == c.x && (c.y - last.y) * (last.y - prev.y) > 0.0;
            let same_y = prev.y == last.y && last.y == c.y && (c.x - last.x) * (last.x - prev.x) > 0.0;
            if same_x || same_y {
                self.coords[n - 1] = c;
                return;
            }
        }
        self.coords.push(c);
    }

    fn close_ring(&mut self) {
        if let (Some(&first), Some(&last)) = (self.coords.first(), self.coords.last()) {
            if first != last {
                self.coords.push(first);
            }
        }
    }

    fn len(&self) -> usize {
        self.coords.len()
    }

    fn take(&mut self) -> CoordSeq {
        std::mem::take(&mut self.coords)
    }
}

/// Per-column (or per-row) stripes of an open line; exiting the band closes
/// the current stripe since a line cannot continue without re-entering.
#[derive(Debug, Default)]
struct LineStripes {
    done: SmallVec<[CoordSeq; 1]>,
    cur: StripeBuf,
}

impl LineStripes {
    fn flush(&mut self) {
        if self.cur.len() >= 2 {
            self.done.push(self.cur.take());
        } else {
            self.cur.take();
        }
    }
}

// ============================================================================
// Result container
// ============================================================================

/// Output of slicing one geometry at one zoom: explicit tile contents plus,
/// for polygons, the interior-filled rows per tile column.
#[derive(Debug)]
pub struct TiledGeometry {
    zoom: u8,
    extents: ZoomExtents,
    tile_contents: HashMap<TileCoord, Vec<Group>>,
    filled: SparseVec<RangeSet>,
}

impl TiledGeometry {
    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    /// Tiles with explicitly clipped boundary geometry.
    pub fn tile_data(&self) -> &HashMap<TileCoord, Vec<Group>> {
        &self.tile_contents
    }

    pub fn get(&self, tile: TileCoord) -> Option<&Vec<Group>> {
        self.tile_contents.get(&tile)
    }

    /// Tiles fully interior to the sliced polygon that have no boundary
    /// contents; these need only a synthetic full-tile square. Sorted by
    /// column, then row.
    pub fn filled_tiles(&self) -> Vec<TileCoord> {
        let world = tiles_at_zoom(self.zoom);
        let mut tiles = Vec::new();
        for (col, rows) in self.filled.iter() {
            for row in rows.iter() {
                if row < 0 || row >= world || !self.extents.test_y(row) {
                    continue;
                }
                let tile = TileCoord::new(col as u32, row as u32, self.zoom);
                if !self.tile_contents.contains_key(&tile) {
                    tiles.push(tile);
                }
            }
        }
        tiles
    }

    pub fn is_empty(&self) -> bool {
        self.tile_contents.is_empty() && self.filled.keys().next().is_none()
    }
}

// ============================================================================
// Entry points
// ============================================================================

/// Slice groups of rings (`is_area`) or lines into buffered tiles at one
/// zoom. Coordinates are in tile units at that zoom; `buffer` is the bleed
/// past each tile edge in the same units. Output coordinates are tile-local
/// pixels in `[-buffer*256, 256 + buffer*256]`.
pub fn slice_into_tiles(
    groups: &[Group],
    buffer: f64,
    is_area: bool,
    zoom: u8,
    extents: &ZoomExtents,
) -> TiledGeometry {
    let mut slicer = Slicer {
        world: tiles_at_zoom(zoom),
        buffer,
        is_area,
        zoom,
        extents: *extents,
        wrap_left: false,
        wrap_right: false,
        out: TiledGeometry {
            zoom,
            extents: *extents,
            tile_contents: HashMap::new(),
            filled: SparseVec::new(),
        },
    };
    for group in groups {
        slicer.slice_group(group, 0.0, true);
    }
    let world = slicer.world as f64;
    if slicer.wrap_right {
        trace!("geometry overflows right pyramid edge at z{zoom}, re-slicing wrapped copy");
        for group in groups {
            slicer.slice_group(group, -world, false);
        }
    }
    if slicer.wrap_left {
        trace!("geometry overflows left pyramid edge at z{zoom}, re-slicing wrapped copy");
        for group in groups {
            slicer.slice_group(group, world, false);
        }
    }
    slicer.out
}

/// Bucket points into tiles at one zoom, duplicating into neighbors whose
/// buffer zone a point falls inside. The x axis wraps around the world; y
/// does not. Output coordinates are tile-local pixels.
pub fn slice_points(
    points: &[Coord<f64>],
    buffer: f64,
    zoom: u8,
    extents: &ZoomExtents,
) -> HashMap<TileCoord, Vec<Coord<f64>>> {
    let world = tiles_at_zoom(zoom);
    let mut out: HashMap<TileCoord, Vec<Coord<f64>>> = HashMap::new();
    for p in points {
        let col_lo = (p.x - buffer).floor() as i32;
        let col_hi = (p.x + buffer).floor() as i32;
        let row_lo = (p.y - buffer).floor() as i32;
        let row_hi = (p.y + buffer).floor() as i32;
        for col in col_lo..=col_hi {
            let wrapped = col.rem_euclid(world);
            if !extents.test_x(wrapped) {
                continue;
            }
            for row in row_lo..=row_hi {
                if row < 0 || row >= world || !extents.test_y(row) {
                    continue;
                }
                let local = Coord {
                    x: (p.x - col as f64) * TILE_SIZE_PX,
                    y: (p.y - row as f64) * TILE_SIZE_PX,
                };
                out.entry(TileCoord::new(wrapped as u32, row as u32, zoom))
                    .or_default()
                    .push(local);
            }
        }
    }
    out
}

// ============================================================================
// Core slicer
// ============================================================================

struct Slicer {
    world: i32,
    buffer: f64,
    is_area: bool,
    zoom: u8,
    extents: ZoomExtents,
    wrap_left: bool,
    wrap_right: bool,
    out: TiledGeometry,
}

impl Slicer {
    fn slice_group(&mut self, group: &Group, x_offset: f64, record_overflow: bool) {
        if self.is_area {
            self.slice_area_group(group, x_offset, record_overflow);
        } else {
            for seq in group {
                self.slice_line_seq(seq, x_offset, record_overflow);
            }
        }
    }

    /// Tile columns a segment touches. Inclusive at exact column boundaries:
    /// a vertical run lying on `x == c` belongs to column `c-1` (as its right
    /// clip edge) and to column `c` (as its left), which the Y pass needs to
    /// see covering runs from both sides.
    fn x_cols(&self, a: Coord<f64>, b: Coord<f64>) -> (i32, i32) {
        let (min, max) = if a.x < b.x { (a.x, b.x) } else { (b.x, a.x) };
        let lo = (min - self.buffer).ceil() as i32 - 1;
        let hi = (max + self.buffer).floor() as i32;
        (lo, hi)
    }

    /// Tile rows a ring segment touches. Exclusive at exact row boundaries: a
    /// horizontal run on `y == r` with zero buffer touches neither adjacent
    /// row — stripe closure chords regenerate it where a row has content.
    fn y_rows(&self, a: Coord<f64>, b: Coord<f64>) -> (i32, i32) {
        let (min, max) = if a.y < b.y { (a.y, b.y) } else { (b.y, a.y) };
        let lo = (min - self.buffer).floor() as i32;
        let hi = (max + self.buffer).ceil() as i32 - 1;
        (lo, hi)
    }

    /// Tile rows an open-line segment touches. Inclusive at exact row
    /// boundaries, mirroring [`Self::x_cols`]: nothing regenerates a dropped
    /// run for lines, so a horizontal segment on a shared row edge belongs to
    /// both adjacent rows.
    fn y_rows_line(&self, a: Coord<f64>, b: Coord<f64>) -> (i32, i32) {
        let (min, max) = if a.y < b.y { (a.y, b.y) } else { (b.y, a.y) };
        let lo = (min - self.buffer).ceil() as i32 - 1;
        let hi = (max + self.buffer).floor() as i32;
        (lo, hi)
    }

    /// Accept a tile column, recording pyramid overflow during the first
    /// (unshifted) pass so the caller knows to re-run a wrapped copy.
    fn accept_col(&mut self, col: i32, record_overflow: bool) -> bool {
        if col < 0 {
            if record_overflow {
                self.wrap_left = true;
            }
            return false;
        }
        if col >= self.world {
            if record_overflow {
                self.wrap_right = true;
            }
            return false;
        }
        self.extents.test_x(col)
    }

    fn accept_row(&self, row: i32) -> bool {
        row >= 0 && row < self.world && self.extents.test_y(row)
    }

    /// Append the part of segment `a -> b` inside column `col`'s buffered
    /// band to `stripe`, shifting x to column-local coordinates. In-band
    /// endpoints are inclusive; crossings are pushed exactly on the clip
    /// edges so the Y pass can classify edge runs by equality.
    fn append_x(&self, stripe: &mut StripeBuf, a: Coord<f64>, b: Coord<f64>, col: i32) {
        let colf = col as f64;
        let left = colf - self.buffer;
        let right = colf + 1.0 + self.buffer;
        if a.x >= left && a.x <= right {
            stripe.push(a.x - colf, a.y);
        }
        let edges = if a.x < b.x {
            [(left, -self.buffer), (right, 1.0 + self.buffer)]
        } else {
            [(right, 1.0 + self.buffer), (left, -self.buffer)]
        };
        for (edge, local_x) in edges {
            if (a.x - edge) * (b.x - edge) < 0.0 {
                let t = (edge - a.x) / (b.x - a.x);
                stripe.push(local_x, a.y + t * (b.y - a.y));
            }
        }
        // the end point doubles as the next segment's start; the stripe
        // buffer drops the duplicate, but pushing it here keeps corners
        // whose following segment touches no band at all
        if b.x >= left && b.x <= right {
            stripe.push(b.x - colf, b.y);
        }
    }

    /// Y-axis counterpart of [`Self::append_x`], operating on an already
    /// column-local stripe segment against row `row`'s buffered band.
    fn append_y(&self, stripe: &mut StripeBuf, a: Coord<f64>, b: Coord<f64>, row: i32) {
        let rowf = row as f64;
        let lo = rowf - self.buffer;
        let hi = rowf + 1.0 + self.buffer;
        if a.y >= lo && a.y <= hi {
            stripe.push(a.x, a.y - rowf);
        }
        let edges = if a.y < b.y {
            [(lo, -self.buffer), (hi, 1.0 + self.buffer)]
        } else {
            [(hi, 1.0 + self.buffer), (lo, -self.buffer)]
        };
        for (edge, local_y) in edges {
            if (a.y - edge) * (b.y - edge) < 0.0 {
                let t = (edge - a.y) / (b.y - a.y);
                stripe.push(a.x + t * (b.x - a.x), local_y);
            }
        }
        if b.y >= lo && b.y <= hi {
            stripe.push(b.x, b.y - rowf);
        }
    }

    // ------------------------------------------------------------------
    // Areas
    // ------------------------------------------------------------------

    fn slice_area_group(&mut self, group: &Group, x_offset: f64, record_overflow: bool) {
        let ring_cols: Vec<SparseVec<CoordSeq>> = group
            .iter()
            .map(|ring| self.slice_x_ring(ring, x_offset, record_overflow))
            .collect();

        let cols: BTreeSet<i32> = ring_cols.iter().flat_map(|rc| rc.keys()).collect();
        for col in cols {
            // classify every ring first: rows needing explicit content are
            // shared across the whole group, so an outer ring's covering run
            // backfills rows that only a hole touches
            let mut detail = BTreeSet::new();
            let covers: Vec<Option<(RangeSet, RangeSet)>> = ring_cols
                .iter()
                .enumerate()
                .map(|(i, rc)| {
                    rc.get(col)
                        .map(|stripe| self.classify_rows(stripe, i > 0, &mut detail))
                })
                .collect();

            for (i, cover) in covers.iter().enumerate() {
                let Some((left, right)) = cover else { continue };
                let filled = left.intersection(right);
                if filled.is_empty() {
                    continue;
                }
                let column = self.out.filled.get_or_insert_with(col, RangeSet::default);
                if i == 0 {
                    for (lo, hi) in filled.spans {
                        column.add(lo, hi);
                    }
                } else {
                    column.subtract(&filled);
                }
            }

            let ring_rows: Vec<SparseVec<CoordSeq>> = ring_cols
                .iter()
                .map(|rc| match rc.get(col) {
                    Some(stripe) => self.emit_rows(stripe, &detail),
                    None => SparseVec::new(),
                })
                .collect();
            self.commit_area(col, &ring_rows);
        }
    }

    /// X pass for one closed ring: one stripe per touched column, ring-closed
    /// after all segments so holes and re-entries self-close.
    fn slice_x_ring(
        &mut self,
        ring: &CoordSeq,
        x_offset: f64,
        record_overflow: bool,
    ) -> SparseVec<CoordSeq> {
        let mut cols: SparseVec<StripeBuf> = SparseVec::new();
        let n = ring.len();
        if n < 2 {
            return SparseVec::new();
        }
        let closed = ring[0] == ring[n - 1];
        let segments = if closed { n - 1 } else { n };
        for i in 0..segments {
            let a = shift(ring[i], x_offset);
            let b = shift(ring[(i + 1) % n], x_offset);
            let (lo, hi) = self.x_cols(a, b);
            for col in lo..=hi {
                if self.accept_col(col, record_overflow) {
                    self.append_x(cols.get_or_insert_with(col, StripeBuf::default), a, b, col);
                }
            }
        }
        cols.map(|mut buf| {
            buf.close_ring();
            buf.take()
        })
    }

    /// First Y phase for one column stripe of a ring: find which rows need
    /// explicit content and which rows the ring's edge runs fully cover.
    /// Returns the (left-covered, right-covered) row sets; covered rows count
    /// toward fill only when present in both.
    fn classify_rows(
        &self,
        stripe: &CoordSeq,
        is_hole: bool,
        detail: &mut BTreeSet<i32>,
    ) -> (RangeSet, RangeSet) {
        let mut left = RangeSet::default();
        let mut right = RangeSet::default();
        let left_edge = -self.buffer;
        let right_edge = 1.0 + self.buffer;
        for w in stripe.windows(2) {
            let (a, b) = (w[0], w[1]);
            let (t_lo, t_hi) = self.y_rows(a, b);
            if a.x == b.x && (a.x == left_edge || a.x == right_edge) {
                let on_right = a.x == right_edge;
                let (lo, hi) = if a.y < b.y { (a.y, b.y) } else { (b.y, a.y) };
                // an outer boundary encloses the stripe when traversed down
                // the right edge or up the left; holes run the other way
                let covering = ((b.y > a.y) == on_right) != is_hole;
                if covering {
                    let c_lo = (lo + self.buffer).ceil() as i32;
                    let c_hi = (hi - 1.0 - self.buffer).floor() as i32;
                    if c_lo <= c_hi {
                        if on_right {
                            right.add(c_lo, c_hi);
                        } else {
                            left.add(c_lo, c_hi);
                        }
                    }
                    for row in t_lo..=t_hi {
                        if row < c_lo || row > c_hi {
                            detail.insert(row);
                        }
                    }
                } else {
                    for row in t_lo..=t_hi {
                        detail.insert(row);
                    }
                }
            } else {
                for row in t_lo..=t_hi {
                    detail.insert(row);
                }
            }
        }
        (left, right)
    }

    /// Second Y phase: emit row stripes in original segment order. Edge runs
    /// append only to detail rows (the jump of the fill short-circuit, with
    /// the clipped run serving as synthetic backfill); everything else
    /// appends to every row it touches.
    fn emit_rows(&self, stripe: &CoordSeq, detail: &BTreeSet<i32>) -> SparseVec<CoordSeq> {
        let mut rows: SparseVec<StripeBuf> = SparseVec::new();
        let left_edge = -self.buffer;
        let right_edge = 1.0 + self.buffer;
        for w in stripe.windows(2) {
            let (a, b) = (w[0], w[1]);
            let (t_lo, t_hi) = self.y_rows(a, b);
            if t_lo > t_hi {
                continue;
            }
            if a.x == b.x && (a.x == left_edge || a.x == right_edge) {
                for &row in detail.range(t_lo..=t_hi) {
                    self.append_y(rows.get_or_insert_with(row, StripeBuf::default), a, b, row);
                }
            } else {
                for row in t_lo..=t_hi {
                    self.append_y(rows.get_or_insert_with(row, StripeBuf::default), a, b, row);
                }
            }
        }
        rows.map(|mut buf| {
            buf.close_ring();
            buf.take()
        })
    }

    /// Commit one column of clipped ring rows. A row's group is dropped
    /// entirely when the outer ring is degenerate there, even if holes
    /// survived; degenerate holes are dropped individually.
    fn commit_area(&mut self, col: i32, ring_rows: &[SparseVec<CoordSeq>]) {
        let Some((outer, holes)) = ring_rows.split_first() else {
            return;
        };
        for (row, outer_seq) in outer.iter() {
            if outer_seq.len() < 4 || !self.accept_row(row) {
                continue;
            }
            let mut group: Group = vec![to_pixels(outer_seq)];
            for hole in holes {
                if let Some(seq) = hole.get(row) {
                    if seq.len() >= 4 {
                        group.push(to_pixels(seq));
                    }
                }
            }
            let tile = TileCoord::new(col as u32, row as u32, self.zoom);
            self.out.tile_contents.entry(tile).or_default().push(group);
        }
    }

    // ------------------------------------------------------------------
    // Lines
    // ------------------------------------------------------------------

    fn slice_line_seq(&mut self, seq: &CoordSeq, x_offset: f64, record_overflow: bool) {
        let n = seq.len();
        if n < 2 {
            return;
        }
        let mut cols: SparseVec<LineStripes> = SparseVec::new();
        for i in 0..n - 1 {
            let a = shift(seq[i], x_offset);
            let b = shift(seq[i + 1], x_offset);
            let (lo, hi) = self.x_cols(a, b);
            for col in lo..=hi {
                if !self.accept_col(col, record_overflow) {
                    continue;
                }
                let colf = col as f64;
                let stripes = cols.get_or_insert_with(col, LineStripes::default);
                self.append_x(&mut stripes.cur, a, b, col);
                if b.x < colf - self.buffer || b.x > colf + 1.0 + self.buffer {
                    stripes.flush();
                }
            }
        }

        let mut per_tile: HashMap<TileCoord, Group> = HashMap::new();
        for (col, stripes) in cols.entries.iter_mut() {
            stripes.flush();
            for stripe in &stripes.done {
                self.slice_y_line(*col, stripe, &mut per_tile);
            }
        }
        for (tile, group) in per_tile {
            self.out.tile_contents.entry(tile).or_default().push(group);
        }
    }

    fn slice_y_line(&self, col: i32, stripe: &CoordSeq, per_tile: &mut HashMap<TileCoord, Group>) {
        let n = stripe.len();
        let mut rows: SparseVec<LineStripes> = SparseVec::new();
        for i in 0..n - 1 {
            let (a, b) = (stripe[i], stripe[i + 1]);
            let (lo, hi) = self.y_rows_line(a, b);
            for row in lo..=hi {
                if !self.accept_row(row) {
                    continue;
                }
                let rowf = row as f64;
                let stripes = rows.get_or_insert_with(row, LineStripes::default);
                self.append_y(&mut stripes.cur, a, b, row);
                if b.y < rowf - self.buffer || b.y > rowf + 1.0 + self.buffer {
                    stripes.flush();
                }
            }
        }
        for (row, stripes) in rows.entries.iter_mut() {
            stripes.flush();
            if stripes.done.is_empty() {
                continue;
            }
            let tile = TileCoord::new(col as u32, *row as u32, self.zoom);
            let group = per_tile.entry(tile).or_default();
            for seq in &stripes.done {
                group.push(to_pixels(seq));
            }
        }
    }
}

fn shift(c: Coord<f64>, x_offset: f64) -> Coord<f64> {
    Coord {
        x: c.x + x_offset,
        y: c.y,
    }
}

fn to_pixels(seq: &CoordSeq) -> CoordSeq {
    seq.iter()
        .map(|c| Coord {
            x: c.x * TILE_SIZE_PX,
            y: c.y * TILE_SIZE_PX,
        })
        .collect()
}
