//! Visibility deltas
//!
//! Sight-square iteration and the boundary-only delta used when a session
//! crosses a tile border. Given an old and a new center, the tiles leaving
//! sight are `in_sight_without(old, new)` and the tiles entering sight are
//! `in_sight_without(new, old)`; the two sets are disjoint by construction
//! and their union is the symmetric difference of the two sight squares.
//! Cost is proportional to the boundary region, not the full window, which
//! keeps frequent tile crossings cheap.

use super::grid::{AoiGrid, TileCoord};

impl AoiGrid {
    /// Visit every tile in the sight square centered on `center`
    ///
    /// Visits the full `(2r+1)^2` window. Used to seed visibility on spawn
    /// and for full resyncs.
    pub fn for_each_in_sight<F>(&self, center: TileCoord, mut f: F)
    where
        F: FnMut(TileCoord),
    {
        let r = self.sight_radius();
        for ix in (center.ix - r)..=(center.ix + r) {
            for iy in (center.iy - r)..=(center.iy + r) {
                f(TileCoord::new(ix, iy));
            }
        }
    }

    /// Visit every tile in sight of `center` but not in sight of `exclude`
    ///
    /// The core AOI delta: called with (old, new) it yields the tiles about
    /// to leave sight, called with (new, old) the tiles about to enter it.
    pub fn for_each_in_sight_without<F>(&self, center: TileCoord, exclude: TileCoord, mut f: F)
    where
        F: FnMut(TileCoord),
    {
        let r = self.sight_radius();
        for ix in (center.ix - r)..=(center.ix + r) {
            for iy in (center.iy - r)..=(center.iy + r) {
                let coord = TileCoord::new(ix, iy);
                if !self.in_sight(&exclude, &coord) {
                    f(coord);
                }
            }
        }
    }
}
