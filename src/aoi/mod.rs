//! Area-of-interest module
//!
//! Tile-based spatial partition of the world plane and the incremental
//! visibility delta algorithm:
//! - Sparse tile arena with per-tile object and watcher sets
//! - Sight-square iteration and boundary-only enter/leave deltas

pub mod grid;
pub mod transition;

pub use grid::{AoiGrid, ObjectId, Tile, TileCoord};
