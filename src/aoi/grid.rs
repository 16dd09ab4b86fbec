//! Tile grid
//!
//! Fixed-size tile partition of the world plane. Each tile owns the set of
//! objects physically inside it and the set of watchers (sessions whose
//! area of interest currently includes it). Tiles are created lazily and
//! never destroyed; an empty tile is harmless, not a leak.
//!
//! Tiles live in an arena (`Vec<Tile>`) addressed through a sparse
//! coordinate index, so membership updates never chase pointers.

use std::collections::{HashMap, HashSet};

use tracing::trace;

use crate::motion::Position;
use crate::session::SessionId;

/// Identifier of a world object resident in the grid
///
/// Sessions are objects too; their object id is derived from the actor id
/// the session layer assigns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Grid coordinate of a tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    /// Tile column
    pub ix: i32,
    /// Tile row
    pub iy: i32,
}

impl TileCoord {
    /// Create a tile coordinate
    pub fn new(ix: i32, iy: i32) -> Self {
        Self { ix, iy }
    }

    /// Chebyshev distance to another tile
    pub fn chebyshev(&self, other: &TileCoord) -> i32 {
        (self.ix - other.ix).abs().max((self.iy - other.iy).abs())
    }
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.ix, self.iy)
    }
}

/// One cell of the spatial partition
#[derive(Debug, Default)]
pub struct Tile {
    /// Objects physically inside this tile
    objects: HashSet<ObjectId>,
    /// Sessions whose sight square includes this tile
    watchers: HashSet<SessionId>,
}

impl Tile {
    /// Objects resident in this tile
    pub fn objects(&self) -> &HashSet<ObjectId> {
        &self.objects
    }

    /// Sessions watching this tile
    pub fn watchers(&self) -> &HashSet<SessionId> {
        &self.watchers
    }
}

/// Sparse tile partition of the world plane
#[derive(Debug)]
pub struct AoiGrid {
    /// Tile edge length in world units
    tile_size: f32,
    /// Square sight radius in tiles
    sight_radius: i32,
    /// Coordinate to arena slot
    index: HashMap<TileCoord, usize>,
    /// Tile arena
    tiles: Vec<Tile>,
}

impl AoiGrid {
    /// Create an empty grid
    pub fn new(tile_size: f32, sight_radius: i32) -> Self {
        Self {
            tile_size,
            sight_radius,
            index: HashMap::new(),
            tiles: Vec::new(),
        }
    }

    /// Square sight radius in tiles
    pub fn sight_radius(&self) -> i32 {
        self.sight_radius
    }

    /// Number of tiles materialized so far
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// The tile coordinate containing a world position
    pub fn tile_coord_of(&self, position: &Position) -> TileCoord {
        TileCoord {
            ix: (position.x / self.tile_size).floor() as i32,
            iy: (position.y / self.tile_size).floor() as i32,
        }
    }

    /// Check if tile `b` lies within the sight square centered on `a`
    pub fn in_sight(&self, a: &TileCoord, b: &TileCoord) -> bool {
        a.chebyshev(b) <= self.sight_radius
    }

    /// Arena slot for a coordinate, creating the tile lazily
    pub fn require_tile(&mut self, coord: TileCoord) -> usize {
        if let Some(&slot) = self.index.get(&coord) {
            return slot;
        }
        let slot = self.tiles.len();
        self.tiles.push(Tile::default());
        self.index.insert(coord, slot);
        trace!(tile = %coord, slot = slot, "Materialized tile");
        slot
    }

    /// The tile at a coordinate, if it has been materialized
    pub fn tile(&self, coord: &TileCoord) -> Option<&Tile> {
        self.index.get(coord).map(|&slot| &self.tiles[slot])
    }

    /// Place an object in a tile
    pub fn insert_object(&mut self, coord: TileCoord, object: ObjectId) {
        let slot = self.require_tile(coord);
        self.tiles[slot].objects.insert(object);
    }

    /// Remove an object from a tile
    pub fn remove_object(&mut self, coord: &TileCoord, object: &ObjectId) -> bool {
        match self.index.get(coord) {
            Some(&slot) => self.tiles[slot].objects.remove(object),
            None => false,
        }
    }

    /// Subscribe a session to a tile's events
    pub fn attach_watcher(&mut self, coord: TileCoord, session: SessionId) {
        let slot = self.require_tile(coord);
        self.tiles[slot].watchers.insert(session);
    }

    /// Unsubscribe a session from a tile's events
    pub fn detach_watcher(&mut self, coord: &TileCoord, session: &SessionId) -> bool {
        match self.index.get(coord) {
            Some(&slot) => self.tiles[slot].watchers.remove(session),
            None => false,
        }
    }

    /// Snapshot of the sessions watching a tile
    pub fn watchers_of(&self, coord: &TileCoord) -> Vec<SessionId> {
        self.tile(coord)
            .map(|tile| tile.watchers.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Snapshot of the objects resident in a tile
    pub fn objects_in(&self, coord: &TileCoord) -> Vec<ObjectId> {
        self.tile(coord)
            .map(|tile| tile.objects.iter().copied().collect())
            .unwrap_or_default()
    }
}
