//! Movement session module
//!
//! A movement session is the per-connection owner of kinematic authority:
//! one motion state, one pending-change ledger, and one current tile. The
//! registry tracks all sessions in the shard and enforces capacity.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::aoi::{ObjectId, TileCoord};
use crate::error::{Result, SessionError, ShardError};
use crate::motion::MotionState;
use crate::pending::PendingChangeLedger;

/// Session identifier assigned by the transport layer
pub type SessionId = u64;

/// Lifecycle phase of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Entering the world, visibility not yet seeded
    Spawning,
    /// Fully in the world
    Active,
    /// Leaving the world, watcher sets being detached
    Despawning,
}

/// One session's movement-synchronization state
pub struct MovementSession {
    /// Session identifier
    pub id: SessionId,
    /// World object identifier of this session's actor
    pub object_id: ObjectId,
    /// Authoritative kinematic state
    motion: RwLock<MotionState>,
    /// Forced changes awaiting acknowledgment
    ledger: Mutex<PendingChangeLedger>,
    /// Tile the actor currently occupies
    tile: RwLock<TileCoord>,
    /// Lifecycle phase
    phase: RwLock<SessionPhase>,
    /// Whether the actor is alive
    alive: AtomicBool,
    /// Whether the actor is under scripted or forced movement
    server_driven: AtomicBool,
    /// Whether a cross-map transfer is in flight
    transfer_pending: AtomicBool,
}

impl MovementSession {
    /// Create a session entering the world at the given state and tile
    pub fn new(id: SessionId, motion: MotionState, tile: TileCoord) -> Self {
        Self {
            id,
            object_id: ObjectId(id),
            motion: RwLock::new(motion),
            ledger: Mutex::new(PendingChangeLedger::new()),
            tile: RwLock::new(tile),
            phase: RwLock::new(SessionPhase::Spawning),
            alive: AtomicBool::new(true),
            server_driven: AtomicBool::new(false),
            transfer_pending: AtomicBool::new(false),
        }
    }

    /// Snapshot of the authoritative motion state
    pub fn motion(&self) -> MotionState {
        *self.motion.read()
    }

    /// Replace the authoritative motion state
    pub fn set_motion(&self, state: MotionState) {
        *self.motion.write() = state;
    }

    /// Mutate the authoritative motion state in place
    pub fn with_motion<R>(&self, f: impl FnOnce(&mut MotionState) -> R) -> R {
        f(&mut self.motion.write())
    }

    /// Run a closure against the pending-change ledger
    pub fn with_ledger<R>(&self, f: impl FnOnce(&mut PendingChangeLedger) -> R) -> R {
        f(&mut self.ledger.lock())
    }

    /// Current tile coordinate
    pub fn tile(&self) -> TileCoord {
        *self.tile.read()
    }

    /// Record a tile change
    pub fn set_tile(&self, tile: TileCoord) {
        *self.tile.write() = tile;
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> SessionPhase {
        *self.phase.read()
    }

    /// Advance the lifecycle phase
    pub fn set_phase(&self, phase: SessionPhase) {
        let mut current = self.phase.write();
        debug!(
            session_id = self.id,
            old_phase = ?*current,
            new_phase = ?phase,
            "Session phase changed"
        );
        *current = phase;
    }

    /// Check if the actor is alive
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Set the actor's liveness
    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    /// Check if the actor is under server-driven movement
    pub fn is_server_driven(&self) -> bool {
        self.server_driven.load(Ordering::SeqCst)
    }

    /// Mark the actor as under (or released from) server-driven movement
    pub fn set_server_driven(&self, driven: bool) {
        self.server_driven.store(driven, Ordering::SeqCst);
    }

    /// Check if a cross-map transfer is in flight
    pub fn is_transfer_pending(&self) -> bool {
        self.transfer_pending.load(Ordering::SeqCst)
    }

    /// Mark a cross-map transfer as started, failing if one already is
    pub fn begin_transfer(&self) -> Result<()> {
        if self.transfer_pending.swap(true, Ordering::SeqCst) {
            return Err(ShardError::Session(SessionError::TransferInFlight(self.id)));
        }
        Ok(())
    }

    /// Clear the transfer-in-flight marker (destination refused)
    pub fn cancel_transfer(&self) {
        self.transfer_pending.store(false, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for MovementSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MovementSession")
            .field("id", &self.id)
            .field("object_id", &self.object_id)
            .field("tile", &self.tile())
            .field("phase", &self.phase())
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Session registry - handles session lifecycle and lookup
pub struct SessionRegistry {
    /// Map of session id to session
    sessions: DashMap<SessionId, Arc<MovementSession>>,
    /// Maximum session count
    capacity: usize,
}

impl SessionRegistry {
    /// Create a new registry
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            capacity,
        }
    }

    /// Register a session
    pub fn register(&self, session: MovementSession) -> Result<Arc<MovementSession>> {
        if self.sessions.len() >= self.capacity {
            return Err(ShardError::Session(SessionError::ShardFull {
                count: self.sessions.len(),
                capacity: self.capacity,
            }));
        }
        if self.sessions.contains_key(&session.id) {
            return Err(ShardError::Session(SessionError::AlreadyRegistered(
                session.id,
            )));
        }

        let id = session.id;
        let session = Arc::new(session);
        self.sessions.insert(id, session.clone());

        info!(session_id = id, "Session registered");
        Ok(session)
    }

    /// Unregister a session
    pub fn unregister(&self, id: SessionId) -> Option<Arc<MovementSession>> {
        let removed = self.sessions.remove(&id).map(|(_, session)| session);
        if removed.is_some() {
            info!(session_id = id, "Session unregistered");
        }
        removed
    }

    /// Get a session by id
    pub fn get(&self, id: SessionId) -> Option<Arc<MovementSession>> {
        self.sessions.get(&id).map(|r| r.clone())
    }

    /// Get a session by id, or a not-found error
    pub fn require(&self, id: SessionId) -> Result<Arc<MovementSession>> {
        self.get(id)
            .ok_or(ShardError::Session(SessionError::NotFound(id)))
    }

    /// Number of registered sessions
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Check if the shard is at capacity
    pub fn is_full(&self) -> bool {
        self.count() >= self.capacity
    }

    /// Iterate over all sessions
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&MovementSession),
    {
        for entry in self.sessions.iter() {
            f(&entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::Position;

    fn session(id: SessionId) -> MovementSession {
        MovementSession::new(
            id,
            MotionState::at(Position::new(0.0, 0.0, 0.0)),
            TileCoord::new(0, 0),
        )
    }

    #[test]
    fn test_session_creation() {
        let s = session(7);
        assert_eq!(s.id, 7);
        assert_eq!(s.object_id, ObjectId(7));
        assert_eq!(s.phase(), SessionPhase::Spawning);
        assert!(s.is_alive());
        assert!(!s.is_server_driven());
    }

    #[test]
    fn test_session_phase_transitions() {
        let s = session(1);
        s.set_phase(SessionPhase::Active);
        assert_eq!(s.phase(), SessionPhase::Active);
        s.set_phase(SessionPhase::Despawning);
        assert_eq!(s.phase(), SessionPhase::Despawning);
    }

    #[test]
    fn test_transfer_marker() {
        let s = session(1);
        assert!(!s.is_transfer_pending());
        s.begin_transfer().unwrap();
        assert!(s.is_transfer_pending());
        // A second transfer may not start while one is in flight
        assert!(s.begin_transfer().is_err());
        s.cancel_transfer();
        assert!(s.begin_transfer().is_ok());
    }

    #[test]
    fn test_registry_register_and_lookup() {
        let registry = SessionRegistry::new(10);
        assert_eq!(registry.count(), 0);

        registry.register(session(1)).unwrap();
        assert_eq!(registry.count(), 1);
        assert!(registry.get(1).is_some());
        assert!(registry.require(2).is_err());

        registry.unregister(1).unwrap();
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_registry_duplicate() {
        let registry = SessionRegistry::new(10);
        registry.register(session(1)).unwrap();
        assert!(registry.register(session(1)).is_err());
    }

    #[test]
    fn test_registry_capacity() {
        let registry = SessionRegistry::new(2);
        registry.register(session(1)).unwrap();
        registry.register(session(2)).unwrap();
        assert!(registry.is_full());

        let err = registry.register(session(3)).unwrap_err();
        assert!(matches!(
            err,
            ShardError::Session(SessionError::ShardFull { .. })
        ));

        registry.unregister(1);
        assert!(registry.register(session(3)).is_ok());
    }
}
