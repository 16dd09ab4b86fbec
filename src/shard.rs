//! Shard context module
//!
//! The orchestrator wiring movement validation, the pending-change ledger
//! and the AOI grid together for one world shard. Owns the session
//! registry, the tile grid and the non-session object index; talks to the
//! outside world only through the [`Transport`] and [`Directory`] seams.
//!
//! A shard processes its messages single-threaded, one session message at
//! a time; a tile transition completes (watcher sets updated, deltas
//! broadcast) before the next message is handled.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::aoi::{AoiGrid, ObjectId, TileCoord};
use crate::config::{DriftPolicy, ShardConfig};
use crate::error::{Result, ShardError};
use crate::motion::validator::ReportContext;
use crate::motion::{validate_report, MotionState, MoveOpcode, MovementFlags, Position};
use crate::pending::{ChangeKind, ChangePayload, PendingChange};
use crate::session::{MovementSession, SessionId, SessionPhase, SessionRegistry};
use crate::transport::{Directory, DisconnectReason, MapId, OutboundMessage, Transport};

/// One world shard's movement-synchronization core
pub struct ShardContext {
    /// Shard configuration
    config: ShardConfig,
    /// All sessions in this shard
    sessions: SessionRegistry,
    /// Spatial partition
    grid: RwLock<AoiGrid>,
    /// Tile of every non-session object
    objects: DashMap<ObjectId, TileCoord>,
    /// Outgoing message sink
    transport: Arc<dyn Transport>,
    /// Cross-map handoff service
    directory: Arc<dyn Directory>,
}

impl ShardContext {
    /// Create a shard context
    pub fn new(
        config: ShardConfig,
        transport: Arc<dyn Transport>,
        directory: Arc<dyn Directory>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| ShardError::Config(e.to_string()))?;

        info!(
            sight_radius = config.sight_radius,
            tile_size = config.tile_size,
            max_sessions = config.max_sessions,
            "Creating shard context"
        );

        let grid = AoiGrid::new(config.tile_size, config.sight_radius);
        let sessions = SessionRegistry::new(config.max_sessions);

        Ok(Self {
            config,
            sessions,
            grid: RwLock::new(grid),
            objects: DashMap::new(),
            transport,
            directory,
        })
    }

    /// Shard configuration
    pub fn config(&self) -> &ShardConfig {
        &self.config
    }

    /// Number of sessions in the shard
    pub fn session_count(&self) -> usize {
        self.sessions.count()
    }

    /// Look up a session
    pub fn session(&self, id: SessionId) -> Option<Arc<MovementSession>> {
        self.sessions.get(id)
    }

    // ---- session lifecycle -------------------------------------------------

    /// Bring a session into the world
    ///
    /// Seeds the session's visibility with every object resident in its
    /// sight square, subscribes it to those tiles, and announces the new
    /// actor to everyone already watching its tile.
    pub fn spawn_session(&self, id: SessionId, position: Position) -> Result<Arc<MovementSession>> {
        let mut grid = self.grid.write();
        let tile = grid.tile_coord_of(&position);

        let session = self
            .sessions
            .register(MovementSession::new(id, MotionState::at(position), tile))?;

        let mut window = Vec::new();
        grid.for_each_in_sight(tile, |coord| window.push(coord));

        let mut visible = Vec::new();
        for coord in window {
            grid.attach_watcher(coord, id);
            visible.extend(
                grid.objects_in(&coord)
                    .into_iter()
                    .filter(|object| *object != session.object_id),
            );
        }

        let observers: Vec<SessionId> = grid
            .watchers_of(&tile)
            .into_iter()
            .filter(|watcher| *watcher != id)
            .collect();
        grid.insert_object(tile, session.object_id);
        drop(grid);

        if !visible.is_empty() {
            self.transport
                .send(id, OutboundMessage::SpawnBatch(visible));
        }
        for observer in observers {
            self.transport
                .send(observer, OutboundMessage::SpawnBatch(vec![session.object_id]));
        }

        session.set_phase(SessionPhase::Active);
        info!(session_id = id, tile = %tile, "Session spawned");
        Ok(session)
    }

    /// Remove a session from the world
    ///
    /// Watcher sets are detached synchronously so no later message can
    /// observe a stale reference.
    pub fn despawn_session(&self, id: SessionId) -> Result<()> {
        let session = self.sessions.require(id)?;
        session.set_phase(SessionPhase::Despawning);

        let tile = session.tile();
        let mut grid = self.grid.write();

        let observers: Vec<SessionId> = grid
            .watchers_of(&tile)
            .into_iter()
            .filter(|watcher| *watcher != id)
            .collect();
        grid.remove_object(&tile, &session.object_id);

        let mut window = Vec::new();
        grid.for_each_in_sight(tile, |coord| window.push(coord));
        for coord in window {
            grid.detach_watcher(&coord, &id);
        }
        drop(grid);

        for observer in observers {
            self.transport.send(
                observer,
                OutboundMessage::DespawnBatch(vec![session.object_id]),
            );
        }

        self.sessions.unregister(id);
        info!(session_id = id, tile = %tile, "Session despawned");
        Ok(())
    }

    /// Disconnect a protocol violator and tear its session down
    fn terminate(&self, id: SessionId, reason: String) {
        warn!(session_id = id, reason = %reason, "Terminating session");
        self.transport
            .disconnect(id, DisconnectReason::ProtocolViolation(reason));
        let _ = self.despawn_session(id);
    }

    // ---- inbound messages --------------------------------------------------

    /// Process one inbound client motion report
    ///
    /// Benign rejections drop the report and return `Ok`; fatal rejections
    /// disconnect the session and surface the violation to the caller.
    pub fn handle_move_report(
        &self,
        id: SessionId,
        opcode: MoveOpcode,
        reported: MotionState,
        now: Instant,
    ) -> Result<()> {
        let session = self.sessions.require(id)?;

        let pending = session.with_ledger(|ledger| {
            ledger
                .outstanding()
                .map(|change| (change.id, change.age_ms(now)))
        });
        let ctx = ReportContext {
            alive: session.is_alive(),
            server_driven: session.is_server_driven(),
            pending,
            ack_tolerance_ms: self.config.ack_timeout_ms,
            drift_tolerance: self.config.drift_tolerance,
            drift_policy: self.config.drift_policy,
        };

        let current = session.motion();
        let adopted = match validate_report(&current, &reported, opcode, &ctx) {
            Ok(adopted) => adopted,
            Err(err) if err.is_fatal() => {
                // An overdue ack faults the ledger before the session goes
                session.with_ledger(|ledger| {
                    if ledger.has_timed_out(now, self.config.ack_timeout_ms) {
                        ledger.expire(now, self.config.ack_timeout_ms);
                    }
                });
                self.terminate(id, err.to_string());
                return Err(ShardError::Movement(err));
            }
            Err(err) => {
                debug!(session_id = id, opcode = %opcode, reason = %err, "Motion report dropped");
                return Ok(());
            }
        };

        session.set_motion(adopted);

        let new_tile = self.grid.read().tile_coord_of(&adopted.position);
        if new_tile != session.tile() {
            self.transition_tile(&session, new_tile);
        }
        self.relay_motion(&session, opcode, &adopted);
        Ok(())
    }

    /// Process one inbound acknowledgment of a forced change
    pub fn handle_ack(
        &self,
        id: SessionId,
        change_id: u32,
        kind: ChangeKind,
        reported: MotionState,
        speed: Option<f32>,
        now: Instant,
    ) -> Result<()> {
        let session = self.sessions.require(id)?;

        let change = match session.with_ledger(|ledger| ledger.acknowledge(change_id, kind, speed))
        {
            Ok(change) => change,
            Err(err) => {
                self.terminate(id, err.to_string());
                return Err(ShardError::Ack(err));
            }
        };

        match change.payload {
            ChangePayload::Speed(speed) => {
                self.apply_speed_ack(&session, &change, speed, &reported)?;
            }
            ChangePayload::Teleport { position, facing } => {
                self.apply_teleport_ack(&session, position, facing, &reported);
            }
        }
        Ok(())
    }

    /// Apply an acknowledged speed change to the session's speed table
    fn apply_speed_ack(
        &self,
        session: &Arc<MovementSession>,
        change: &PendingChange,
        speed: f32,
        reported: &MotionState,
    ) -> Result<()> {
        // The carried state is drift-checked but never adopted: a speed ack
        // must not smuggle an unvalidated position past the validator.
        let distance = session.motion().position.distance(&reported.position);
        if distance > self.config.drift_tolerance {
            match self.config.drift_policy {
                DriftPolicy::Log => {
                    warn!(
                        session_id = session.id,
                        distance = distance,
                        "Speed ack carries a drifting position"
                    );
                }
                DriftPolicy::Enforce => {
                    let err = crate::error::MovementError::PositionDrift {
                        distance,
                        tolerance: self.config.drift_tolerance,
                    };
                    self.terminate(session.id, err.to_string());
                    return Err(ShardError::Movement(err));
                }
            }
        }

        if let Some(kind) = change.kind.move_kind() {
            let rate = session.with_motion(|motion| {
                motion.speeds.set(kind, speed);
                motion.speeds.rate(kind)
            });
            debug!(
                session_id = session.id,
                kind = %change.kind,
                speed = speed,
                rate = rate,
                "Speed change applied"
            );
        }
        Ok(())
    }

    /// Apply an acknowledged in-map teleport
    ///
    /// The post-teleport state must report falling with no horizontal
    /// motion; a violation is logged but the teleport is still honored.
    fn apply_teleport_ack(
        &self,
        session: &Arc<MovementSession>,
        position: Position,
        facing: f32,
        reported: &MotionState,
    ) {
        let falling = reported.flags.contains(MovementFlags::FALLING);
        if !falling || reported.flags.horizontal_motion() {
            warn!(
                session_id = session.id,
                flags = ?reported.flags,
                "Teleport ack carries unexpected movement flags"
            );
        }

        let adopted = session.with_motion(|motion| {
            let speeds = motion.speeds;
            *motion = *reported;
            motion.speeds = speeds;
            motion.position = position;
            motion.facing = facing;
            motion.jump = Default::default();
            *motion
        });

        let new_tile = self.grid.read().tile_coord_of(&position);
        if new_tile != session.tile() {
            self.transition_tile(session, new_tile);
        }
        self.relay_motion(session, MoveOpcode::Heartbeat, &adopted);
        debug!(session_id = session.id, position = %position, "Teleport applied");
    }

    // ---- server-initiated changes ------------------------------------------

    /// Force a new speed for one movement type
    ///
    /// The client must acknowledge before its next motion report is
    /// accepted; the new speed takes effect on acknowledgment.
    pub fn force_speed(
        &self,
        id: SessionId,
        kind: ChangeKind,
        speed: f32,
        now: Instant,
    ) -> Result<PendingChange> {
        if kind.move_kind().is_none() {
            return Err(ShardError::Internal(format!(
                "{kind} is not a speed change kind"
            )));
        }
        let session = self.sessions.require(id)?;

        let change = session
            .with_ledger(|ledger| ledger.issue(kind, ChangePayload::Speed(speed), now))
            .map_err(ShardError::Ack)?;

        self.transport.send(
            id,
            OutboundMessage::ForcedChange {
                change_id: change.id,
                kind,
                payload: change.payload,
            },
        );
        info!(session_id = id, kind = %kind, speed = speed, "Forced speed change issued");
        Ok(change)
    }

    /// Teleport a session within this map
    pub fn teleport(
        &self,
        id: SessionId,
        position: Position,
        facing: f32,
        now: Instant,
    ) -> Result<PendingChange> {
        let session = self.sessions.require(id)?;

        let change = session
            .with_ledger(|ledger| {
                ledger.issue(
                    ChangeKind::Teleport,
                    ChangePayload::Teleport { position, facing },
                    now,
                )
            })
            .map_err(ShardError::Ack)?;

        self.transport.send(
            id,
            OutboundMessage::ForcedChange {
                change_id: change.id,
                kind: ChangeKind::Teleport,
                payload: change.payload,
            },
        );
        info!(session_id = id, destination = %position, "Teleport issued");
        Ok(change)
    }

    // ---- cross-map handoff -------------------------------------------------

    /// Ask the directory to move a session to another map
    ///
    /// No pending-change bookkeeping: the session stays fully in this
    /// shard until the destination accepts.
    pub fn request_map_transfer(&self, id: SessionId, map: MapId, position: Position) -> Result<()> {
        let session = self.sessions.require(id)?;
        session.begin_transfer()?;

        self.directory.request_transfer(id, map, position);
        info!(session_id = id, map = map, "Map transfer requested");
        Ok(())
    }

    /// Complete a cross-map handoff
    ///
    /// On acceptance the session is evicted from this shard (watcher sets
    /// detached, despawn announced); on refusal it simply stays.
    pub fn finish_map_transfer(&self, id: SessionId, accepted: bool) -> Result<()> {
        let session = self.sessions.require(id)?;
        if !session.is_transfer_pending() {
            return Err(ShardError::Internal(format!(
                "no transfer in flight for session {id}"
            )));
        }

        if accepted {
            info!(session_id = id, "Map transfer accepted, evicting session");
            self.despawn_session(id)
        } else {
            info!(session_id = id, "Map transfer refused");
            session.cancel_transfer();
            Ok(())
        }
    }

    // ---- non-session objects -----------------------------------------------

    /// Place a non-session object in the world
    pub fn spawn_object(&self, object: ObjectId, position: Position) -> Result<()> {
        if self.objects.contains_key(&object) {
            return Err(ShardError::Internal(format!(
                "object {object} already spawned"
            )));
        }

        let mut grid = self.grid.write();
        let tile = grid.tile_coord_of(&position);
        grid.insert_object(tile, object);
        let watchers = grid.watchers_of(&tile);
        drop(grid);

        self.objects.insert(object, tile);
        for watcher in watchers {
            self.transport
                .send(watcher, OutboundMessage::SpawnBatch(vec![object]));
        }
        debug!(object = %object, tile = %tile, "Object spawned");
        Ok(())
    }

    /// Move a non-session object
    ///
    /// Watchers of the old tile that cannot see the new one get a despawn,
    /// watchers of the new tile that could not see the old one get a spawn.
    pub fn move_object(&self, object: ObjectId, position: Position) -> Result<()> {
        let old_tile = *self
            .objects
            .get(&object)
            .ok_or_else(|| ShardError::Internal(format!("object {object} not spawned")))?;

        let mut grid = self.grid.write();
        let new_tile = grid.tile_coord_of(&position);
        if new_tile == old_tile {
            return Ok(());
        }

        let before = grid.watchers_of(&old_tile);
        let after = grid.watchers_of(&new_tile);
        grid.remove_object(&old_tile, &object);
        grid.insert_object(new_tile, object);
        drop(grid);

        self.objects.insert(object, new_tile);
        for watcher in before.iter().filter(|w| !after.contains(w)) {
            self.transport
                .send(*watcher, OutboundMessage::DespawnBatch(vec![object]));
        }
        for watcher in after.iter().filter(|w| !before.contains(w)) {
            self.transport
                .send(*watcher, OutboundMessage::SpawnBatch(vec![object]));
        }
        Ok(())
    }

    /// Remove a non-session object from the world
    pub fn despawn_object(&self, object: ObjectId) -> Result<()> {
        let (_, tile) = self
            .objects
            .remove(&object)
            .ok_or_else(|| ShardError::Internal(format!("object {object} not spawned")))?;

        let mut grid = self.grid.write();
        grid.remove_object(&tile, &object);
        let watchers = grid.watchers_of(&tile);
        drop(grid);

        for watcher in watchers {
            self.transport
                .send(watcher, OutboundMessage::DespawnBatch(vec![object]));
        }
        debug!(object = %object, tile = %tile, "Object despawned");
        Ok(())
    }

    // ---- AOI internals -----------------------------------------------------

    /// Relay an accepted motion state to everyone watching the actor's tile
    fn relay_motion(&self, session: &Arc<MovementSession>, opcode: MoveOpcode, state: &MotionState) {
        let watchers = self.grid.read().watchers_of(&session.tile());
        for watcher in watchers {
            if watcher == session.id {
                continue;
            }
            self.transport.send(
                watcher,
                OutboundMessage::MoveUpdate {
                    actor: session.object_id,
                    opcode,
                    state: *state,
                },
            );
        }
    }

    /// Move a session across a tile border
    ///
    /// Detaches the mover from tiles leaving its sight (batching despawns
    /// of their residents back to it), attaches it to tiles entering sight
    /// (batching spawns), and announces the mover itself to observers
    /// gaining or losing it. The enter and leave tile sets are disjoint,
    /// so no observer is ever double-notified in one transition.
    fn transition_tile(&self, session: &Arc<MovementSession>, new_tile: TileCoord) {
        let old_tile = session.tile();
        let id = session.id;

        let mut grid = self.grid.write();

        let before = grid.watchers_of(&old_tile);
        let after = grid.watchers_of(&new_tile);

        grid.remove_object(&old_tile, &session.object_id);
        grid.insert_object(new_tile, session.object_id);

        let mut leaving_tiles = Vec::new();
        grid.for_each_in_sight_without(old_tile, new_tile, |coord| leaving_tiles.push(coord));
        let mut entering_tiles = Vec::new();
        grid.for_each_in_sight_without(new_tile, old_tile, |coord| entering_tiles.push(coord));

        let mut lost = Vec::new();
        for coord in leaving_tiles {
            grid.detach_watcher(&coord, &id);
            lost.extend(
                grid.objects_in(&coord)
                    .into_iter()
                    .filter(|object| *object != session.object_id),
            );
        }
        let mut gained = Vec::new();
        for coord in entering_tiles {
            grid.attach_watcher(coord, id);
            gained.extend(
                grid.objects_in(&coord)
                    .into_iter()
                    .filter(|object| *object != session.object_id),
            );
        }
        drop(grid);

        session.set_tile(new_tile);

        if !lost.is_empty() {
            self.transport.send(id, OutboundMessage::DespawnBatch(lost));
        }
        if !gained.is_empty() {
            self.transport.send(id, OutboundMessage::SpawnBatch(gained));
        }

        for observer in before.iter().filter(|w| **w != id && !after.contains(w)) {
            self.transport.send(
                *observer,
                OutboundMessage::DespawnBatch(vec![session.object_id]),
            );
        }
        for observer in after.iter().filter(|w| **w != id && !before.contains(w)) {
            self.transport.send(
                *observer,
                OutboundMessage::SpawnBatch(vec![session.object_id]),
            );
        }

        debug!(
            session_id = id,
            old_tile = %old_tile,
            new_tile = %new_tile,
            "Tile transition"
        );
    }
}

impl std::fmt::Debug for ShardContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardContext")
            .field("sessions", &self.sessions.count())
            .field("objects", &self.objects.len())
            .field("tiles", &self.grid.read().tile_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{RecordingDirectory, RecordingTransport};

    fn shard() -> (Arc<RecordingTransport>, Arc<RecordingDirectory>, ShardContext) {
        let transport = Arc::new(RecordingTransport::new());
        let directory = Arc::new(RecordingDirectory::new());
        let config = ShardConfig {
            tile_size: 10.0,
            sight_radius: 2,
            ..Default::default()
        };
        let shard = ShardContext::new(config, transport.clone(), directory.clone()).unwrap();
        (transport, directory, shard)
    }

    #[test]
    fn test_spawn_seeds_visibility() {
        let (transport, _, shard) = shard();

        shard.spawn_session(1, Position::new(5.0, 5.0, 0.0)).unwrap();
        // Nothing else in the world yet
        assert!(transport.sent_to(1).is_empty());

        shard.spawn_session(2, Position::new(15.0, 5.0, 0.0)).unwrap();
        // The newcomer sees session 1, session 1 sees the newcomer
        assert_eq!(
            transport.sent_to(2),
            vec![OutboundMessage::SpawnBatch(vec![ObjectId(1)])]
        );
        assert_eq!(
            transport.sent_to(1),
            vec![OutboundMessage::SpawnBatch(vec![ObjectId(2)])]
        );
    }

    #[test]
    fn test_spawn_out_of_sight_is_silent() {
        let (transport, _, shard) = shard();
        shard.spawn_session(1, Position::new(5.0, 5.0, 0.0)).unwrap();
        shard
            .spawn_session(2, Position::new(500.0, 500.0, 0.0))
            .unwrap();
        assert!(transport.sent_to(1).is_empty());
        assert!(transport.sent_to(2).is_empty());
    }

    #[test]
    fn test_despawn_announces_to_observers() {
        let (transport, _, shard) = shard();
        shard.spawn_session(1, Position::new(5.0, 5.0, 0.0)).unwrap();
        shard.spawn_session(2, Position::new(15.0, 5.0, 0.0)).unwrap();
        transport.clear();

        shard.despawn_session(2).unwrap();
        assert_eq!(
            transport.sent_to(1),
            vec![OutboundMessage::DespawnBatch(vec![ObjectId(2)])]
        );
        assert_eq!(shard.session_count(), 1);
    }

    #[test]
    fn test_move_report_relays_to_watchers() {
        let (transport, _, shard) = shard();
        shard.spawn_session(1, Position::new(5.0, 5.0, 0.0)).unwrap();
        shard.spawn_session(2, Position::new(15.0, 5.0, 0.0)).unwrap();
        transport.clear();

        let mut reported = MotionState::at(Position::new(6.0, 5.0, 0.0));
        reported.flags = MovementFlags::FORWARD;
        shard
            .handle_move_report(1, MoveOpcode::StartForward, reported, Instant::now())
            .unwrap();

        let to_watcher = transport.sent_to(2);
        assert_eq!(to_watcher.len(), 1);
        assert!(matches!(
            to_watcher[0],
            OutboundMessage::MoveUpdate {
                actor: ObjectId(1),
                opcode: MoveOpcode::StartForward,
                ..
            }
        ));
        // The acting session never hears its own report
        assert!(transport.sent_to(1).is_empty());
    }

    #[test]
    fn test_benign_rejection_keeps_session() {
        let (transport, _, shard) = shard();
        shard.spawn_session(1, Position::new(5.0, 5.0, 0.0)).unwrap();
        transport.clear();

        // Stop while not moving: dropped, no disconnect
        let reported = MotionState::at(Position::new(5.0, 5.0, 0.0));
        shard
            .handle_move_report(1, MoveOpcode::Stop, reported, Instant::now())
            .unwrap();
        assert!(transport.disconnected().is_empty());
        assert_eq!(shard.session_count(), 1);
    }

    #[test]
    fn test_fatal_rejection_disconnects() {
        let (transport, _, shard) = shard();
        shard.spawn_session(1, Position::new(5.0, 5.0, 0.0)).unwrap();

        let mut reported = MotionState::at(Position::new(5.0, 5.0, 0.0));
        reported.flags = MovementFlags::FORWARD | MovementFlags::FALLING;
        let err = shard
            .handle_move_report(1, MoveOpcode::StartForward, reported, Instant::now())
            .unwrap_err();
        assert!(matches!(err, ShardError::Movement(_)));

        assert_eq!(transport.disconnected().len(), 1);
        assert_eq!(shard.session_count(), 0);
    }

    #[test]
    fn test_force_speed_emits_and_gates() {
        let (transport, _, shard) = shard();
        shard.spawn_session(1, Position::new(5.0, 5.0, 0.0)).unwrap();
        transport.clear();

        let now = Instant::now();
        let change = shard
            .force_speed(1, ChangeKind::SpeedRun, 9.1, now)
            .unwrap();
        assert_eq!(
            transport.sent_to(1),
            vec![OutboundMessage::ForcedChange {
                change_id: change.id,
                kind: ChangeKind::SpeedRun,
                payload: ChangePayload::Speed(9.1),
            }]
        );

        // Motion reports are gated until the ack arrives
        let mut reported = MotionState::at(Position::new(6.0, 5.0, 0.0));
        reported.flags = MovementFlags::FORWARD;
        shard
            .handle_move_report(1, MoveOpcode::StartForward, reported, now)
            .unwrap();
        let session = shard.session(1).unwrap();
        assert!(!session.motion().flags.contains(MovementFlags::FORWARD));
    }

    #[test]
    fn test_speed_ack_applies_multiplier() {
        let (_, _, shard) = shard();
        shard.spawn_session(1, Position::new(5.0, 5.0, 0.0)).unwrap();

        let now = Instant::now();
        let change = shard
            .force_speed(1, ChangeKind::SpeedRun, 14.0, now)
            .unwrap();
        shard
            .handle_ack(
                1,
                change.id,
                ChangeKind::SpeedRun,
                MotionState::at(Position::new(5.0, 5.0, 0.0)),
                Some(14.0),
                now,
            )
            .unwrap();

        let session = shard.session(1).unwrap();
        assert!((session.motion().speeds.rate(crate::motion::MoveKind::Run) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_force_speed_rejects_teleport_kind() {
        let (_, _, shard) = shard();
        shard.spawn_session(1, Position::new(5.0, 5.0, 0.0)).unwrap();
        assert!(shard
            .force_speed(1, ChangeKind::Teleport, 1.0, Instant::now())
            .is_err());
    }

    #[test]
    fn test_map_transfer_handshake() {
        let (_, directory, shard) = shard();
        shard.spawn_session(1, Position::new(5.0, 5.0, 0.0)).unwrap();

        shard
            .request_map_transfer(1, 13, Position::new(0.0, 0.0, 0.0))
            .unwrap();
        assert_eq!(directory.requests().len(), 1);
        // Still present until the destination accepts
        assert_eq!(shard.session_count(), 1);

        shard.finish_map_transfer(1, true).unwrap();
        assert_eq!(shard.session_count(), 0);
    }

    #[test]
    fn test_map_transfer_refused_keeps_session() {
        let (_, _, shard) = shard();
        shard.spawn_session(1, Position::new(5.0, 5.0, 0.0)).unwrap();

        shard
            .request_map_transfer(1, 13, Position::new(0.0, 0.0, 0.0))
            .unwrap();
        shard.finish_map_transfer(1, false).unwrap();
        assert_eq!(shard.session_count(), 1);

        // A new transfer may start after a refusal
        assert!(shard
            .request_map_transfer(1, 14, Position::new(0.0, 0.0, 0.0))
            .is_ok());
    }

    #[test]
    fn test_object_lifecycle_notifies_watchers() {
        let (transport, _, shard) = shard();
        shard.spawn_session(1, Position::new(5.0, 5.0, 0.0)).unwrap();
        transport.clear();

        shard
            .spawn_object(ObjectId(100), Position::new(15.0, 5.0, 0.0))
            .unwrap();
        assert_eq!(
            transport.sent_to(1),
            vec![OutboundMessage::SpawnBatch(vec![ObjectId(100)])]
        );
        transport.clear();

        // Moving within sight produces no messages for this watcher
        shard
            .move_object(ObjectId(100), Position::new(25.0, 5.0, 0.0))
            .unwrap();
        assert!(transport.sent_to(1).is_empty());

        // Moving out of sight despawns it
        shard
            .move_object(ObjectId(100), Position::new(500.0, 5.0, 0.0))
            .unwrap();
        assert_eq!(
            transport.sent_to(1),
            vec![OutboundMessage::DespawnBatch(vec![ObjectId(100)])]
        );
    }
}
