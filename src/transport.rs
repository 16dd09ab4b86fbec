//! Transport seams
//!
//! The core never frames packets or owns sockets; it hands fully-formed
//! outgoing messages to a [`Transport`] and cross-map transfer requests to
//! a [`Directory`]. The session/transport layer implements both.
//!
//! [`RecordingTransport`] and [`RecordingDirectory`] are in-memory
//! implementations for tests and local tooling.

use parking_lot::Mutex;

use crate::aoi::ObjectId;
use crate::motion::{MotionState, MoveOpcode, Position};
use crate::pending::{ChangeKind, ChangePayload};
use crate::session::SessionId;

/// Identifier of a world map served by some shard
pub type MapId = u32;

/// Why the core asked the transport to drop a session
#[derive(Debug, Clone, PartialEq)]
pub enum DisconnectReason {
    /// The client violated the movement protocol
    ProtocolViolation(String),
}

/// Fully-formed outgoing message, ready for the external codec
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// Server-forced kinematic change the client must acknowledge
    ForcedChange {
        change_id: u32,
        kind: ChangeKind,
        payload: ChangePayload,
    },
    /// Accepted motion report relayed to a watcher
    MoveUpdate {
        actor: ObjectId,
        opcode: MoveOpcode,
        state: MotionState,
    },
    /// Objects entering the receiver's area of interest
    SpawnBatch(Vec<ObjectId>),
    /// Objects leaving the receiver's area of interest
    DespawnBatch(Vec<ObjectId>),
}

/// Outgoing side of the session/transport layer
pub trait Transport: Send + Sync {
    /// Queue a message for one session
    fn send(&self, target: SessionId, message: OutboundMessage);

    /// Request that a session be dropped
    fn disconnect(&self, target: SessionId, reason: DisconnectReason);
}

/// Realm directory handling cross-map handoff
///
/// The handshake is one-shot: the core requests a transfer and evicts the
/// session only once the consumer reports the destination accepted.
pub trait Directory: Send + Sync {
    /// Ask the directory to place a session on another map
    fn request_transfer(&self, session: SessionId, map: MapId, position: Position);
}

/// In-memory transport capturing everything the core emits
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(SessionId, OutboundMessage)>>,
    disconnected: Mutex<Vec<(SessionId, DisconnectReason)>>,
}

impl RecordingTransport {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent so far, in order
    pub fn sent(&self) -> Vec<(SessionId, OutboundMessage)> {
        self.sent.lock().clone()
    }

    /// Messages sent to one session, in order
    pub fn sent_to(&self, target: SessionId) -> Vec<OutboundMessage> {
        self.sent
            .lock()
            .iter()
            .filter(|(to, _)| *to == target)
            .map(|(_, message)| message.clone())
            .collect()
    }

    /// Disconnect requests so far, in order
    pub fn disconnected(&self) -> Vec<(SessionId, DisconnectReason)> {
        self.disconnected.lock().clone()
    }

    /// Drop everything recorded so far
    pub fn clear(&self) {
        self.sent.lock().clear();
        self.disconnected.lock().clear();
    }
}

impl Transport for RecordingTransport {
    fn send(&self, target: SessionId, message: OutboundMessage) {
        self.sent.lock().push((target, message));
    }

    fn disconnect(&self, target: SessionId, reason: DisconnectReason) {
        self.disconnected.lock().push((target, reason));
    }
}

/// In-memory directory capturing transfer requests
#[derive(Debug, Default)]
pub struct RecordingDirectory {
    requests: Mutex<Vec<(SessionId, MapId, Position)>>,
}

impl RecordingDirectory {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Transfer requests so far, in order
    pub fn requests(&self) -> Vec<(SessionId, MapId, Position)> {
        self.requests.lock().clone()
    }
}

impl Directory for RecordingDirectory {
    fn request_transfer(&self, session: SessionId, map: MapId, position: Position) {
        self.requests.lock().push((session, map, position));
    }
}
