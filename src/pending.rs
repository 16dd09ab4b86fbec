//! Pending change ledger
//!
//! Server-initiated kinematic changes (forced speed changes, in-map
//! teleports) must be acknowledged by the client before further motion
//! reports are accepted. The ledger is a per-session state machine:
//! `Idle -> AwaitingAck -> Idle` on the normal path, `AwaitingAck ->
//! Faulted` on mismatch or timeout. Faulted is terminal; the session is
//! disconnected.

use std::time::Instant;

use tracing::debug;

use crate::error::AckError;
use crate::motion::{MoveKind, Position};

/// Tolerance when comparing acknowledged f32 payloads against issued ones
const PAYLOAD_EPSILON: f32 = 1e-3;

/// The kind of forced change a client must acknowledge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    SpeedWalk,
    SpeedRun,
    SpeedRunBack,
    SpeedSwim,
    SpeedSwimBack,
    TurnRate,
    SpeedFlight,
    SpeedFlightBack,
    Teleport,
}

impl ChangeKind {
    /// The speed-table slot this change adjusts, if any
    pub fn move_kind(&self) -> Option<MoveKind> {
        match self {
            Self::SpeedWalk => Some(MoveKind::Walk),
            Self::SpeedRun => Some(MoveKind::Run),
            Self::SpeedRunBack => Some(MoveKind::RunBack),
            Self::SpeedSwim => Some(MoveKind::Swim),
            Self::SpeedSwimBack => Some(MoveKind::SwimBack),
            Self::TurnRate => Some(MoveKind::Turn),
            Self::SpeedFlight => Some(MoveKind::Flight),
            Self::SpeedFlightBack => Some(MoveKind::FlightBack),
            Self::Teleport => None,
        }
    }

    /// Static name for log fields and error payloads
    pub fn name(&self) -> &'static str {
        match self {
            Self::SpeedWalk => "SpeedWalk",
            Self::SpeedRun => "SpeedRun",
            Self::SpeedRunBack => "SpeedRunBack",
            Self::SpeedSwim => "SpeedSwim",
            Self::SpeedSwimBack => "SpeedSwimBack",
            Self::TurnRate => "TurnRate",
            Self::SpeedFlight => "SpeedFlight",
            Self::SpeedFlightBack => "SpeedFlightBack",
            Self::Teleport => "Teleport",
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Payload of a forced change
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChangePayload {
    /// New speed in world units per second
    Speed(f32),
    /// Destination transform
    Teleport { position: Position, facing: f32 },
}

/// A server-initiated change awaiting client acknowledgment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingChange {
    /// Change id, monotonically increasing per session
    pub id: u32,
    /// What is being changed
    pub kind: ChangeKind,
    /// Issued payload the ack must echo
    pub payload: ChangePayload,
    /// When the change was issued
    pub issued_at: Instant,
}

impl PendingChange {
    /// Age of this change in milliseconds
    pub fn age_ms(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.issued_at).as_millis() as u64
    }
}

/// Ledger state
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LedgerState {
    /// No change outstanding
    Idle,
    /// One change outstanding
    AwaitingAck(PendingChange),
    /// Protocol violation observed, terminal
    Faulted,
}

/// Per-session ledger of forced changes
///
/// At most one change is outstanding at any time; ids are strictly
/// increasing across the session's lifetime.
#[derive(Debug)]
pub struct PendingChangeLedger {
    state: LedgerState,
    next_id: u32,
}

impl Default for PendingChangeLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingChangeLedger {
    /// Create an idle ledger
    pub fn new() -> Self {
        Self {
            state: LedgerState::Idle,
            next_id: 1,
        }
    }

    /// Current ledger state
    pub fn state(&self) -> LedgerState {
        self.state
    }

    /// The outstanding change, if any
    pub fn outstanding(&self) -> Option<&PendingChange> {
        match &self.state {
            LedgerState::AwaitingAck(change) => Some(change),
            _ => None,
        }
    }

    /// Check if the ledger has observed a violation
    pub fn is_faulted(&self) -> bool {
        matches!(self.state, LedgerState::Faulted)
    }

    /// Issue a new forced change
    ///
    /// Only legal from `Idle`: a second change may not be issued while one
    /// is unacknowledged.
    pub fn issue(
        &mut self,
        kind: ChangeKind,
        payload: ChangePayload,
        now: Instant,
    ) -> Result<PendingChange, AckError> {
        match self.state {
            LedgerState::Idle => {
                let change = PendingChange {
                    id: self.next_id,
                    kind,
                    payload,
                    issued_at: now,
                };
                self.next_id += 1;
                self.state = LedgerState::AwaitingAck(change);
                debug!(change_id = change.id, kind = %kind, "Issued pending change");
                Ok(change)
            }
            LedgerState::AwaitingAck(change) => {
                Err(AckError::AlreadyOutstanding { change_id: change.id })
            }
            LedgerState::Faulted => Err(AckError::Faulted),
        }
    }

    /// Check whether a change has been issued (Idle check for callers)
    pub fn can_issue(&self) -> bool {
        matches!(self.state, LedgerState::Idle)
    }

    /// Check if the outstanding change is older than the lag tolerance
    pub fn has_timed_out(&self, now: Instant, tolerance_ms: u64) -> bool {
        match &self.state {
            LedgerState::AwaitingAck(change) => change.age_ms(now) > tolerance_ms,
            _ => false,
        }
    }

    /// Process a client acknowledgment
    ///
    /// The acknowledged id, the change kind implied by the ack opcode, and
    /// the echoed payload must all match the outstanding change; any single
    /// mismatch faults the ledger. On success the ledger returns to `Idle`
    /// and hands the issued change back for payload application.
    pub fn acknowledge(
        &mut self,
        id: u32,
        kind: ChangeKind,
        payload: Option<f32>,
    ) -> Result<PendingChange, AckError> {
        let change = match self.state {
            LedgerState::AwaitingAck(change) => change,
            LedgerState::Idle => {
                self.state = LedgerState::Faulted;
                return Err(AckError::NothingPending);
            }
            LedgerState::Faulted => return Err(AckError::Faulted),
        };

        if id != change.id {
            self.state = LedgerState::Faulted;
            return Err(AckError::IdMismatch {
                expected: change.id,
                actual: id,
            });
        }

        if kind != change.kind {
            self.state = LedgerState::Faulted;
            return Err(AckError::KindMismatch {
                expected: change.kind.name(),
                actual: kind.name(),
            });
        }

        if let ChangePayload::Speed(issued) = change.payload {
            match payload {
                Some(echoed) if (echoed - issued).abs() <= PAYLOAD_EPSILON => {}
                Some(echoed) => {
                    self.state = LedgerState::Faulted;
                    return Err(AckError::PayloadMismatch {
                        expected: issued,
                        actual: echoed,
                    });
                }
                None => {
                    self.state = LedgerState::Faulted;
                    return Err(AckError::PayloadMismatch {
                        expected: issued,
                        actual: f32::NAN,
                    });
                }
            }
        }

        self.state = LedgerState::Idle;
        debug!(change_id = change.id, kind = %change.kind, "Pending change acknowledged");
        Ok(change)
    }

    /// Declare the outstanding change expired
    ///
    /// Transitions to `Faulted` and returns the timeout error for the
    /// caller to surface as a disconnect.
    pub fn expire(&mut self, now: Instant, tolerance_ms: u64) -> AckError {
        match self.state {
            LedgerState::AwaitingAck(change) => {
                let err = AckError::Timeout {
                    change_id: change.id,
                    elapsed_ms: change.age_ms(now),
                    tolerance_ms,
                };
                self.state = LedgerState::Faulted;
                err
            }
            _ => AckError::NothingPending,
        }
    }
}
