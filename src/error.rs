//! Error handling module
//!
//! Defines the error types for the shardsync core and the rejection
//! severity taxonomy: benign rejections drop the offending report and the
//! session continues, fatal rejections are protocol violations that
//! terminate the session.

use thiserror::Error;

/// Main error type for the shardsync core
#[derive(Error, Debug)]
pub enum ShardError {
    /// Movement report rejections
    #[error("Movement error: {0}")]
    Movement(#[from] MovementError),

    /// Pending-change acknowledgment errors
    #[error("Ack error: {0}")]
    Ack(#[from] AckError),

    /// Session lifecycle errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Rejection severity
///
/// Benign rejections are expected noise (stale reports from a dead actor,
/// redundant transitions from a desynchronized client) and are silently
/// dropped. Fatal rejections are protocol violations and disconnect the
/// session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Drop the report, keep the session
    Benign,
    /// Disconnect the session
    Fatal,
}

/// Movement report rejections
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MovementError {
    #[error("Actor is dead and the report implies motion")]
    ActorDead,

    #[error("Actor is under server-driven movement")]
    ServerDriven,

    #[error("Motion report received while change {change_id} awaits acknowledgment")]
    AckOutstanding { change_id: u32 },

    #[error("Change {change_id} unacknowledged for {elapsed_ms}ms (tolerance {tolerance_ms}ms)")]
    AckOverdue {
        change_id: u32,
        elapsed_ms: u64,
        tolerance_ms: u64,
    },

    #[error("Redundant transition: {opcode} while flags are {flags:#x}")]
    RedundantTransition { opcode: &'static str, flags: u32 },

    #[error("Falling flag set by {opcode}, only a jump may start a fall")]
    FallingForged { opcode: &'static str },

    #[error("Falling flag cleared by {opcode}, only landing may end a fall")]
    LandingForged { opcode: &'static str },

    #[error("Reported position drifts {distance:.1} from authoritative (tolerance {tolerance:.1})")]
    PositionDrift { distance: f32, tolerance: f32 },
}

impl MovementError {
    /// Classify this rejection per the error taxonomy
    pub fn severity(&self) -> Severity {
        match self {
            Self::ActorDead
            | Self::ServerDriven
            | Self::AckOutstanding { .. }
            | Self::RedundantTransition { .. } => Severity::Benign,
            Self::AckOverdue { .. }
            | Self::FallingForged { .. }
            | Self::LandingForged { .. }
            | Self::PositionDrift { .. } => Severity::Fatal,
        }
    }

    /// Check if this rejection terminates the session
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

/// Pending-change acknowledgment errors
///
/// Client-originated variants are all fatal: a client that misacknowledges
/// a forced change is either desynchronized beyond repair or forging
/// packets. The exception is `AlreadyOutstanding`, which refuses a
/// server-side `issue` call, not a client packet.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AckError {
    #[error("Acknowledgment with no change outstanding")]
    NothingPending,

    #[error("Change {change_id} already outstanding")]
    AlreadyOutstanding { change_id: u32 },

    #[error("Change id mismatch: expected {expected}, got {actual}")]
    IdMismatch { expected: u32, actual: u32 },

    #[error("Change kind mismatch: expected {expected}, acknowledged as {actual}")]
    KindMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Payload mismatch: issued {expected}, acknowledged {actual}")]
    PayloadMismatch { expected: f32, actual: f32 },

    #[error("Change {change_id} unacknowledged for {elapsed_ms}ms (tolerance {tolerance_ms}ms)")]
    Timeout {
        change_id: u32,
        elapsed_ms: u64,
        tolerance_ms: u64,
    },

    #[error("Ledger is faulted")]
    Faulted,
}

/// Session lifecycle errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(u64),

    #[error("Session already registered: {0}")]
    AlreadyRegistered(u64),

    #[error("Shard full: {count} of {capacity} sessions")]
    ShardFull { count: usize, capacity: usize },

    #[error("Transfer already in flight for session {0}")]
    TransferInFlight(u64),
}

/// Result type alias for shardsync operations
pub type Result<T> = std::result::Result<T, ShardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_movement_severity() {
        assert_eq!(MovementError::ActorDead.severity(), Severity::Benign);
        assert_eq!(MovementError::ServerDriven.severity(), Severity::Benign);
        assert_eq!(
            MovementError::AckOutstanding { change_id: 3 }.severity(),
            Severity::Benign
        );
        assert!(MovementError::FallingForged {
            opcode: "StartForward"
        }
        .is_fatal());
        assert!(MovementError::AckOverdue {
            change_id: 3,
            elapsed_ms: 2000,
            tolerance_ms: 1500
        }
        .is_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = MovementError::ActorDead;
        assert_eq!(
            err.to_string(),
            "Actor is dead and the report implies motion"
        );

        let err = AckError::IdMismatch {
            expected: 4,
            actual: 5,
        };
        assert_eq!(err.to_string(), "Change id mismatch: expected 4, got 5");

        let err = SessionError::ShardFull {
            count: 100,
            capacity: 100,
        };
        assert_eq!(err.to_string(), "Shard full: 100 of 100 sessions");
    }
}
