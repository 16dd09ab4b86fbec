//! Motion module
//!
//! Per-object kinematic state and the validation of client motion reports:
//! - Movement flag bitset and motion opcodes
//! - Kinematic state (transform, speeds, jump data)
//! - Report validation against server authority

pub mod flags;
pub mod state;
pub mod validator;

pub use flags::{MoveOpcode, MovementFlags};
pub use state::{JumpInfo, MotionState, MoveKind, Position, SpeedTable};
pub use validator::validate_report;
