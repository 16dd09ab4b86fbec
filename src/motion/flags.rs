//! Movement flags and motion opcodes
//!
//! The flag bitset mirrors what clients carry in every motion report; the
//! opcode enum names the discrete report kinds the session layer decodes.

use bitflags::bitflags;

bitflags! {
    /// Kinematic flags carried by every motion report
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MovementFlags: u32 {
        /// No movement
        const NONE = 0;
        /// Moving forward
        const FORWARD = 1 << 0;
        /// Moving backward
        const BACKWARD = 1 << 1;
        /// Strafing left
        const STRAFE_LEFT = 1 << 2;
        /// Strafing right
        const STRAFE_RIGHT = 1 << 3;
        /// Turning left
        const TURN_LEFT = 1 << 4;
        /// Turning right
        const TURN_RIGHT = 1 << 5;
        /// Pitching up (swim/flight)
        const PITCH_UP = 1 << 6;
        /// Pitching down (swim/flight)
        const PITCH_DOWN = 1 << 7;
        /// Walk mode instead of run mode
        const WALKING = 1 << 8;
        /// Airborne
        const FALLING = 1 << 9;
        /// Falling far enough to take damage
        const FALLING_FAR = 1 << 10;
        /// In water
        const SWIMMING = 1 << 11;
        /// Airborne under flight
        const FLYING = 1 << 12;
        /// Movement-locked by the server
        const ROOTED = 1 << 13;
    }
}

impl MovementFlags {
    /// Check if any forward/backward/strafe motion is active
    pub fn is_moving(&self) -> bool {
        self.intersects(
            Self::FORWARD | Self::BACKWARD | Self::STRAFE_LEFT | Self::STRAFE_RIGHT,
        )
    }

    /// Check if any strafe motion is active
    pub fn is_strafing(&self) -> bool {
        self.intersects(Self::STRAFE_LEFT | Self::STRAFE_RIGHT)
    }

    /// Check if any turn is active
    pub fn is_turning(&self) -> bool {
        self.intersects(Self::TURN_LEFT | Self::TURN_RIGHT)
    }

    /// Check if any horizontal motion, strafe, or turn is active
    pub fn horizontal_motion(&self) -> bool {
        self.is_moving() || self.is_turning()
    }
}

/// Discrete motion report opcodes
///
/// One inbound motion report arrives on exactly one of these; the same
/// opcode is used when relaying the accepted report to watchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoveOpcode {
    StartForward,
    StartBackward,
    Stop,
    StartStrafeLeft,
    StartStrafeRight,
    StopStrafe,
    StartTurnLeft,
    StartTurnRight,
    StopTurn,
    SetPitch,
    SetFacing,
    Heartbeat,
    Jump,
    Land,
    MoveEnded,
}

impl MoveOpcode {
    /// Check if this opcode implies motion, turning, strafing, or pitching
    ///
    /// Reports from dead actors carrying one of these are stale and dropped.
    pub fn implies_motion(&self) -> bool {
        !matches!(self, Self::Heartbeat | Self::Land | Self::MoveEnded)
    }

    /// Check if this opcode may legally clear the falling flag
    pub fn ends_fall(&self) -> bool {
        matches!(self, Self::Land | Self::MoveEnded)
    }

    /// Static name for log fields and error payloads
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartForward => "StartForward",
            Self::StartBackward => "StartBackward",
            Self::Stop => "Stop",
            Self::StartStrafeLeft => "StartStrafeLeft",
            Self::StartStrafeRight => "StartStrafeRight",
            Self::StopStrafe => "StopStrafe",
            Self::StartTurnLeft => "StartTurnLeft",
            Self::StartTurnRight => "StartTurnRight",
            Self::StopTurn => "StopTurn",
            Self::SetPitch => "SetPitch",
            Self::SetFacing => "SetFacing",
            Self::Heartbeat => "Heartbeat",
            Self::Jump => "Jump",
            Self::Land => "Land",
            Self::MoveEnded => "MoveEnded",
        }
    }
}

impl std::fmt::Display for MoveOpcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
