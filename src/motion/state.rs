//! Kinematic state
//!
//! The per-object value type holding transform, movement flags, jump data
//! and the per-movement-type speed table. Owned exclusively by the object it
//! describes and mutated only through validated reports and acknowledged
//! forced changes.

use super::flags::MovementFlags;

/// Initial vertical velocity applied by a jump, in world units per second
pub const JUMP_VELOCITY: f32 = 7.958;

/// A point on the world plane
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    /// X coordinate
    pub x: f32,
    /// Y coordinate
    pub y: f32,
    /// Z (height) coordinate
    pub z: f32,
}

impl Position {
    /// Create a new position
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to another position
    pub fn distance(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.1}, {:.1}, {:.1})", self.x, self.y, self.z)
    }
}

/// Movement types with independently adjustable speeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MoveKind {
    Walk = 0,
    Run = 1,
    RunBack = 2,
    Swim = 3,
    SwimBack = 4,
    Turn = 5,
    Flight = 6,
    FlightBack = 7,
}

impl MoveKind {
    /// Total number of movement types
    pub const COUNT: usize = 8;

    /// Base speed in world units per second (radians per second for Turn)
    ///
    /// Forced speed changes carry raw units per second; dividing by the base
    /// yields the multiplier used by distance anti-cheat checks.
    pub fn base_speed(self) -> f32 {
        match self {
            Self::Walk => 2.5,
            Self::Run => 7.0,
            Self::RunBack => 4.5,
            Self::Swim => 4.722,
            Self::SwimBack => 2.5,
            Self::Turn => std::f32::consts::PI,
            Self::Flight => 7.0,
            Self::FlightBack => 4.5,
        }
    }

    /// All movement types, in table order
    pub fn all() -> [MoveKind; Self::COUNT] {
        [
            Self::Walk,
            Self::Run,
            Self::RunBack,
            Self::Swim,
            Self::SwimBack,
            Self::Turn,
            Self::Flight,
            Self::FlightBack,
        ]
    }
}

/// Per-movement-type speed table, in world units per second
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedTable([f32; MoveKind::COUNT]);

impl Default for SpeedTable {
    fn default() -> Self {
        let mut speeds = [0.0; MoveKind::COUNT];
        for kind in MoveKind::all() {
            speeds[kind as usize] = kind.base_speed();
        }
        Self(speeds)
    }
}

impl SpeedTable {
    /// Get the current speed for a movement type
    pub fn get(&self, kind: MoveKind) -> f32 {
        self.0[kind as usize]
    }

    /// Set the current speed for a movement type
    pub fn set(&mut self, kind: MoveKind, speed: f32) {
        self.0[kind as usize] = speed;
    }

    /// Speed multiplier relative to the base speed for a movement type
    ///
    /// This is the factor distance anti-cheat checks scale expectations by.
    pub fn rate(&self, kind: MoveKind) -> f32 {
        self.get(kind) / kind.base_speed()
    }
}

/// Velocity data captured at jump time
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JumpInfo {
    /// Initial vertical velocity
    pub vertical: f32,
    /// Sine of the facing at jump time
    pub sin: f32,
    /// Cosine of the facing at jump time
    pub cos: f32,
    /// Horizontal speed carried into the jump
    pub horizontal: f32,
}

/// Kinematic state of one world object
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionState {
    /// Current position
    pub position: Position,
    /// Facing in radians
    pub facing: f32,
    /// Pitch in radians (swim/flight)
    pub pitch: f32,
    /// Active movement flags
    pub flags: MovementFlags,
    /// Jump velocities, meaningful while FALLING is set
    pub jump: JumpInfo,
    /// Client timestamp of the last accepted report, in milliseconds
    pub timestamp: u32,
    /// Current per-movement-type speeds
    pub speeds: SpeedTable,
}

impl MotionState {
    /// Create a state at rest at the given position
    pub fn at(position: Position) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// The movement type the active flags select for horizontal motion
    ///
    /// Used to derive the horizontal jump speed and distance expectations.
    pub fn active_move_kind(&self) -> MoveKind {
        if self.flags.contains(MovementFlags::SWIMMING) {
            if self.flags.contains(MovementFlags::BACKWARD) {
                MoveKind::SwimBack
            } else {
                MoveKind::Swim
            }
        } else if self.flags.contains(MovementFlags::FLYING) {
            if self.flags.contains(MovementFlags::BACKWARD) {
                MoveKind::FlightBack
            } else {
                MoveKind::Flight
            }
        } else if self.flags.contains(MovementFlags::BACKWARD) {
            MoveKind::RunBack
        } else if self.flags.contains(MovementFlags::WALKING) {
            MoveKind::Walk
        } else {
            MoveKind::Run
        }
    }

    /// Current speed for the active movement type
    pub fn active_speed(&self) -> f32 {
        self.speeds.get(self.active_move_kind())
    }
}
