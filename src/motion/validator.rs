//! Movement report validation
//!
//! Accepts or rejects one inbound client motion report against the current
//! authoritative state. Acceptance yields the state to adopt (with jump
//! velocities computed server-side); rejection carries a severity deciding
//! whether the report is dropped or the session disconnected.

use tracing::warn;

use crate::config::DriftPolicy;
use crate::error::MovementError;

use super::flags::{MoveOpcode, MovementFlags};
use super::state::{JumpInfo, MotionState, JUMP_VELOCITY};

/// Everything about the session the validator needs beyond the motion state
#[derive(Debug, Clone, Copy)]
pub struct ReportContext {
    /// Whether the actor is alive
    pub alive: bool,
    /// Whether the actor is under scripted or forced movement
    pub server_driven: bool,
    /// Outstanding forced change, as (change id, age in milliseconds)
    pub pending: Option<(u32, u64)>,
    /// Lag tolerance for the outstanding change
    pub ack_tolerance_ms: u64,
    /// Maximum accepted distance between reported and authoritative position
    pub drift_tolerance: f32,
    /// Drift handling policy
    pub drift_policy: DriftPolicy,
}

/// Validate a motion report and produce the state to adopt
///
/// The checks run in severity-significant order: liveness and ack gating
/// before flag provenance, provenance before redundancy, position drift
/// last (it is observational under the default policy).
pub fn validate_report(
    current: &MotionState,
    reported: &MotionState,
    opcode: MoveOpcode,
    ctx: &ReportContext,
) -> Result<MotionState, MovementError> {
    // Stale reports from a dead actor are dropped, not punished.
    if !ctx.alive && opcode.implies_motion() {
        return Err(MovementError::ActorDead);
    }

    // A client owing an ack must not keep reporting motion: within the lag
    // tolerance the report is dropped, past it the client is presumed to be
    // swallowing the forced correction.
    if let Some((change_id, elapsed_ms)) = ctx.pending {
        if elapsed_ms > ctx.ack_tolerance_ms {
            return Err(MovementError::AckOverdue {
                change_id,
                elapsed_ms,
                tolerance_ms: ctx.ack_tolerance_ms,
            });
        }
        return Err(MovementError::AckOutstanding { change_id });
    }

    if ctx.server_driven {
        return Err(MovementError::ServerDriven);
    }

    check_fall_provenance(current, reported, opcode)?;
    check_transition(current, opcode)?;
    check_drift(current, reported, ctx)?;

    Ok(adopt(current, reported, opcode))
}

/// The falling flag may flip on only via a jump and off only via a landing
fn check_fall_provenance(
    current: &MotionState,
    reported: &MotionState,
    opcode: MoveOpcode,
) -> Result<(), MovementError> {
    let was_falling = current.flags.contains(MovementFlags::FALLING);
    let now_falling = reported.flags.contains(MovementFlags::FALLING);

    if !was_falling && now_falling && opcode != MoveOpcode::Jump {
        return Err(MovementError::FallingForged {
            opcode: opcode.name(),
        });
    }
    if was_falling && !now_falling && !opcode.ends_fall() {
        return Err(MovementError::LandingForged {
            opcode: opcode.name(),
        });
    }
    Ok(())
}

/// Discrete transitions must actually transition
///
/// A start opcode for a flag already set, or a stop opcode with nothing to
/// stop, indicates a desynchronized client. The report is dropped and the
/// next heartbeat resynchronizes.
fn check_transition(current: &MotionState, opcode: MoveOpcode) -> Result<(), MovementError> {
    let flags = current.flags;
    let redundant = match opcode {
        MoveOpcode::StartForward => flags.contains(MovementFlags::FORWARD),
        MoveOpcode::StartBackward => flags.contains(MovementFlags::BACKWARD),
        MoveOpcode::Stop => !flags.is_moving(),
        MoveOpcode::StartStrafeLeft => flags.contains(MovementFlags::STRAFE_LEFT),
        MoveOpcode::StartStrafeRight => flags.contains(MovementFlags::STRAFE_RIGHT),
        MoveOpcode::StopStrafe => !flags.is_strafing(),
        MoveOpcode::StartTurnLeft => flags.contains(MovementFlags::TURN_LEFT),
        MoveOpcode::StartTurnRight => flags.contains(MovementFlags::TURN_RIGHT),
        MoveOpcode::StopTurn => !flags.is_turning(),
        MoveOpcode::Jump => flags.contains(MovementFlags::FALLING),
        MoveOpcode::Land => !flags.contains(MovementFlags::FALLING),
        MoveOpcode::SetPitch
        | MoveOpcode::SetFacing
        | MoveOpcode::Heartbeat
        | MoveOpcode::MoveEnded => false,
    };

    if redundant {
        return Err(MovementError::RedundantTransition {
            opcode: opcode.name(),
            flags: flags.bits(),
        });
    }
    Ok(())
}

/// Cross-check the reported position against the authoritative one
fn check_drift(
    current: &MotionState,
    reported: &MotionState,
    ctx: &ReportContext,
) -> Result<(), MovementError> {
    let distance = current.position.distance(&reported.position);
    if distance <= ctx.drift_tolerance {
        return Ok(());
    }

    match ctx.drift_policy {
        DriftPolicy::Log => {
            warn!(
                distance = distance,
                tolerance = ctx.drift_tolerance,
                authoritative = %current.position,
                reported = %reported.position,
                "Reported position drifts beyond tolerance"
            );
            Ok(())
        }
        DriftPolicy::Enforce => Err(MovementError::PositionDrift {
            distance,
            tolerance: ctx.drift_tolerance,
        }),
    }
}

/// Build the state to adopt from an accepted report
///
/// The speed table never comes from the client, and jump velocities are
/// computed here rather than trusted from the report.
fn adopt(current: &MotionState, reported: &MotionState, opcode: MoveOpcode) -> MotionState {
    let mut adopted = *reported;
    adopted.speeds = current.speeds;

    match opcode {
        MoveOpcode::Jump => {
            let horizontal = if current.flags.is_moving() {
                current.active_speed()
            } else {
                0.0
            };
            adopted.jump = JumpInfo {
                vertical: JUMP_VELOCITY,
                sin: reported.facing.sin(),
                cos: reported.facing.cos(),
                horizontal,
            };
            adopted.flags |= MovementFlags::FALLING;
        }
        MoveOpcode::Land | MoveOpcode::MoveEnded => {
            adopted.jump = JumpInfo::default();
        }
        _ => {
            adopted.jump = current.jump;
        }
    }

    adopted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::state::Position;

    fn ctx() -> ReportContext {
        ReportContext {
            alive: true,
            server_driven: false,
            pending: None,
            ack_tolerance_ms: 1500,
            drift_tolerance: 50.0,
            drift_policy: DriftPolicy::Log,
        }
    }

    fn report(flags: MovementFlags) -> MotionState {
        MotionState {
            flags,
            ..Default::default()
        }
    }

    #[test]
    fn test_accepts_start_forward() {
        let current = MotionState::default();
        let reported = report(MovementFlags::FORWARD);
        let adopted =
            validate_report(&current, &reported, MoveOpcode::StartForward, &ctx()).unwrap();
        assert!(adopted.flags.contains(MovementFlags::FORWARD));
    }

    #[test]
    fn test_rejects_dead_actor_motion() {
        let current = MotionState::default();
        let reported = report(MovementFlags::FORWARD);
        let mut ctx = ctx();
        ctx.alive = false;

        let err =
            validate_report(&current, &reported, MoveOpcode::StartForward, &ctx).unwrap_err();
        assert_eq!(err, MovementError::ActorDead);
        assert!(!err.is_fatal());

        // A heartbeat from a dead actor is still processed
        let reported = report(MovementFlags::NONE);
        assert!(validate_report(&current, &reported, MoveOpcode::Heartbeat, &ctx).is_ok());
    }

    #[test]
    fn test_rejects_server_driven() {
        let current = MotionState::default();
        let reported = report(MovementFlags::FORWARD);
        let mut ctx = ctx();
        ctx.server_driven = true;

        let err =
            validate_report(&current, &reported, MoveOpcode::StartForward, &ctx).unwrap_err();
        assert_eq!(err, MovementError::ServerDriven);
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_ack_gating() {
        let current = MotionState::default();
        let reported = report(MovementFlags::FORWARD);

        // Within tolerance: benign drop
        let mut ctx = ctx();
        ctx.pending = Some((7, 400));
        let err =
            validate_report(&current, &reported, MoveOpcode::StartForward, &ctx).unwrap_err();
        assert_eq!(err, MovementError::AckOutstanding { change_id: 7 });
        assert!(!err.is_fatal());

        // Past tolerance: protocol violation
        ctx.pending = Some((7, 2000));
        let err =
            validate_report(&current, &reported, MoveOpcode::StartForward, &ctx).unwrap_err();
        assert!(matches!(err, MovementError::AckOverdue { change_id: 7, .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_falling_forged_always_fatal() {
        let current = MotionState::default();
        let reported = report(MovementFlags::FORWARD | MovementFlags::FALLING);

        let err =
            validate_report(&current, &reported, MoveOpcode::StartForward, &ctx()).unwrap_err();
        assert!(matches!(err, MovementError::FallingForged { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_landing_forged_fatal() {
        let current = report(MovementFlags::FALLING);
        let reported = report(MovementFlags::FORWARD);

        let err =
            validate_report(&current, &reported, MoveOpcode::StartForward, &ctx()).unwrap_err();
        assert!(matches!(err, MovementError::LandingForged { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_jump_while_falling_rejected_benign() {
        let current = report(MovementFlags::FALLING);
        let reported = report(MovementFlags::FALLING);

        let err = validate_report(&current, &reported, MoveOpcode::Jump, &ctx()).unwrap_err();
        assert!(matches!(err, MovementError::RedundantTransition { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_redundant_transitions() {
        let moving = report(MovementFlags::FORWARD);
        let idle = MotionState::default();

        let err = validate_report(
            &moving,
            &report(MovementFlags::FORWARD),
            MoveOpcode::StartForward,
            &ctx(),
        )
        .unwrap_err();
        assert!(matches!(err, MovementError::RedundantTransition { .. }));

        let err = validate_report(&idle, &idle, MoveOpcode::Stop, &ctx()).unwrap_err();
        assert!(matches!(err, MovementError::RedundantTransition { .. }));

        let err = validate_report(&idle, &idle, MoveOpcode::StopTurn, &ctx()).unwrap_err();
        assert!(matches!(err, MovementError::RedundantTransition { .. }));

        let err = validate_report(&idle, &idle, MoveOpcode::Land, &ctx()).unwrap_err();
        assert!(matches!(err, MovementError::RedundantTransition { .. }));
    }

    #[test]
    fn test_jump_computes_velocities() {
        let mut current = report(MovementFlags::FORWARD);
        current.facing = std::f32::consts::FRAC_PI_2;
        let mut reported = report(MovementFlags::FORWARD | MovementFlags::FALLING);
        reported.facing = std::f32::consts::FRAC_PI_2;

        let adopted = validate_report(&current, &reported, MoveOpcode::Jump, &ctx()).unwrap();
        assert!((adopted.jump.vertical - JUMP_VELOCITY).abs() < 1e-6);
        assert!((adopted.jump.horizontal - 7.0).abs() < 1e-6);
        assert!((adopted.jump.sin - 1.0).abs() < 1e-5);
        assert!(adopted.jump.cos.abs() < 1e-5);
    }

    #[test]
    fn test_standing_jump_has_no_horizontal_speed() {
        let current = MotionState::default();
        let reported = report(MovementFlags::FALLING);

        let adopted = validate_report(&current, &reported, MoveOpcode::Jump, &ctx()).unwrap();
        assert_eq!(adopted.jump.horizontal, 0.0);
        assert!((adopted.jump.vertical - JUMP_VELOCITY).abs() < 1e-6);
    }

    #[test]
    fn test_backpedal_jump_uses_backwards_speed() {
        let current = report(MovementFlags::BACKWARD);
        let reported = report(MovementFlags::BACKWARD | MovementFlags::FALLING);

        let adopted = validate_report(&current, &reported, MoveOpcode::Jump, &ctx()).unwrap();
        assert!((adopted.jump.horizontal - 4.5).abs() < 1e-6);
    }

    #[test]
    fn test_drift_logged_by_default() {
        let current = MotionState::default();
        let mut reported = report(MovementFlags::NONE);
        reported.position = Position::new(500.0, 0.0, 0.0);

        // Default policy accepts the drifting report
        assert!(validate_report(&current, &reported, MoveOpcode::Heartbeat, &ctx()).is_ok());
    }

    #[test]
    fn test_drift_enforced_is_fatal() {
        let current = MotionState::default();
        let mut reported = report(MovementFlags::NONE);
        reported.position = Position::new(500.0, 0.0, 0.0);

        let mut ctx = ctx();
        ctx.drift_policy = DriftPolicy::Enforce;
        let err = validate_report(&current, &reported, MoveOpcode::Heartbeat, &ctx).unwrap_err();
        assert!(matches!(err, MovementError::PositionDrift { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_client_cannot_set_speeds() {
        let mut current = MotionState::default();
        current.speeds.set(crate::motion::MoveKind::Run, 8.0);

        let mut reported = report(MovementFlags::FORWARD);
        reported.speeds.set(crate::motion::MoveKind::Run, 100.0);

        let adopted =
            validate_report(&current, &reported, MoveOpcode::StartForward, &ctx()).unwrap();
        assert_eq!(adopted.speeds.get(crate::motion::MoveKind::Run), 8.0);
    }
}
