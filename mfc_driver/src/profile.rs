//! Velocity-profile program for the module's stored-program VM.
//!
//! The program closes the position loop on the module. Every pass it reads
//! the encoder, computes the remaining distance to the target in `gp0` and
//! writes a new `target_speed`:
//!
//! ```text
//! d        = gp0 - encoder_position                      (gp1)
//! d == 0  -> target_speed = actual_speed = 0, STOP
//! trigger  = sign(actual_speed) * actual_speed² / 1400    (gp2)
//! speed    = (actual_speed + (d - trigger)) * 2 / 3
//! speed    = clamp(speed, -2000, 2000)
//! speed    = d if speed == 0
//! target_speed = speed, repeat
//! ```
//!
//! `trigger` is the distance needed to brake from the current speed, signed
//! along the direction of travel; the blend starts decelerating once the
//! remaining distance falls below it. All arithmetic is integer with
//! truncating division, exactly as the VM executes it. The layout below is
//! tuned against real hardware: do not reorder or simplify it.

use mfc_common::tmcl::program::{Program, ProgramBuilder, ProgramError};
use mfc_common::tmcl::types::{AxisParam, CalcOp, Condition, GlobalVar, Operand};

/// Target position, written by the host.
pub const TARGET_POSITION: GlobalVar = GlobalVar::User(0);

/// Remaining distance, scratch for the program.
pub const REMAINING_DISTANCE: GlobalVar = GlobalVar::User(1);

/// Signed braking distance, scratch for the program.
pub const DECELERATION_TRIGGER: GlobalVar = GlobalVar::User(2);

/// Divisor turning speed² into a braking distance in encoder counts.
///
/// The value derived from the acceleration settings is 1572; 1400 is the
/// value tuned on the hardware.
pub const DECELERATION_DIVISOR: i32 = 1400;

/// Speed magnitude the program never exceeds.
pub const SPEED_LIMIT: i32 = 2000;

/// Address of the first instruction of the control loop.
pub const LOOP_START: usize = 1;

/// Assemble the profile program.
pub fn profile_program() -> Result<Program, ProgramError> {
    let mut p = ProgramBuilder::new();

    // The first command after a start is sometimes ignored.
    p.wait(1);

    // d = target - position
    p.get_param(AxisParam::EncoderPosition);
    p.calcx(CalcOp::Load);
    p.get_global(TARGET_POSITION);
    p.calcx(CalcOp::Sub);
    p.set_global(REMAINING_DISTANCE, Operand::Accumulator);

    // On target: stop the motor and end the program.
    p.comp(0);
    p.jump_if(Condition::Ne, p.skip(3));
    p.set_param(AxisParam::TargetSpeed, Operand::Value(0));
    p.set_param(AxisParam::ActualSpeed, Operand::Value(0));
    p.stop();

    // trigger = v² / DECELERATION_DIVISOR
    p.get_param(AxisParam::ActualSpeed);
    p.calcx(CalcOp::Load);
    p.calcx(CalcOp::Mul);
    p.calc(CalcOp::Div, DECELERATION_DIVISOR);

    // Negate trigger when v < 0. The second swap keeps the comparison.
    p.calcx(CalcOp::Swap);
    p.get_param(AxisParam::ActualSpeed);
    p.comp(0);
    p.calcx(CalcOp::Swap);
    p.jump_if(Condition::Ge, p.skip(1));
    p.calc(CalcOp::Mul, -1);
    p.set_global(DECELERATION_TRIGGER, Operand::Accumulator);

    // speed = (v + (d - trigger)) * 2 / 3
    p.calcx(CalcOp::Swap);
    p.get_global(REMAINING_DISTANCE);
    p.calcx(CalcOp::Sub);
    p.calcx(CalcOp::Swap);
    p.get_param(AxisParam::ActualSpeed);
    p.calcx(CalcOp::Add);
    p.calc(CalcOp::Mul, 2);
    p.calc(CalcOp::Div, 3);

    // speed = clamp(speed, -SPEED_LIMIT, SPEED_LIMIT)
    p.comp(SPEED_LIMIT);
    p.jump_if(Condition::Gt, p.skip(3));
    p.comp(-SPEED_LIMIT);
    p.jump_if(Condition::Lt, p.skip(3));
    p.jump(p.skip(3));
    p.calc(CalcOp::Load, SPEED_LIMIT);
    p.jump(p.skip(1));
    p.calc(CalcOp::Load, -SPEED_LIMIT);

    // Never request zero speed while a distance remains.
    p.comp(0);
    p.jump_if(Condition::Ne, p.skip(1));
    p.get_global(REMAINING_DISTANCE);

    p.set_param(AxisParam::TargetSpeed, Operand::Accumulator);
    p.jump(LOOP_START);

    p.finish()
}
