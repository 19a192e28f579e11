//! Control of the two finger gripper.
//!
//! The gripper is driven by a servo on the valve channel (`M4E`). Its PWM
//! value ranges from [`OPEN_PWM`] to [`CLOSE_PWM`]; a finger spacing in mm is
//! converted to a PWM value through the geometry of the finger linkage.

use super::Arm;
use crate::{
	backend::Backend,
	error::{Error, InvalidArgumentError},
	gcode::StatusSnapshot,
};
use std::sync::Arc;

/// The PWM value that fully opens the gripper.
pub const OPEN_PWM: u32 = 40;
/// The PWM value that fully closes the gripper.
pub const CLOSE_PWM: u32 = 60;
/// The widest finger spacing, in mm, reached at [`OPEN_PWM`].
pub const MAX_SPACING: f64 = 30.0;
/// The narrowest finger spacing, in mm, reached at [`CLOSE_PWM`].
pub const MIN_SPACING: f64 = 0.0;

// Finger linkage lengths in mm.
const LINK_A: f64 = 9.5;
const LINK_B: f64 = 18.0;
const LINK_C: f64 = 3.0;

/// The servo angle, in degrees, that produces a finger spacing of `spacing` mm.
fn servo_angle(spacing: f64) -> f64 {
	let d1 = spacing / 2.0 + LINK_C - LINK_A;
	(d1 / LINK_B).asin().to_degrees()
}

/// Convert a finger spacing in mm to the gripper's PWM value.
///
/// The spacing is limited to the range between [`MIN_SPACING`] and
/// [`MAX_SPACING`]. NaN is rejected.
pub fn spacing_to_pwm(spacing: f64) -> Result<u32, InvalidArgumentError> {
	if spacing.is_nan() {
		return Err(InvalidArgumentError::new("gripper spacing must be a number, got NaN"));
	}
	let spacing = spacing.clamp(MIN_SPACING, MAX_SPACING);
	let closed = servo_angle(MIN_SPACING);
	let open = servo_angle(MAX_SPACING);
	let ratio = (servo_angle(spacing) - closed) / (open - closed);
	let pwm = f64::from(CLOSE_PWM) + ratio * (f64::from(OPEN_PWM) - f64::from(CLOSE_PWM));
	Ok(pwm as u32)
}

/// Limit `pwm` to the gripper's range.
pub fn clamp_pwm(pwm: u32) -> u32 {
	pwm.clamp(OPEN_PWM.min(CLOSE_PWM), OPEN_PWM.max(CLOSE_PWM))
}

impl<'a, B: Backend> Arm<'a, B> {
	/// Set the gripper's PWM value, limited to the range between [`OPEN_PWM`]
	/// and [`CLOSE_PWM`]. (`M4E`)
	pub fn set_gripper_pwm(&mut self, pwm: u32) -> Result<Arc<StatusSnapshot>, Error> {
		let clamped = clamp_pwm(pwm);
		if clamped != pwm {
			log::debug!("gripper PWM {pwm} limited to {clamped}");
		}
		self.run(&format!("M4E{clamped}"))
	}

	/// Close the gripper if `close` is set, otherwise open it.
	pub fn set_gripper(&mut self, close: bool) -> Result<Arc<StatusSnapshot>, Error> {
		self.set_gripper_pwm(if close { CLOSE_PWM } else { OPEN_PWM })
	}

	/// Fully open the gripper.
	pub fn gripper_open(&mut self) -> Result<Arc<StatusSnapshot>, Error> {
		self.set_gripper(false)
	}

	/// Fully close the gripper.
	pub fn gripper_close(&mut self) -> Result<Arc<StatusSnapshot>, Error> {
		self.set_gripper(true)
	}

	/// Move the fingers so that they are `spacing` mm apart.
	pub fn set_gripper_spacing(&mut self, spacing: f64) -> Result<Arc<StatusSnapshot>, Error> {
		let pwm = spacing_to_pwm(spacing)?;
		self.set_gripper_pwm(pwm)
	}
}
