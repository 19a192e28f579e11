//! End-relative ("rover") motion.
//!
//! A rover command starts the tool moving in a direction relative to its own
//! orientation, and it keeps moving until it is told to stop (`W0`).
//!
//! Timed moves are the safest way to use them: the arm is always stopped
//! afterwards, even if waiting is cancelled.
//!
//! ```rust
//! # use mirobot::{arm::Arm, backend::Backend, error::Error};
//! # use std::time::Duration;
//! # fn wrapper<B: Backend>(mut arm: Arm<B>) -> Result<(), Error> {
//! arm.rover_forward(Some(Duration::from_millis(500)))?;
//! # Ok(())
//! # }
//! ```
//!
//! For open-ended moves, [`rover_start`](Arm::rover_start) returns a
//! [`MotionGuard`] that stops the arm when it goes out of scope.

use super::Arm;
use crate::{
	backend::Backend,
	error::{CancelledError, Error},
	gcode::LineEnding,
};
use std::{io, time::Duration};

/// A direction of end-relative motion.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RoverMotion {
	/// Stop moving.
	Stop,
	/// Move down and to the left.
	BottomLeft,
	/// Move backward.
	Backward,
	/// Move down and to the right.
	BottomRight,
	/// Move to the left.
	Left,
	/// Move to the right.
	Right,
	/// Move up and to the left.
	UpperLeft,
	/// Move forward.
	Forward,
	/// Move up and to the right.
	UpperRight,
	/// Rotate to the left.
	RotateLeft,
	/// Rotate to the right.
	RotateRight,
}

impl RoverMotion {
	/// The command that starts this motion.
	pub fn command(self) -> &'static str {
		match self {
			RoverMotion::Stop => "W0",
			RoverMotion::BottomLeft => "W1",
			RoverMotion::Backward => "W2",
			RoverMotion::BottomRight => "W3",
			RoverMotion::Left => "W4",
			RoverMotion::Right => "W6",
			RoverMotion::UpperLeft => "W7",
			RoverMotion::Forward => "W8",
			RoverMotion::UpperRight => "W9",
			RoverMotion::RotateLeft => "W10",
			RoverMotion::RotateRight => "W11",
		}
	}
}

/// A "scope guard" that stops end-relative motion when it goes out of scope.
///
/// Create one with [`Arm::rover_start`]. While the guard is in scope the arm
/// can only be accessed through it, but because the guard implements
/// [`Deref`](std::ops::Deref) and [`DerefMut`](std::ops::DerefMut) it can be
/// treated as the arm (e.g. to query its status).
///
/// If stopping fails when the guard is dropped, the arm's port is poisoned
/// and the error is reported by the next operation on it.
#[derive(Debug)]
pub struct MotionGuard<'g, 'a, B: Backend> {
	arm: &'g mut Arm<'a, B>,
	stopped: bool,
}

impl<'g, 'a, B: Backend> MotionGuard<'g, 'a, B> {
	/// Stop the motion now, reporting any error.
	pub fn stop(mut self) -> Result<Vec<String>, Error> {
		self.stopped = true;
		self.arm.rover_stop()
	}
}

impl<'a, B: Backend> std::ops::Deref for MotionGuard<'_, 'a, B> {
	type Target = Arm<'a, B>;
	fn deref(&self) -> &Self::Target {
		self.arm
	}
}

impl<B: Backend> std::ops::DerefMut for MotionGuard<'_, '_, B> {
	fn deref_mut(&mut self) -> &mut Self::Target {
		self.arm
	}
}

impl<B: Backend> Drop for MotionGuard<'_, '_, B> {
	fn drop(&mut self) {
		if self.stopped {
			return;
		}
		if let Err(e) = self.arm.rover_stop() {
			log::error!("failed to stop end-relative motion: {e}");
			self.arm.port_mut().poison(io::Error::new(
				io::ErrorKind::Other,
				format!("failed to stop end-relative motion: {e}"),
			));
		}
	}
}

/// Generate a method for each direction of motion that starts it and, given
/// a duration, stops it again afterwards.
macro_rules! define_rover_moves {
	($($variant:ident: $doc:literal),+ $(,)?) => {
		paste::paste! {
			impl<'a, B: Backend> Arm<'a, B> {
				$(
					#[doc = $doc]
					///
					/// See [`rover_drive`](Arm::rover_drive) for the meaning of `duration`.
					pub fn [<rover_ $variant:snake>](
						&mut self,
						duration: Option<Duration>,
					) -> Result<Vec<String>, Error> {
						self.rover_drive(RoverMotion::$variant, duration)
					}
				)+
			}
		}
	};
}

define_rover_moves! {
	UpperLeft: "Move up and to the left. (`W7`)",
	UpperRight: "Move up and to the right. (`W9`)",
	BottomLeft: "Move down and to the left. (`W1`)",
	BottomRight: "Move down and to the right. (`W3`)",
	Left: "Move to the left. (`W4`)",
	Right: "Move to the right. (`W6`)",
	Forward: "Move forward. (`W8`)",
	Backward: "Move backward. (`W2`)",
	RotateLeft: "Rotate to the left. (`W10`)",
	RotateRight: "Rotate to the right. (`W11`)",
}

impl<'a, B: Backend> Arm<'a, B> {
	/// Send a rover command and wait for its acknowledgement.
	fn rover_command(&mut self, motion: RoverMotion) -> Result<Vec<String>, Error> {
		let port = self.port_mut();
		port.command_terminated(motion.command(), LineEnding::CrLf)?;
		port.wait_for_ok()
	}

	/// Stop any end-relative motion. (`W0`)
	pub fn rover_stop(&mut self) -> Result<Vec<String>, Error> {
		self.rover_command(RoverMotion::Stop)
	}

	/// Start moving and return a guard that stops the arm when it goes out of scope.
	pub fn rover_start(&mut self, motion: RoverMotion) -> Result<MotionGuard<'_, 'a, B>, Error> {
		self.rover_command(motion)?;
		Ok(MotionGuard {
			arm: self,
			stopped: false,
		})
	}

	/// Start moving in the direction of `motion`.
	///
	/// If `duration` is `None`, the arm keeps moving after this returns until
	/// [`rover_stop`](Arm::rover_stop) is called. Otherwise the arm is stopped
	/// after `duration`, or as soon as the port's
	/// [`CancelToken`](crate::gcode::CancelToken) is cancelled, in which case
	/// [`CancelledError`] is returned once the arm has stopped. The
	/// acknowledgement of the stop command is returned.
	pub fn rover_drive(
		&mut self,
		motion: RoverMotion,
		duration: Option<Duration>,
	) -> Result<Vec<String>, Error> {
		let Some(duration) = duration else {
			return self.rover_command(motion);
		};
		let guard = self.rover_start(motion)?;
		let token = guard.port().cancel_token();
		if token.sleep(duration) {
			guard.stop()
		} else {
			token.take();
			guard.stop()?;
			Err(CancelledError.into())
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::arm::test::commands;

	fn acknowledge(arm: &mut Arm<'_, crate::backend::Mock>, count: usize) {
		for _ in 0..count {
			arm.port_mut().backend_mut().push_reply("ok\r\n");
		}
	}

	#[test]
	fn rover_commands_use_crlf() {
		let mut arm = Arm::open_mock();
		arm.port_mut()
			.options_mut()
			.line_ending(LineEnding::Lf);
		acknowledge(&mut arm, 1);
		arm.rover_forward(None).unwrap();
		assert_eq!(arm.port().backend().written(), b"W8\r\n");
	}

	#[test]
	fn timed_move_stops() {
		let mut arm = Arm::open_mock();
		acknowledge(&mut arm, 2);
		let lines = arm.rover_rotate_left(Some(Duration::from_millis(10))).unwrap();
		assert_eq!(lines, ["ok"]);
		assert_eq!(commands(&arm), ["W10", "W0"]);
	}

	#[test]
	fn guard_stops_on_drop() {
		let mut arm = Arm::open_mock();
		acknowledge(&mut arm, 2);
		{
			let mut guard = arm.rover_start(RoverMotion::UpperRight).unwrap();
			assert!(guard.port_mut().is_open());
		}
		assert_eq!(commands(&arm), ["W9", "W0"]);
	}

	#[test]
	fn failed_stop_poisons_the_port() {
		let mut arm = Arm::open_mock();
		acknowledge(&mut arm, 1);
		{
			let mut guard = arm.rover_start(RoverMotion::Left).unwrap();
			guard
				.port_mut()
				.backend_mut()
				.write_error(Some(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged")));
		}
		let err = arm.rover_stop().unwrap_err();
		assert!(matches!(err, Error::Io(ref e) if e.kind() == io::ErrorKind::Other));

		acknowledge(&mut arm, 1);
		arm.rover_stop().unwrap();
	}

	#[test]
	fn cancelled_move_still_stops() {
		let mut arm = Arm::open_mock();
		acknowledge(&mut arm, 2);
		let token = arm.port().cancel_token();
		let canceller = std::thread::spawn(move || {
			std::thread::sleep(Duration::from_millis(50));
			token.cancel();
		});
		let err = arm.rover_backward(Some(Duration::from_secs(30))).unwrap_err();
		canceller.join().unwrap();
		assert!(matches!(err, Error::Cancelled(_)));
		assert_eq!(commands(&arm), ["W2", "W0"]);
	}

	#[test]
	fn codes() {
		let codes: Vec<_> = [
			RoverMotion::Stop,
			RoverMotion::BottomLeft,
			RoverMotion::Backward,
			RoverMotion::BottomRight,
			RoverMotion::Left,
			RoverMotion::Right,
			RoverMotion::UpperLeft,
			RoverMotion::Forward,
			RoverMotion::UpperRight,
			RoverMotion::RotateLeft,
			RoverMotion::RotateRight,
		]
		.into_iter()
		.map(RoverMotion::command)
		.collect();
		assert_eq!(
			codes,
			["W0", "W1", "W2", "W3", "W4", "W6", "W7", "W8", "W9", "W10", "W11"]
		);
	}
}
