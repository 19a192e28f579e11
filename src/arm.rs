//! A high level interface to a Mirobot arm.
//!
//! An [`Arm`] wraps a [`Port`] and builds the command lines for motion,
//! tools, homing and configuration:
//!
//! ```rust
//! # use mirobot::{arm::Arm, error::Error, gcode::{Angles, Cartesian}};
//! # fn wrapper() -> Result<(), Error> {
//! let mut arm = Arm::open_serial("/dev/ttyUSB0")?;
//! arm.home_simultaneous()?;
//! // Move joint 1 to 30 degrees at the default speed, leaving the rest alone.
//! arm.go_to_axis(&Angles { joint1: Some(30.0), ..Angles::default() }, None)?;
//! // Then move the tool in a straight line.
//! let target = Cartesian { x: Some(200.0), y: Some(20.0), z: Some(230.0), ..Cartesian::default() };
//! arm.go_to_cartesian_lin(&target, Some(1000))?;
//! # Ok(())
//! # }
//! ```
//!
//! Motion and homing commands block until the arm reports that it is idle
//! again and return its final status.

pub mod gripper;
mod reset;
pub mod rover;

#[cfg(any(test, feature = "mock"))]
use crate::backend::Mock;
use crate::{
	backend::{Backend, Serial},
	error::{CancelledError, Error, InvalidArgumentError},
	gcode::{
		command::{checked_args_string, validate_variable_command, variable_command, Arg},
		Angles, Cartesian, CommandOutcome, OpenSerialOptions, Port, StatusSnapshot, Wait,
	},
};
pub use reset::ResetSource;
use std::{sync::Arc, time::Duration};

/// The slowest feed rate a device accepts.
pub const MIN_SPEED: u32 = 1;
/// The fastest feed rate a device accepts.
pub const MAX_SPEED: u32 = 3000;

/// PWM values for the air pump.
pub mod pump {
	/// The pump is off.
	pub const OFF: u32 = 0;
	/// The pump blows air out.
	pub const BLOWING: u32 = 500;
	/// The pump sucks air in.
	pub const SUCTION: u32 = 1000;
}

/// PWM values for the air valve.
pub mod valve {
	/// The valve is closed.
	pub const OFF: u32 = 65;
	/// The valve is open.
	pub const ON: u32 = 40;
}

/// How long the valve is held open to release the pressure when the pump is
/// turned off.
const VALVE_RELEASE: Duration = Duration::from_secs(1);

/// The tool mounted on the arm's end.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum ToolType {
	/// Nothing is mounted.
	#[default]
	NoTool,
	/// A suction cup driven by the air pump.
	SuctionCup,
	/// A two finger gripper.
	Gripper,
	/// A flexible claw driven by the air pump.
	FlexibleClaw,
}

impl ToolType {
	/// The value the device uses for this tool.
	pub fn id(self) -> u8 {
		match self {
			ToolType::NoTool => 0,
			ToolType::SuctionCup => 1,
			ToolType::Gripper => 2,
			ToolType::FlexibleClaw => 3,
		}
	}
}

/// Options for creating an [`Arm`] from a port.
///
/// ## Example
///
/// ```
/// # use mirobot::{arm::ArmOptions, backend::Backend, gcode::{Port, Wait}};
/// # fn wrapper<'a, B: Backend>(port: Port<'a, B>) {
/// let arm = ArmOptions::new()
///     .default_speed(1000)
///     .wait(Wait::None)
///     .build(port);
/// # }
/// ```
#[derive(Debug, Copy, Clone)]
pub struct ArmOptions {
	/// The feed rate used when a motion command does not specify one.
	default_speed: u32,
	/// What configuration commands wait for.
	wait: Wait,
}

impl ArmOptions {
	/// The default feed rate: 2000.
	pub const DEFAULT_SPEED: u32 = 2000;

	/// Create the default set of options.
	pub fn new() -> Self {
		ArmOptions {
			default_speed: ArmOptions::DEFAULT_SPEED,
			wait: Wait::Ack,
		}
	}

	/// Set the feed rate used when a motion command does not specify one.
	///
	/// The default is [`DEFAULT_SPEED`](Self::DEFAULT_SPEED). Values outside
	/// [`MIN_SPEED`]..=[`MAX_SPEED`] are rejected when a command uses them.
	pub fn default_speed(&mut self, speed: u32) -> &mut Self {
		self.default_speed = speed;
		self
	}

	/// Set what configuration commands (limits, offsets, calibration, ...)
	/// wait for.
	///
	/// The default is [`Wait::Ack`]. Motion, homing and tool commands always
	/// wait for the arm to become idle.
	pub fn wait(&mut self, wait: Wait) -> &mut Self {
		self.wait = wait;
		self
	}

	/// Create an [`Arm`] from the given [`Port`].
	pub fn build<'a, B: Backend>(&self, port: Port<'a, B>) -> Arm<'a, B> {
		Arm {
			port,
			options: *self,
		}
	}
}

impl Default for ArmOptions {
	fn default() -> Self {
		ArmOptions::new()
	}
}

/// A Mirobot arm.
pub struct Arm<'a, B: Backend> {
	port: Port<'a, B>,
	options: ArmOptions,
}

impl<B: Backend> std::fmt::Debug for Arm<'_, B> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Arm")
			.field("port", &self.port)
			.field("options", &self.options)
			.finish()
	}
}

impl<'a> Arm<'a, Serial> {
	/// Open the serial port at the specified path and wait for the arm to boot.
	///
	/// Use [`OpenSerialOptions`] and [`ArmOptions`] to customize how the port
	/// is opened.
	pub fn open_serial(path: &str) -> Result<Self, Error> {
		Ok(Arm::new(Port::open_serial(path)?))
	}

	/// Open the first serial port that an arm appears to be connected to.
	pub fn open_auto() -> Result<Self, Error> {
		Ok(Arm::new(OpenSerialOptions::new().open_auto()?))
	}
}

#[cfg(any(test, feature = "mock"))]
#[cfg_attr(all(doc, feature = "doc_cfg"), doc(cfg(feature = "mock")))]
impl<'a> Arm<'a, Mock> {
	/// Create an arm on a [`Port::open_mock`] port.
	pub fn open_mock() -> Self {
		Arm::new(Port::open_mock())
	}
}

impl<'a, B: Backend> Arm<'a, B> {
	/// Create an arm with the default [`ArmOptions`].
	pub fn new(port: Port<'a, B>) -> Self {
		ArmOptions::new().build(port)
	}

	/// Get the underlying port.
	pub fn port(&self) -> &Port<'a, B> {
		&self.port
	}

	/// Get a mutable reference to the underlying port.
	pub fn port_mut(&mut self) -> &mut Port<'a, B> {
		&mut self.port
	}

	/// Consume the arm and return the underlying port.
	pub fn into_port(self) -> Port<'a, B> {
		self.port
	}

	/// Get the arm's options.
	pub fn options(&self) -> &ArmOptions {
		&self.options
	}

	/// Get a mutable reference to the arm's options.
	pub fn options_mut(&mut self) -> &mut ArmOptions {
		&mut self.options
	}

	/// Query the arm's status. See [`Port::update_status`].
	pub fn update_status(&mut self) -> Result<Arc<StatusSnapshot>, Error> {
		self.port.update_status()
	}

	/// The most recent status, without querying the arm.
	pub fn status(&self) -> Arc<StatusSnapshot> {
		self.port.status()
	}

	/// Wait for the arm to become idle. See [`Port::wait_until_idle`].
	pub fn wait_until_idle(&mut self) -> Result<Arc<StatusSnapshot>, Error> {
		self.port.wait_until_idle()
	}

	/// Send a configuration command, waiting as configured.
	fn configure(&mut self, line: &str) -> Result<CommandOutcome, Error> {
		self.port.send(line, self.options.wait)
	}

	/// Send a command and wait for the arm to become idle.
	fn run(&mut self, line: &str) -> Result<Arc<StatusSnapshot>, Error> {
		self.port.send_wait_idle(line)
	}

	/// The feed rate argument for a motion command.
	fn speed(&self, speed: Option<u32>) -> Result<Arg, InvalidArgumentError> {
		check_speed(speed.unwrap_or(self.options.default_speed)).map(Arg::from)
	}

	fn joint_move(
		&mut self,
		instruction: &str,
		target: &Angles,
		speed: Option<u32>,
	) -> Result<Arc<StatusSnapshot>, Error> {
		let speed = self.speed(speed)?;
		let line = checked_args_string(
			instruction,
			[
				("X", target.joint1.map(Arg::from)),
				("Y", target.joint2.map(Arg::from)),
				("Z", target.joint3.map(Arg::from)),
				("A", target.joint4.map(Arg::from)),
				("B", target.joint5.map(Arg::from)),
				("C", target.joint6.map(Arg::from)),
				("D", target.rail.map(Arg::from)),
				("F", Some(speed)),
			],
		)?;
		self.run(&line)
	}

	fn cartesian_move(
		&mut self,
		instruction: &str,
		target: &Cartesian,
		speed: Option<u32>,
	) -> Result<Arc<StatusSnapshot>, Error> {
		let speed = self.speed(speed)?;
		let line = checked_args_string(
			instruction,
			[
				("X", target.x.map(Arg::from)),
				("Y", target.y.map(Arg::from)),
				("Z", target.z.map(Arg::from)),
				("A", target.roll.map(Arg::from)),
				("B", target.pitch.map(Arg::from)),
				("C", target.yaw.map(Arg::from)),
				("F", Some(speed)),
			],
		)?;
		self.run(&line)
	}

	/// Move the joints (and rail) to absolute positions. (`M21 G90`)
	///
	/// Joints without a value keep their position. If `speed` is `None` the
	/// [default speed](ArmOptions::default_speed) is used.
	pub fn go_to_axis(
		&mut self,
		target: &Angles,
		speed: Option<u32>,
	) -> Result<Arc<StatusSnapshot>, Error> {
		self.joint_move("M21 G90", target, speed)
	}

	/// Move the joints (and rail) by relative amounts. (`M21 G91`)
	pub fn increment_axis(
		&mut self,
		delta: &Angles,
		speed: Option<u32>,
	) -> Result<Arc<StatusSnapshot>, Error> {
		self.joint_move("M21 G91", delta, speed)
	}

	/// Move the joints given as `(joint number, angle)` pairs to absolute
	/// positions.
	///
	/// Joints are numbered 1 to 6; 7 is the rail. Any other number is rejected
	/// before anything is sent.
	///
	/// ```rust
	/// # use mirobot::{arm::Arm, backend::Backend, error::Error};
	/// # fn wrapper<B: Backend>(mut arm: Arm<B>) -> Result<(), Error> {
	/// arm.set_joint_angle([(1, 90.0), (3, -20.0)], None)?;
	/// # Ok(())
	/// # }
	/// ```
	pub fn set_joint_angle<I>(&mut self, angles: I, speed: Option<u32>) -> Result<Arc<StatusSnapshot>, Error>
	where
		I: IntoIterator<Item = (u8, f64)>,
	{
		let mut target = Angles::default();
		for (joint, angle) in angles {
			let slot = match joint {
				1 => &mut target.joint1,
				2 => &mut target.joint2,
				3 => &mut target.joint3,
				4 => &mut target.joint4,
				5 => &mut target.joint5,
				6 => &mut target.joint6,
				7 => &mut target.rail,
				_ => {
					return Err(InvalidArgumentError::new(format!(
						"joint {joint} does not exist, expected 1 to 7"
					))
					.into())
				}
			};
			*slot = Some(angle);
		}
		self.go_to_axis(&target, speed)
	}

	/// Move the rail to an absolute position in mm.
	pub fn go_to_slider(&mut self, position: f64, speed: Option<u32>) -> Result<Arc<StatusSnapshot>, Error> {
		let target = Angles {
			rail: Some(position),
			..Angles::default()
		};
		self.go_to_axis(&target, speed)
	}

	/// Move the rail by a relative distance in mm.
	pub fn increment_slider(&mut self, distance: f64, speed: Option<u32>) -> Result<Arc<StatusSnapshot>, Error> {
		let delta = Angles {
			rail: Some(distance),
			..Angles::default()
		};
		self.increment_axis(&delta, speed)
	}

	/// Point-to-point move of the tool to an absolute pose. (`M20 G90 G0`)
	pub fn go_to_cartesian_ptp(
		&mut self,
		target: &Cartesian,
		speed: Option<u32>,
	) -> Result<Arc<StatusSnapshot>, Error> {
		self.cartesian_move("M20 G90 G0", target, speed)
	}

	/// Straight line move of the tool to an absolute pose. (`M20 G90 G1`)
	pub fn go_to_cartesian_lin(
		&mut self,
		target: &Cartesian,
		speed: Option<u32>,
	) -> Result<Arc<StatusSnapshot>, Error> {
		self.cartesian_move("M20 G90 G1", target, speed)
	}

	/// Point-to-point move of the tool by a relative amount. (`M20 G91 G0`)
	pub fn increment_cartesian_ptp(
		&mut self,
		delta: &Cartesian,
		speed: Option<u32>,
	) -> Result<Arc<StatusSnapshot>, Error> {
		self.cartesian_move("M20 G91 G0", delta, speed)
	}

	/// Straight line move of the tool by a relative amount. (`M20 G91 G1`)
	pub fn increment_cartesian_lin(
		&mut self,
		delta: &Cartesian,
		speed: Option<u32>,
	) -> Result<Arc<StatusSnapshot>, Error> {
		self.cartesian_move("M20 G91 G1", delta, speed)
	}

	/// Move the tool along an arc in the horizontal plane, ending at `(x, y)`
	/// relative to the current position. (`M20 G91 G02`/`G03`)
	pub fn circular_interpolation(
		&mut self,
		x: f64,
		y: f64,
		radius: f64,
		clockwise: bool,
		speed: Option<u32>,
	) -> Result<Arc<StatusSnapshot>, Error> {
		let speed = self.speed(speed)?;
		let instruction = if clockwise { "M20 G91 G02" } else { "M20 G91 G03" };
		let line = checked_args_string(
			instruction,
			[
				("X", Some(Arg::from(x))),
				("Y", Some(Arg::from(y))),
				("R", Some(Arg::from(radius))),
				("F", Some(speed)),
			],
		)?;
		self.run(&line)
	}

	/// Move the tool along a door shaped path: up by the [door lift
	/// distance](Arm::set_door_lift_distance), across, then down to the
	/// target. (`M20 G90 G05`/`M20 G91 G05`)
	pub fn door_interpolation(
		&mut self,
		target: &Cartesian,
		absolute: bool,
		speed: Option<u32>,
	) -> Result<Arc<StatusSnapshot>, Error> {
		let instruction = if absolute { "M20 G90 G05" } else { "M20 G91 G05" };
		self.cartesian_move(instruction, target, speed)
	}

	/// Set the feed rate for subsequent moves that do not carry their own.
	pub fn set_speed(&mut self, speed: u32) -> Result<CommandOutcome, Error> {
		let speed = check_speed(speed)?;
		self.configure(&format!("F{speed}"))
	}

	/// Home all six joints at once. (`$H`)
	pub fn home_simultaneous(&mut self) -> Result<Arc<StatusSnapshot>, Error> {
		self.run("$H")
	}

	/// Home the six joints one after the other. (`$HH`)
	pub fn home_individual(&mut self) -> Result<Arc<StatusSnapshot>, Error> {
		self.run("$HH")
	}

	/// Home the six joints and the rail. (`$H0`)
	pub fn home_7axis(&mut self) -> Result<Arc<StatusSnapshot>, Error> {
		self.run("$H0")
	}

	/// Home the arm, including the rail if `has_slider` is set.
	pub fn home(&mut self, has_slider: bool) -> Result<Arc<StatusSnapshot>, Error> {
		if has_slider {
			self.home_7axis()
		} else {
			self.home_simultaneous()
		}
	}

	/// Home a single axis: joints 1 to 6, or 7 for the rail. (`$H{axis}`)
	pub fn home_axis(&mut self, axis: u8) -> Result<Arc<StatusSnapshot>, Error> {
		if !(1..=7).contains(&axis) {
			return Err(InvalidArgumentError::new(format!(
				"axis {axis} does not exist, expected 1 to 7"
			))
			.into());
		}
		self.run(&format!("$H{axis}"))
	}

	/// Home the rail. (`$H7`)
	pub fn home_slider(&mut self) -> Result<Arc<StatusSnapshot>, Error> {
		self.home_axis(7)
	}

	/// Move every joint to its nominal zero position. (`$M`)
	pub fn go_to_zero(&mut self) -> Result<Arc<StatusSnapshot>, Error> {
		self.run("$M")
	}

	/// Release the lock on the joints, e.g. after an alarm. (`M50`)
	pub fn unlock_shaft(&mut self) -> Result<CommandOutcome, Error> {
		self.configure("M50")
	}

	/// Enable or disable the hard (limit switch) limits. (`$21`)
	pub fn set_hard_limit(&mut self, enabled: bool) -> Result<CommandOutcome, Error> {
		self.configure(&variable_command(21, u8::from(enabled)))
	}

	/// Enable or disable the soft (configured range) limits. (`$20`)
	pub fn set_soft_limit(&mut self, enabled: bool) -> Result<CommandOutcome, Error> {
		self.configure(&variable_command(20, u8::from(enabled)))
	}

	/// Set the tool center point's offset from the flange in mm.
	/// (`$46`, `$47`, `$48`)
	///
	/// The device only accepts non-negative offsets; a negative one is
	/// rejected before it is sent, though earlier axes may already be set.
	pub fn set_tool_offset(&mut self, x: f64, y: f64, z: f64) -> Result<Vec<CommandOutcome>, Error> {
		[(46, x), (47, y), (48, z)]
			.into_iter()
			.map(|(id, value)| self.configure(&variable_command(id, value)))
			.collect()
	}

	/// Set how far the tool lifts during a [door
	/// interpolation](Arm::door_interpolation), in mm. (`$49`)
	pub fn set_door_lift_distance(&mut self, distance: f64) -> Result<CommandOutcome, Error> {
		self.configure(&variable_command(49, distance))
	}

	/// Tell the arm which tool is mounted. (`$50`)
	pub fn set_tool_type(&mut self, tool: ToolType) -> Result<CommandOutcome, Error> {
		log::info!("changing tool to {tool:?}");
		self.configure(&variable_command(50, tool.id()))
	}

	/// Start calibration by zeroing the stored offsets. (`M40`)
	pub fn start_calibration(&mut self) -> Result<CommandOutcome, Error> {
		self.configure("M40")
	}

	/// Finish calibration and store the current offsets. (`M41`)
	pub fn finish_calibration(&mut self) -> Result<CommandOutcome, Error> {
		self.configure("M41")
	}

	/// Set the air pump's PWM value. (`M3S`)
	///
	/// Only [`pump::OFF`], [`pump::BLOWING`] and [`pump::SUCTION`] are accepted.
	pub fn set_air_pump(&mut self, pwm: u32) -> Result<Arc<StatusSnapshot>, Error> {
		if ![pump::OFF, pump::BLOWING, pump::SUCTION].contains(&pwm) {
			return Err(InvalidArgumentError::new(format!(
				"pump PWM must be {}, {} or {}, got {pwm}",
				pump::OFF,
				pump::BLOWING,
				pump::SUCTION
			))
			.into());
		}
		self.run(&format!("M3S{pwm}"))
	}

	/// Set the air valve's PWM value. (`M4E`)
	///
	/// Only [`valve::OFF`] and [`valve::ON`] are accepted.
	pub fn set_valve(&mut self, pwm: u32) -> Result<Arc<StatusSnapshot>, Error> {
		if ![valve::OFF, valve::ON].contains(&pwm) {
			return Err(InvalidArgumentError::new(format!(
				"valve PWM must be {} or {}, got {pwm}",
				valve::OFF,
				valve::ON
			))
			.into());
		}
		self.run(&format!("M4E{pwm}"))
	}

	/// Run the air pump, sucking if `suction` is set and blowing otherwise.
	pub fn pump_on(&mut self, suction: bool) -> Result<Arc<StatusSnapshot>, Error> {
		self.set_air_pump(if suction { pump::SUCTION } else { pump::BLOWING })
	}

	/// Run the air pump in suction mode.
	pub fn pump_suction(&mut self) -> Result<Arc<StatusSnapshot>, Error> {
		self.pump_on(true)
	}

	/// Run the air pump in blowing mode.
	pub fn pump_blowing(&mut self) -> Result<Arc<StatusSnapshot>, Error> {
		self.pump_on(false)
	}

	/// Stop the air pump and release the pressure through the valve.
	///
	/// The valve is held open for one second. The pause can be cut short with
	/// the port's [`CancelToken`](crate::gcode::CancelToken), in which case the
	/// valve is still closed before the cancellation is reported.
	pub fn pump_off(&mut self) -> Result<Arc<StatusSnapshot>, Error> {
		self.set_air_pump(pump::OFF)?;
		self.set_valve(valve::ON)?;
		let token = self.port.cancel_token();
		let released = token.sleep(VALVE_RELEASE);
		if !released {
			token.take();
		}
		let status = self.set_valve(valve::OFF)?;
		if released {
			Ok(status)
		} else {
			Err(CancelledError.into())
		}
	}

	/// Reset the arm's stored configuration by sending each line of `source`.
	///
	/// Blank lines are skipped. Every other line must be a variable command
	/// (`$N=value`); the first malformed one stops the reset with an error.
	/// The outcome of each line is returned in order.
	pub fn reset_configuration(
		&mut self,
		source: &ResetSource,
	) -> Result<Vec<(String, CommandOutcome)>, Error> {
		let lines = source.lines()?;
		let mut outcomes = Vec::with_capacity(lines.len());
		for line in lines {
			validate_variable_command(&line)?;
			let outcome = self.configure(&line)?;
			outcomes.push((line, outcome));
		}
		Ok(outcomes)
	}
}

/// Check that `speed` is a feed rate the device accepts.
fn check_speed(speed: u32) -> Result<u32, InvalidArgumentError> {
	if (MIN_SPEED..=MAX_SPEED).contains(&speed) {
		Ok(speed)
	} else {
		Err(InvalidArgumentError::new(format!(
			"speed must be between {MIN_SPEED} and {MAX_SPEED}, got {speed}"
		)))
	}
}

#[cfg(test)]
pub(crate) mod test {
	use super::*;
	use crate::gcode::Port;

	pub(crate) const IDLE_REPORT: &str = "<Idle,Angle(ABCDXYZ):0.0,0.0,0.0,0.0,0.0,0.0,0.0,Cartesian coordinate(XYZ RxRyRz):198.670,0.0,230.720,0.0,0.0,0.0,Pump PWM:0,Valve PWM:0,Motion_MODE:0>";

	/// Script the replies for a command that is followed by a wait for idle.
	pub(crate) fn expect_idle(arm: &mut Arm<'_, Mock>) {
		let backend = arm.port_mut().backend_mut();
		backend.push_reply("ok\r\n");
		backend.push_reply(format!("{IDLE_REPORT}\r\nok\r\n"));
	}

	/// The commands written, without the status queries.
	pub(crate) fn commands(arm: &Arm<'_, Mock>) -> Vec<String> {
		arm.port()
			.backend()
			.written_lines()
			.into_iter()
			.filter(|line| line != "?")
			.collect()
	}

	#[test]
	fn joint_moves() {
		let mut arm = Arm::open_mock();
		expect_idle(&mut arm);
		let target = Angles {
			joint1: Some(10.0),
			joint4: Some(-5.555),
			rail: Some(100.0),
			..Angles::default()
		};
		assert!(arm.go_to_axis(&target, None).unwrap().is_idle());

		expect_idle(&mut arm);
		arm.increment_axis(&Angles { joint2: Some(1.0), ..Angles::default() }, Some(500))
			.unwrap();

		expect_idle(&mut arm);
		arm.set_joint_angle([(7, 20.0), (1, 90.0)], None).unwrap();

		assert_eq!(
			commands(&arm),
			[
				"M21 G90 X10.0 A-5.56 D100.0 F2000",
				"M21 G91 Y1.0 F500",
				"M21 G90 X90.0 D20.0 F2000",
			]
		);
	}

	#[test]
	fn cartesian_moves() {
		let mut arm = Arm::open_mock();
		let target = Cartesian {
			x: Some(200.0),
			y: Some(0.0),
			z: Some(230.5),
			yaw: Some(45.0),
			..Cartesian::default()
		};
		for _ in 0..6 {
			expect_idle(&mut arm);
		}
		arm.go_to_cartesian_ptp(&target, None).unwrap();
		arm.go_to_cartesian_lin(&target, Some(3000)).unwrap();
		arm.increment_cartesian_ptp(&Cartesian { z: Some(-10.0), ..Cartesian::default() }, None)
			.unwrap();
		arm.increment_cartesian_lin(&Cartesian { x: Some(1.0), ..Cartesian::default() }, Some(1))
			.unwrap();
		arm.circular_interpolation(10.0, 20.0, 30.0, true, None).unwrap();
		arm.door_interpolation(&target, true, None).unwrap();
		assert_eq!(
			commands(&arm),
			[
				"M20 G90 G0 X200.0 Y0.0 Z230.5 C45.0 F2000",
				"M20 G90 G1 X200.0 Y0.0 Z230.5 C45.0 F3000",
				"M20 G91 G0 Z-10.0 F2000",
				"M20 G91 G1 X1.0 F1",
				"M20 G91 G02 X10.0 Y20.0 R30.0 F2000",
				"M20 G90 G05 X200.0 Y0.0 Z230.5 C45.0 F2000",
			]
		);
	}

	#[test]
	fn speed_is_validated() {
		let mut arm = Arm::open_mock();
		for speed in [0, 3001] {
			let err = arm.go_to_slider(10.0, Some(speed)).unwrap_err();
			assert!(matches!(err, Error::InvalidArgument(_)));
			assert!(matches!(arm.set_speed(speed).unwrap_err(), Error::InvalidArgument(_)));
		}
		arm.options_mut().default_speed(0);
		assert!(arm.go_to_axis(&Angles::default(), None).is_err());
		assert!(arm.port().backend().written().is_empty());

		arm.port_mut().backend_mut().push_reply("ok\r\n");
		arm.set_speed(3000).unwrap();
		assert_eq!(commands(&arm), ["F3000"]);
	}

	#[test]
	fn non_finite_targets_are_not_sent() {
		let mut arm = Arm::open_mock();
		let err = arm
			.go_to_axis(&Angles { joint3: Some(f64::NAN), ..Angles::default() }, None)
			.unwrap_err();
		assert!(matches!(err, Error::InvalidArgument(_)));
		let err = arm
			.increment_cartesian_lin(&Cartesian { z: Some(f64::INFINITY), ..Cartesian::default() }, None)
			.unwrap_err();
		assert!(matches!(err, Error::InvalidArgument(_)));
		let err = arm
			.circular_interpolation(10.0, 20.0, f64::NAN, false, None)
			.unwrap_err();
		assert!(matches!(err, Error::InvalidArgument(_)));
		assert!(arm.port().backend().written().is_empty());
	}

	#[test]
	fn unknown_joints_are_rejected() {
		let mut arm = Arm::open_mock();
		for joint in [0, 8] {
			let err = arm.set_joint_angle([(joint, 1.0)], None).unwrap_err();
			assert!(matches!(err, Error::InvalidArgument(_)));
			assert!(arm.home_axis(joint).is_err());
		}
		assert!(arm.port().backend().written().is_empty());
	}

	#[test]
	fn homing() {
		let mut arm = Arm::open_mock();
		for _ in 0..6 {
			expect_idle(&mut arm);
		}
		arm.home_simultaneous().unwrap();
		arm.home_individual().unwrap();
		arm.home(true).unwrap();
		arm.home_axis(3).unwrap();
		arm.home_slider().unwrap();
		arm.go_to_zero().unwrap();
		assert_eq!(commands(&arm), ["$H", "$HH", "$H0", "$H3", "$H7", "$M"]);
	}

	#[test]
	fn configuration() {
		let mut arm = Arm::open_mock();
		for _ in 0..10 {
			arm.port_mut().backend_mut().push_reply("ok\r\n");
		}
		arm.unlock_shaft().unwrap();
		arm.set_hard_limit(true).unwrap();
		arm.set_soft_limit(false).unwrap();
		assert_eq!(arm.set_tool_offset(1.5, 0.0, 22.0).unwrap().len(), 3);
		arm.set_door_lift_distance(50.0).unwrap();
		arm.set_tool_type(ToolType::FlexibleClaw).unwrap();
		arm.start_calibration().unwrap();
		let outcome = arm.finish_calibration().unwrap();
		assert_eq!(outcome.lines(), ["ok"]);
		assert_eq!(
			commands(&arm),
			[
				"M50", "$21=1", "$20=0", "$46=1.5", "$47=0.0", "$48=22.0", "$49=50.0", "$50=3",
				"M40", "M41",
			]
		);
	}

	#[test]
	fn configuration_without_waiting() {
		let mut arm = ArmOptions::new().wait(Wait::None).build(Port::open_mock());
		assert_eq!(arm.unlock_shaft().unwrap(), CommandOutcome::Sent);
		assert_eq!(commands(&arm), ["M50"]);
	}

	#[test]
	fn negative_tool_offset_is_rejected() {
		let mut arm = Arm::open_mock();
		arm.port_mut().backend_mut().push_reply("ok\r\n");
		let err = arm.set_tool_offset(1.0, -2.0, 0.0).unwrap_err();
		assert!(matches!(err, Error::VariableCommand(_)));
		assert_eq!(commands(&arm), ["$46=1.0"]);
	}

	#[test]
	fn air_pump_and_valve() {
		let mut arm = Arm::open_mock();
		for _ in 0..5 {
			expect_idle(&mut arm);
		}
		arm.pump_suction().unwrap();
		arm.pump_blowing().unwrap();
		arm.pump_off().unwrap();
		assert_eq!(commands(&arm), ["M3S1000", "M3S500", "M3S0", "M4E40", "M4E65"]);

		assert!(matches!(arm.set_air_pump(999).unwrap_err(), Error::InvalidArgument(_)));
		assert!(matches!(arm.set_valve(50).unwrap_err(), Error::InvalidArgument(_)));
	}

	#[test]
	fn cancelled_pump_off_still_closes_the_valve() {
		let mut arm = Arm::open_mock();
		for _ in 0..3 {
			expect_idle(&mut arm);
		}
		let token = arm.port().cancel_token();
		let canceller = std::thread::spawn(move || {
			std::thread::sleep(Duration::from_millis(100));
			token.cancel();
		});
		let err = arm.pump_off().unwrap_err();
		canceller.join().unwrap();
		assert!(matches!(err, Error::Cancelled(_)));
		assert_eq!(commands(&arm), ["M3S0", "M4E40", "M4E65"]);
	}

	#[test]
	fn reset_configuration() {
		let mut arm = Arm::open_mock();
		arm.port_mut().backend_mut().push_reply("ok\r\n");
		arm.port_mut().backend_mut().push_reply("ok\r\n");
		let outcomes = arm
			.reset_configuration(&ResetSource::Text("$20=0\n\n  $21=1 \n".to_string()))
			.unwrap();
		assert_eq!(outcomes.len(), 2);
		assert_eq!(outcomes[0].0, "$20=0");
		assert_eq!(outcomes[1].1.lines(), ["ok"]);
		assert_eq!(commands(&arm), ["$20=0", "$21=1"]);

		let err = arm
			.reset_configuration(&ResetSource::Lines(vec!["M50".to_string()]))
			.unwrap_err();
		assert!(matches!(err, Error::VariableCommand(_)));
	}
}
