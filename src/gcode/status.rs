//! Parsing of status reports.
//!
//! A device answers the status query (`?`) with a single line of the form
//!
//! ```text
//! <Idle,Angle(ABCDXYZ):0.0,0.0,0.0,0.0,0.0,0.0,0.0,Cartesian coordinate(XYZ RxRyRz):198.670,0.0,230.720,0.0,0.0,0.0,Pump PWM:0,Valve PWM:0,Motion_MODE:0>
//! ```
//!
//! which [`StatusSnapshot::parse`] converts into a [`StatusSnapshot`].

use crate::error::StatusParseError;
use arc_swap::ArcSwap;
use regex::Regex;
use std::{
	fmt,
	str::FromStr,
	sync::{Arc, OnceLock},
};

/// The state reported by a device that is not moving.
pub const IDLE: &str = "Idle";

/// The status query.
pub const STATUS_QUERY: &str = "?";

fn pattern() -> &'static Regex {
	static PATTERN: OnceLock<Regex> = OnceLock::new();
	PATTERN.get_or_init(|| {
		Regex::new(concat!(
			r"<([^,]*),Angle\(ABCDXYZ\):([-\.\d,]*),",
			r"Cartesian coordinate\(XYZ RxRyRz\):([-\.\d,]*),",
			r"Pump PWM:(\d+),Valve PWM:(\d+),Motion_MODE:(\d)>",
		))
		.expect("the status pattern is valid")
	})
}

/// The joint angles (degrees) and rail position (mm) of an arm.
///
/// On the wire the values are ordered joint 1, 2, 3, rail, joint 4, 5, 6.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Angles {
	/// Joint 1 (axis X).
	pub joint1: Option<f64>,
	/// Joint 2 (axis Y).
	pub joint2: Option<f64>,
	/// Joint 3 (axis Z).
	pub joint3: Option<f64>,
	/// Joint 4 (axis A).
	pub joint4: Option<f64>,
	/// Joint 5 (axis B).
	pub joint5: Option<f64>,
	/// Joint 6 (axis C).
	pub joint6: Option<f64>,
	/// The linear rail (axis D).
	pub rail: Option<f64>,
}

impl Angles {
	/// The values in wire order.
	fn wire_order(&self) -> [Option<f64>; 7] {
		[
			self.joint1,
			self.joint2,
			self.joint3,
			self.rail,
			self.joint4,
			self.joint5,
			self.joint6,
		]
	}

	fn from_wire_order([j1, j2, j3, rail, j4, j5, j6]: [f64; 7]) -> Self {
		Angles {
			joint1: Some(j1),
			joint2: Some(j2),
			joint3: Some(j3),
			joint4: Some(j4),
			joint5: Some(j5),
			joint6: Some(j6),
			rail: Some(rail),
		}
	}
}

/// The tool-center-point pose: position in mm, orientation in degrees.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Cartesian {
	/// Position X.
	pub x: Option<f64>,
	/// Position Y.
	pub y: Option<f64>,
	/// Position Z.
	pub z: Option<f64>,
	/// Rotation about X.
	pub roll: Option<f64>,
	/// Rotation about Y.
	pub pitch: Option<f64>,
	/// Rotation about Z.
	pub yaw: Option<f64>,
}

impl Cartesian {
	fn wire_order(&self) -> [Option<f64>; 6] {
		[self.x, self.y, self.z, self.roll, self.pitch, self.yaw]
	}

	fn from_wire_order([x, y, z, roll, pitch, yaw]: [f64; 6]) -> Self {
		Cartesian {
			x: Some(x),
			y: Some(y),
			z: Some(z),
			roll: Some(roll),
			pitch: Some(pitch),
			yaw: Some(yaw),
		}
	}
}

/// The state of a device as of one status report.
///
/// A snapshot is only ever produced whole, from a single successfully parsed
/// report. The [`Default`] snapshot, with every field empty, stands for "no
/// report received yet".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusSnapshot {
	/// The state tag, e.g. `Idle`, `Run`, `Alarm` or `Home`.
	pub state: String,
	/// Joint angles and rail position.
	pub angles: Angles,
	/// Tool-center-point pose.
	pub cartesian: Cartesian,
	/// The air pump's PWM value.
	pub pump_pwm: Option<u32>,
	/// The valve's PWM value.
	pub valve_pwm: Option<u32>,
	/// Whether the device frames motion commands in cartesian space.
	pub motion_mode: bool,
}

impl StatusSnapshot {
	/// Parse a status report.
	///
	/// The report may be surrounded by other text.
	pub fn parse(line: &str) -> Result<Self, StatusParseError> {
		let captures = pattern()
			.captures(line)
			.ok_or_else(|| StatusParseError::new(line, "no status report found"))?;
		let group = |i| captures.get(i).map_or("", |m| m.as_str());

		let angles = parse_values::<7>(group(2))
			.ok_or_else(|| StatusParseError::new(line, "expected 7 angles"))?;
		let cartesian = parse_values::<6>(group(3))
			.ok_or_else(|| StatusParseError::new(line, "expected 6 cartesian values"))?;
		let pump_pwm = group(4)
			.parse()
			.map_err(|_| StatusParseError::new(line, "pump PWM out of range"))?;
		let valve_pwm = group(5)
			.parse()
			.map_err(|_| StatusParseError::new(line, "valve PWM out of range"))?;

		Ok(StatusSnapshot {
			state: group(1).to_string(),
			angles: Angles::from_wire_order(angles),
			cartesian: Cartesian::from_wire_order(cartesian),
			pump_pwm: Some(pump_pwm),
			valve_pwm: Some(valve_pwm),
			motion_mode: group(6) != "0",
		})
	}

	/// Whether the device reported that it is idle.
	pub fn is_idle(&self) -> bool {
		self.state == IDLE
	}
}

impl FromStr for StatusSnapshot {
	type Err = StatusParseError;
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		StatusSnapshot::parse(s)
	}
}

/// A shared, read-only view of a port's most recent [`StatusSnapshot`].
///
/// Clones refer to the same snapshot and can be sent to other threads. Each
/// [`load`](Self::load) returns the snapshot as of the latest successful
/// status report; it is replaced wholesale, never modified in place.
#[derive(Debug, Clone, Default)]
pub struct StatusHandle(Arc<ArcSwap<StatusSnapshot>>);

impl StatusHandle {
	/// Get the current snapshot.
	pub fn load(&self) -> Arc<StatusSnapshot> {
		self.0.load_full()
	}

	/// Publish a new snapshot.
	pub(crate) fn store(&self, snapshot: StatusSnapshot) -> Arc<StatusSnapshot> {
		let snapshot = Arc::new(snapshot);
		self.0.store(Arc::clone(&snapshot));
		snapshot
	}
}

/// Parse exactly `N` comma separated numbers.
fn parse_values<const N: usize>(csv: &str) -> Option<[f64; N]> {
	let mut values = [0.0; N];
	let mut tokens = csv.split(',');
	for value in &mut values {
		*value = tokens.next()?.parse().ok()?;
	}
	if tokens.next().is_some() {
		return None;
	}
	Some(values)
}

/// Formats the snapshot as a status report.
///
/// Only a fully populated snapshot produces a report that can be parsed again.
impl fmt::Display for StatusSnapshot {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fn csv(f: &mut fmt::Formatter<'_>, values: &[Option<f64>]) -> fmt::Result {
			for (i, value) in values.iter().enumerate() {
				if i > 0 {
					f.write_str(",")?;
				}
				if let Some(value) = value {
					write!(f, "{value}")?;
				}
			}
			Ok(())
		}
		fn int(f: &mut fmt::Formatter<'_>, value: Option<u32>) -> fmt::Result {
			match value {
				Some(value) => write!(f, "{value}"),
				None => Ok(()),
			}
		}

		write!(f, "<{},Angle(ABCDXYZ):", self.state)?;
		csv(f, &self.angles.wire_order())?;
		f.write_str(",Cartesian coordinate(XYZ RxRyRz):")?;
		csv(f, &self.cartesian.wire_order())?;
		f.write_str(",Pump PWM:")?;
		int(f, self.pump_pwm)?;
		f.write_str(",Valve PWM:")?;
		int(f, self.valve_pwm)?;
		write!(f, ",Motion_MODE:{}>", u8::from(self.motion_mode))
	}
}

#[cfg(test)]
mod test {
	use super::*;

	const REPORT: &str = "<Idle,Angle(ABCDXYZ):1.0,2.5,-3.0,40.0,5.0,6.0,7.0,Cartesian coordinate(XYZ RxRyRz):198.670,0.0,230.720,0.0,-0.5,0.0,Pump PWM:1000,Valve PWM:65,Motion_MODE:1>";

	#[test]
	fn parse() {
		let status = StatusSnapshot::parse(REPORT).unwrap();
		assert_eq!(status.state, "Idle");
		assert!(status.is_idle());
		assert_eq!(status.angles.joint1, Some(1.0));
		assert_eq!(status.angles.joint3, Some(-3.0));
		assert_eq!(status.angles.rail, Some(40.0));
		assert_eq!(status.angles.joint4, Some(5.0));
		assert_eq!(status.angles.joint6, Some(7.0));
		assert_eq!(status.cartesian.x, Some(198.67));
		assert_eq!(status.cartesian.pitch, Some(-0.5));
		assert_eq!(status.pump_pwm, Some(1000));
		assert_eq!(status.valve_pwm, Some(65));
		assert!(status.motion_mode);
	}

	#[test]
	fn motion_mode_zero_is_false() {
		let line = REPORT.replace("Motion_MODE:1", "Motion_MODE:0");
		assert!(!StatusSnapshot::parse(&line).unwrap().motion_mode);
	}

	#[test]
	fn tolerates_surrounding_text() {
		let line = format!("[RECV] {REPORT} trailing");
		assert_eq!(
			StatusSnapshot::parse(&line).unwrap(),
			StatusSnapshot::parse(REPORT).unwrap()
		);
	}

	#[test]
	fn parse_failures() {
		let cases = [
			"ok".to_string(),
			REPORT.replace("1.0,2.5,", "1.0,"),
			REPORT.replace("7.0,Cart", "7.0,8.0,Cart"),
			REPORT.replace("2.5", "2.5.1"),
			REPORT.replace("2.5", ""),
			REPORT.replace("Pump PWM:1000", "Pump PWM:99999999999"),
			REPORT.replace('>', ""),
		];
		for line in &cases {
			assert!(StatusSnapshot::parse(line).is_err(), "{line:?}");
		}
	}

	#[test]
	fn formatted_snapshot_parses_to_itself() {
		let snapshot = StatusSnapshot {
			state: "Run".to_string(),
			angles: Angles::from_wire_order([0.1, -90.0, 1e-7, 500.25, 0.0, -0.0, 179.99]),
			cartesian: Cartesian::from_wire_order([198.67, 0.0, 230.72, -180.0, 1.5, 33.333]),
			pump_pwm: Some(500),
			valve_pwm: Some(40),
			motion_mode: true,
		};
		let line = snapshot.to_string();
		assert_eq!(StatusSnapshot::parse(&line).unwrap(), snapshot);
		assert_eq!(
			StatusSnapshot::parse(REPORT).unwrap().to_string().parse::<StatusSnapshot>().unwrap(),
			StatusSnapshot::parse(REPORT).unwrap()
		);
	}

	#[test]
	fn handle_clones_share_the_snapshot() {
		let handle = StatusHandle::default();
		let observer = handle.clone();
		let before = observer.load();
		assert_eq!(*before, StatusSnapshot::default());

		handle.store(StatusSnapshot::parse(REPORT).unwrap());
		assert!(observer.load().is_idle());
		// Snapshots already handed out are unaffected.
		assert_eq!(before.state, "");
	}

	#[test]
	fn default_snapshot_is_not_a_report() {
		let empty = StatusSnapshot::default();
		assert!(!empty.is_idle());
		assert!(StatusSnapshot::parse(&empty.to_string()).is_err());
	}
}
