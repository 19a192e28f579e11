//! A simple but easy to use library for controlling WLKATA Mirobot arms.
//!
//! Devices are driven over their line-oriented [G-code protocol](gcode), on a
//! serial port or a [Bluetooth LE](backend::ble) link. The [`Arm`](arm::Arm)
//! type builds the command lines for motion, tools, homing and configuration
//! on top of a [`Port`](gcode::Port).
//!
//! ```rust
//! # use mirobot::{arm::Arm, error::Error, gcode::Angles};
//! # fn wrapper() -> Result<(), Error> {
//! let mut arm = Arm::open_serial("/dev/ttyUSB0")?;
//! arm.home_simultaneous()?;
//! arm.go_to_axis(&Angles { joint1: Some(10.0), ..Angles::default() }, None)?;
//! let status = arm.update_status()?;
//! println!("joint 1 is at {:?}", status.angles.joint1);
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
#![deny(missing_debug_implementations)]
#![cfg_attr(all(doc, feature = "doc_cfg"), feature(doc_cfg))]

pub mod arm;
pub mod backend;
pub mod error;
pub mod gcode;
pub mod timeout_guard;

#[cfg(test)]
mod test {
	use crate::{
		arm::Arm,
		backend::{Mock, Serial},
		gcode::{CancelToken, Port, StatusHandle},
	};
	use static_assertions::assert_impl_all;

	assert_impl_all!(Port<'static, Serial>: Send);
	assert_impl_all!(Port<'static, Mock>: Send);
	assert_impl_all!(Arm<'static, Serial>: Send);
	assert_impl_all!(StatusHandle: Send, Sync, Clone);
	assert_impl_all!(CancelToken: Send, Sync, Clone);
}
