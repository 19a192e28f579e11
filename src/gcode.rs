//! Types for communicating with a Mirobot over its line-oriented G-code protocol.
//!
//! ## Communicating with a Device
//!
//! All communication with a device starts with a [`Port`], which is usually a
//! serial port:
//!
//! ```rust
//! # use mirobot::{error::Error, gcode::Port};
//! # fn wrapper() -> Result<(), Error> {
//! let mut port = Port::open_serial("/dev/ttyUSB0")?;
//! // OR let the port be found automatically
//! let mut port = Port::open_serial_options().open_auto()?;
//! # Ok(())
//! # }
//! ```
//!
//! Commands are plain text lines. Send one and choose what to wait for with
//! [`send`](Port::send):
//!
//! ```rust
//! # use mirobot::{backend::Backend, gcode::{Port, Wait}};
//! # fn wrapper<B: Backend>(mut port: Port<B>) -> Result<(), Box<dyn std::error::Error>> {
//! // Unlock the axes and wait for the acknowledgement
//! let lines = port.send_wait_ack("M50")?;
//! // Move joint 1 and wait until the arm stops
//! port.send("M21 G90 X10.0 F2000", Wait::Idle)?;
//! # Ok(())
//! # }
//! ```
//!
//! Most programs should use the higher level [`Arm`](crate::arm::Arm) instead,
//! which builds the command lines.
//!
//! ## Responses
//!
//! A device answers every command with zero or more informational lines
//! followed by `ok`. The lines are collected by a [`ResponseMatcher`], which
//! also recognises error and alarm reports and the boot banner a device prints
//! after it resets.
//!
//! The device's status is queried with `?` and parsed into a
//! [`StatusSnapshot`]. The port keeps the most recent snapshot, which other
//! threads can read through a [`StatusHandle`].

mod cancel;
pub mod command;
pub mod discover;
mod line;
mod port;
mod response;
pub mod status;

pub use cancel::CancelToken;
pub use line::{LineReader, LINE_FEED};
pub use port::*;
pub use response::*;
pub use status::{Angles, Cartesian, StatusHandle, StatusSnapshot, IDLE, STATUS_QUERY};
