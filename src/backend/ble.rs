//! A Bluetooth Low Energy backend.
//!
//! This crate does not ship a BLE stack. Instead, implement [`GattLink`] on
//! top of the stack of your choice (it only needs to write to the device's
//! serial characteristic and deliver its notifications) and wrap it in a
//! [`Ble`] backend:
//!
//! ```rust
//! # use mirobot::backend::ble::{Ble, GattLink};
//! # use mirobot::gcode::{Port, SessionOptions};
//! # use std::{io, time::Duration};
//! # #[derive(Debug)]
//! # struct MyLink;
//! # impl GattLink for MyLink {
//! #     fn write_chunk(&mut self, _: &[u8]) -> io::Result<()> { Ok(()) }
//! #     fn next_notification(&mut self, _: Option<Duration>) -> io::Result<Option<Vec<u8>>> { Ok(None) }
//! #     fn disconnect(&mut self) -> io::Result<()> { Ok(()) }
//! #     fn address(&self) -> Option<String> { None }
//! # }
//! # fn wrapper(link: MyLink) -> Result<(), mirobot::error::Error> {
//! let mut port = Port::from_backend(Ble::new(link), &SessionOptions::new());
//! port.send_wait_ack("M50")?;
//! # Ok(())
//! # }
//! ```

use super::{not_connected, Backend};
use std::{collections::VecDeque, io, time::Duration};

/// The UUID of the GATT service exposing the arm's serial characteristic.
pub const SERVICE_UUID: &str = "0000ffe0-0000-1000-8000-00805f9b34fb";

/// The maximum number of bytes written to the characteristic at once.
pub const CHUNK_SIZE: usize = 20;

/// The pause after each flush on POSIX systems. Without it back-to-back
/// commands can hang the link.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(100);

/// A connected GATT link to a device's serial characteristic.
pub trait GattLink {
	/// Write a chunk of at most [`CHUNK_SIZE`] bytes to the characteristic.
	fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()>;

	/// Wait for the next notification payload.
	///
	/// Returns `Ok(None)` if nothing arrived within `timeout`. A `timeout` of
	/// `None` waits indefinitely.
	fn next_notification(&mut self, timeout: Option<Duration>) -> io::Result<Option<Vec<u8>>>;

	/// Disconnect from the device.
	fn disconnect(&mut self) -> io::Result<()>;

	/// The device's address, if known.
	fn address(&self) -> Option<String>;
}

/// A backend that exchanges bytes over a [`GattLink`].
#[derive(Debug)]
pub struct Ble<L> {
	link: L,
	inbox: VecDeque<u8>,
	timeout: Option<Duration>,
	settle_delay: Duration,
	open: bool,
}

impl<L: GattLink> Ble<L> {
	/// Wrap a connected link.
	pub fn new(link: L) -> Self {
		Ble {
			link,
			inbox: VecDeque::new(),
			timeout: Some(Duration::from_millis(100)),
			settle_delay: DEFAULT_SETTLE_DELAY,
			open: true,
		}
	}

	/// Set the pause applied after each flush on POSIX systems.
	///
	/// The default is [`DEFAULT_SETTLE_DELAY`].
	pub fn settle_delay(mut self, delay: Duration) -> Self {
		self.settle_delay = delay;
		self
	}

	/// Get a reference to the underlying link.
	pub fn link(&self) -> &L {
		&self.link
	}

	/// Get a mutable reference to the underlying link.
	pub fn link_mut(&mut self) -> &mut L {
		&mut self.link
	}
}

impl<L: GattLink> io::Read for Ble<L> {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		if !self.open {
			return Err(not_connected());
		}
		if self.inbox.is_empty() {
			match self.link.next_notification(self.timeout)? {
				Some(payload) => self.inbox.extend(payload),
				None => {
					return Err(io::Error::new(
						io::ErrorKind::TimedOut,
						"no notification received",
					))
				}
			}
		}
		let n = buf.len().min(self.inbox.len());
		for (dst, src) in buf.iter_mut().zip(self.inbox.drain(..n)) {
			*dst = src;
		}
		Ok(n)
	}
}

impl<L: GattLink> io::Write for Ble<L> {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		if !self.open {
			return Err(not_connected());
		}
		for chunk in buf.chunks(CHUNK_SIZE) {
			self.link.write_chunk(chunk)?;
		}
		Ok(buf.len())
	}

	fn flush(&mut self) -> io::Result<()> {
		if cfg!(unix) && !self.settle_delay.is_zero() {
			std::thread::sleep(self.settle_delay);
		}
		Ok(())
	}
}

impl<L: GattLink> Backend for Ble<L> {
	fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), io::Error> {
		self.timeout = timeout;
		Ok(())
	}

	fn read_timeout(&self) -> Result<Option<Duration>, io::Error> {
		Ok(self.timeout)
	}

	fn name(&self) -> Option<String> {
		self.link.address()
	}

	fn bytes_to_read(&self) -> Result<usize, io::Error> {
		if self.open {
			Ok(self.inbox.len())
		} else {
			Err(not_connected())
		}
	}

	fn close(&mut self) -> Result<(), io::Error> {
		if self.open {
			self.open = false;
			self.inbox.clear();
			self.link.disconnect()?;
		}
		Ok(())
	}

	fn is_open(&self) -> bool {
		self.open
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use std::io::{Read as _, Write as _};

	#[derive(Debug, Default)]
	struct FakeLink {
		chunks: Vec<Vec<u8>>,
		notifications: VecDeque<Vec<u8>>,
		disconnects: usize,
	}

	impl GattLink for FakeLink {
		fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
			self.chunks.push(chunk.to_vec());
			Ok(())
		}
		fn next_notification(&mut self, _: Option<Duration>) -> io::Result<Option<Vec<u8>>> {
			Ok(self.notifications.pop_front())
		}
		fn disconnect(&mut self) -> io::Result<()> {
			self.disconnects += 1;
			Ok(())
		}
		fn address(&self) -> Option<String> {
			Some("AA:BB:CC:DD:EE:FF".to_string())
		}
	}

	#[test]
	fn writes_are_chunked() {
		let mut ble = Ble::new(FakeLink::default()).settle_delay(Duration::ZERO);
		let line = b"M20 G90 G1 X198.0 Y0.0 Z230.0 F2000\r\n";
		ble.write_all(line).unwrap();
		ble.flush().unwrap();
		let chunks = &ble.link().chunks;
		assert_eq!(chunks.len(), 2);
		assert_eq!(chunks[0].len(), CHUNK_SIZE);
		assert_eq!(chunks.concat(), line.to_vec());
	}

	#[test]
	fn notifications_are_buffered_for_reading() {
		let mut link = FakeLink::default();
		link.notifications.push_back(b"o".to_vec());
		link.notifications.push_back(b"k\r\nextra".to_vec());
		let mut ble = Ble::new(link);

		let mut out = Vec::new();
		let mut buf = [0; 4];
		while out.len() < 9 {
			let n = ble.read(&mut buf).unwrap();
			out.extend_from_slice(&buf[..n]);
		}
		assert_eq!(out, b"ok\r\nextra");
		let err = ble.read(&mut buf).unwrap_err();
		assert_eq!(err.kind(), io::ErrorKind::TimedOut);
	}

	#[test]
	fn close_disconnects_once() {
		let mut ble = Ble::new(FakeLink::default());
		ble.close().unwrap();
		ble.close().unwrap();
		assert!(!ble.is_open());
		assert_eq!(ble.link().disconnects, 1);
		assert_eq!(
			ble.write(b"?").unwrap_err().kind(),
			io::ErrorKind::NotConnected
		);
	}
}
