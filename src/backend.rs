//! Types that can exchange (read/write) bytes with a connected device.
//!
//! The [`Backend`] trait represents all such types. A Mirobot is reached
//! either over a [`Serial`] port or over Bluetooth Low Energy via
//! [`Ble`](ble::Ble).

pub mod ble;

use std::io;
use std::time::Duration;

use serialport as sp;

#[cfg(windows)]
use sp::COMPort as ExternSerial;
use sp::SerialPort;
#[cfg(unix)]
use sp::TTYPort as ExternSerial;

/// The placeholder name for a backend that doesn't have a name.
pub(crate) const UNKNOWN_BACKEND_NAME: &str = "<unknown backend>";

/// Types that allow reading and writing bytes with a connected device.
pub trait Backend: io::Read + io::Write + private::Sealed {
	/// Set the read timeout.
	///
	/// If timeout is `None`, reads will block indefinitely.
	fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), io::Error>;

	/// Get the read timeout.
	///
	/// If timeout is `None`, reads will block indefinitely.
	fn read_timeout(&self) -> Result<Option<Duration>, io::Error>;

	/// Get the "name" of the backend.
	///
	/// This can be in any format, but should uniquely identify the backend
	/// instance.
	fn name(&self) -> Option<String>;

	/// The number of bytes that can be read without blocking.
	fn bytes_to_read(&self) -> Result<usize, io::Error>;

	/// Release the underlying connection.
	///
	/// Closing an already closed backend is not an error. Reading from or
	/// writing to a closed backend fails with [`io::ErrorKind::NotConnected`].
	fn close(&mut self) -> Result<(), io::Error>;

	/// Whether the backend is still open.
	fn is_open(&self) -> bool;
}

impl<C: Backend + ?Sized> Backend for Box<C> {
	fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), io::Error> {
		(**self).set_read_timeout(timeout)
	}
	fn read_timeout(&self) -> Result<Option<Duration>, io::Error> {
		(**self).read_timeout()
	}
	fn name(&self) -> Option<String> {
		(**self).name()
	}
	fn bytes_to_read(&self) -> Result<usize, io::Error> {
		(**self).bytes_to_read()
	}
	fn close(&mut self) -> Result<(), io::Error> {
		(**self).close()
	}
	fn is_open(&self) -> bool {
		(**self).is_open()
	}
}

impl<C: Backend + ?Sized> Backend for &mut C {
	fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), io::Error> {
		(**self).set_read_timeout(timeout)
	}
	fn read_timeout(&self) -> Result<Option<Duration>, io::Error> {
		(**self).read_timeout()
	}
	fn name(&self) -> Option<String> {
		(**self).name()
	}
	fn bytes_to_read(&self) -> Result<usize, io::Error> {
		(**self).bytes_to_read()
	}
	fn close(&mut self) -> Result<(), io::Error> {
		(**self).close()
	}
	fn is_open(&self) -> bool {
		(**self).is_open()
	}
}

/// The error returned when using a backend that has been closed.
pub(crate) fn not_connected() -> io::Error {
	io::Error::new(io::ErrorKind::NotConnected, "the backend has been closed")
}

/// A platform agnostic serial port backend.
//
// The `serialport` crate exposes two platform specific serial ports, `COMPort`
// and `TTYPort` for windows and unix, respectively. Only one is ever used on a
// given platform, so wrap whichever applies in `Serial` rather than making
// consumers generic over it. The port is held in an `Option` so that it can be
// released on `close` while the `Serial` itself lives on inside a `Port`.
#[derive(Debug)]
pub struct Serial {
	port: Option<ExternSerial>,
	name: Option<String>,
}

impl Serial {
	pub(crate) fn new(port: ExternSerial) -> Self {
		let name = port.name();
		Serial {
			port: Some(port),
			name,
		}
	}

	fn port(&self) -> io::Result<&ExternSerial> {
		self.port.as_ref().ok_or_else(not_connected)
	}

	fn port_mut(&mut self) -> io::Result<&mut ExternSerial> {
		self.port.as_mut().ok_or_else(not_connected)
	}
}

impl io::Read for Serial {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		io::Read::read(self.port_mut()?, buf)
	}
}

impl io::Write for Serial {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		io::Write::write(self.port_mut()?, buf)
	}

	fn flush(&mut self) -> io::Result<()> {
		io::Write::flush(self.port_mut()?)
	}
}

impl Backend for Serial {
	fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), io::Error> {
		// The serialport API does not support infinite timeouts, so simply set
		// the timeout to the largest possible duration if `timeout` is `None`,
		// which is practically infinite.
		Ok(self.port_mut()?.set_timeout(timeout.unwrap_or(Duration::MAX))?)
	}
	fn read_timeout(&self) -> Result<Option<Duration>, io::Error> {
		Ok(Some(self.port()?.timeout()))
	}
	fn name(&self) -> Option<String> {
		self.name.clone()
	}
	fn bytes_to_read(&self) -> Result<usize, io::Error> {
		Ok(self.port()?.bytes_to_read()? as usize)
	}
	fn close(&mut self) -> Result<(), io::Error> {
		// Dropping the native port releases the handle.
		self.port = None;
		Ok(())
	}
	fn is_open(&self) -> bool {
		self.port.is_some()
	}
}

/// A mock backend for use in testing.
///
/// It has the following features:
///   * It records all data written to it.
///   * It can be filled with data for reading, either immediately
///     ([`append_data`](Mock::append_data)) or as a scripted reply that becomes
///     readable once the next complete line is written
///     ([`push_reply`](Mock::push_reply)).
///   * Specific errors can be inserted for calls to `read`, `write`, `flush`,
///     and `set_read_timeout`.
#[cfg(any(test, feature = "mock"))]
#[cfg_attr(all(doc, feature = "doc_cfg"), doc(cfg(feature = "mock")))]
#[derive(Debug)]
pub struct Mock {
	/// The buffer data is read from
	buffer: io::Cursor<Vec<u8>>,
	/// Replies released into `buffer`, one per complete line written.
	replies: std::collections::VecDeque<Vec<u8>>,
	/// Everything written so far.
	written: Vec<u8>,
	/// The error to surface on the next read, if any. It is only surfaced once.
	read_error: Option<io::Error>,
	/// The error to surface on the next write, if any. It is only surfaced once.
	write_error: Option<io::Error>,
	/// The error to surface on the next flush, if any. It is only surfaced once.
	flush_error: Option<io::Error>,
	/// The error to surface on the next set_read_timeout, if any. It is only surfaced once.
	set_read_timeout_error: Option<io::Error>,
	/// The read timeout, which is ignored.
	ignored_read_timeout: Option<Duration>,
	open: bool,
	close_calls: usize,
}

#[cfg(any(test, feature = "mock"))]
impl Mock {
	/// Create a new Mock backend.
	pub fn new() -> Self {
		Mock {
			buffer: io::Cursor::new(Vec::new()),
			replies: std::collections::VecDeque::new(),
			written: Vec::new(),
			read_error: None,
			write_error: None,
			flush_error: None,
			set_read_timeout_error: None,
			ignored_read_timeout: Some(Duration::ZERO),
			open: true,
			close_calls: 0,
		}
	}
	/// Append data to the read buffer.
	///
	/// The data is not validated in any way.
	pub fn append_data<T: AsRef<[u8]>>(&mut self, bytes: T) {
		self.buffer.get_mut().extend_from_slice(bytes.as_ref());
	}
	/// Queue a reply that becomes readable after the next complete line
	/// (terminated with `\n`) is written.
	///
	/// Replies are released in the order they were pushed, one per line.
	pub fn push_reply<T: AsRef<[u8]>>(&mut self, bytes: T) {
		self.replies.push_back(bytes.as_ref().to_vec());
	}
	/// Clear the read buffer and any queued replies.
	pub fn clear_buffer(&mut self) {
		self.buffer.get_mut().clear();
		self.buffer.set_position(0);
		self.replies.clear();
	}
	/// Whether the mock has any data available or not
	pub fn is_empty(&self) -> bool {
		self.remaining() == 0
	}
	/// The lines written so far, without their terminators.
	pub fn written_lines(&self) -> Vec<String> {
		String::from_utf8_lossy(&self.written)
			.split_terminator('\n')
			.map(|line| line.trim_end_matches('\r').to_string())
			.collect()
	}
	/// The raw bytes written so far.
	pub fn written(&self) -> &[u8] {
		&self.written
	}
	/// How many times [`close`](Backend::close) has been called.
	pub fn close_calls(&self) -> usize {
		self.close_calls
	}
	/// Set the error for the next `read`, if any.
	pub fn read_error(&mut self, err: Option<io::Error>) {
		self.read_error = err;
	}
	/// Set the error for the next `write`, if any.
	pub fn write_error(&mut self, err: Option<io::Error>) {
		self.write_error = err;
	}
	/// Set the error for the next `flush`, if any.
	pub fn flush_error(&mut self, err: Option<io::Error>) {
		self.flush_error = err;
	}
	/// Set the error for the next `set_read_timeout`, if any.
	pub fn set_read_timeout_error(&mut self, err: Option<io::Error>) {
		self.set_read_timeout_error = err;
	}

	fn remaining(&self) -> usize {
		let len = self.buffer.get_ref().len();
		len.saturating_sub(usize::try_from(self.buffer.position()).unwrap_or(len))
	}
}

#[cfg(any(test, feature = "mock"))]
impl Default for Mock {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(any(test, feature = "mock"))]
impl Backend for Mock {
	fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), io::Error> {
		if let Some(err) = self.set_read_timeout_error.take() {
			Err(err)
		} else {
			self.ignored_read_timeout = timeout;
			Ok(())
		}
	}

	fn read_timeout(&self) -> Result<Option<Duration>, io::Error> {
		Ok(self.ignored_read_timeout)
	}

	fn name(&self) -> Option<String> {
		Some(format!("<mock 0x{:x}>", std::ptr::from_ref(self) as usize))
	}

	fn bytes_to_read(&self) -> Result<usize, io::Error> {
		if self.open {
			Ok(self.remaining())
		} else {
			Err(not_connected())
		}
	}

	fn close(&mut self) -> Result<(), io::Error> {
		self.open = false;
		self.close_calls += 1;
		Ok(())
	}

	fn is_open(&self) -> bool {
		self.open
	}
}

#[cfg(any(test, feature = "mock"))]
impl io::Read for Mock {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		if !self.open {
			Err(not_connected())
		} else if let Some(err) = self.read_error.take() {
			Err(err)
		} else if self.is_empty() {
			// For a real device, having no data ready would result in a wait
			// and then eventual timeout error. However, as our data is in
			// memory that does not happen here. So simulate that behaviour by
			// returning a timeout error immediately.
			Err(io::Error::new(
				io::ErrorKind::TimedOut,
				"Simulated timeout error",
			))
		} else {
			io::Read::read(&mut self.buffer, buf)
		}
	}
}

#[cfg(any(test, feature = "mock"))]
impl io::Write for Mock {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		if !self.open {
			return Err(not_connected());
		}
		if let Some(err) = self.write_error.take() {
			return Err(err);
		}
		self.written.extend_from_slice(buf);
		for _ in buf.iter().filter(|&&b| b == b'\n') {
			if let Some(reply) = self.replies.pop_front() {
				self.buffer.get_mut().extend_from_slice(&reply);
			}
		}
		Ok(buf.len())
	}

	fn flush(&mut self) -> io::Result<()> {
		if let Some(err) = self.flush_error.take() {
			Err(err)
		} else {
			Ok(())
		}
	}
}

mod private {
	pub trait Sealed {}

	impl Sealed for super::Serial {}
	impl<L: super::ble::GattLink> Sealed for super::ble::Ble<L> {}
	#[cfg(any(test, feature = "mock"))]
	impl Sealed for super::Mock {}
	impl<C: super::Backend + ?Sized> Sealed for Box<C> {}
	impl<C: super::Backend + ?Sized> Sealed for &mut C {}
}

#[cfg(test)]
mod test {
	use super::*;
	use std::io::{Read as _, Write as _};

	#[test]
	fn mock_releases_one_reply_per_line() {
		let mut mock = Mock::new();
		mock.push_reply("first\r\n");
		mock.push_reply("second\r\n");
		assert!(mock.is_empty());

		mock.write_all(b"?").unwrap();
		assert!(mock.is_empty());
		mock.write_all(b"\n").unwrap();
		assert_eq!(mock.bytes_to_read().unwrap(), 7);

		let mut buf = [0; 16];
		let n = mock.read(&mut buf).unwrap();
		assert_eq!(&buf[..n], b"first\r\n");

		mock.write_all(b"$H\n").unwrap();
		let n = mock.read(&mut buf).unwrap();
		assert_eq!(&buf[..n], b"second\r\n");
		assert_eq!(mock.written_lines(), vec!["?", "$H"]);
	}

	#[test]
	fn mock_close_is_idempotent() {
		let mut mock = Mock::new();
		mock.close().unwrap();
		mock.close().unwrap();
		assert!(!mock.is_open());
		assert_eq!(mock.close_calls(), 2);
		let err = mock.write(b"x").unwrap_err();
		assert_eq!(err.kind(), io::ErrorKind::NotConnected);
	}
}
