//! Framing of the byte stream received from a device into lines.

use crate::{
	backend::Backend,
	error::{Error, LineDecodeError},
};
use std::{
	io,
	time::{Duration, Instant},
};

/// The byte terminating every line received from a device.
pub const LINE_FEED: u8 = b'\n';

/// Accumulates bytes read from a [`Backend`] into terminated lines.
///
/// Bytes that arrive after a line terminator are kept for the next call, so
/// several lines delivered in one read (or one line split across many reads)
/// are framed correctly.
#[derive(Debug, Default)]
pub struct LineReader {
	pending: Vec<u8>,
}

impl LineReader {
	/// Create an empty reader.
	pub fn new() -> Self {
		LineReader::default()
	}

	/// Read the next line, waiting at most `timeout` for it to arrive.
	///
	/// The returned line has surrounding whitespace (including the terminator)
	/// removed. If no terminator arrives in time, whatever has accumulated is
	/// returned instead, which is the empty string if nothing arrived.
	///
	/// The backend's read timeout is restored before returning.
	pub fn read_line<B: Backend + ?Sized>(
		&mut self,
		backend: &mut B,
		timeout: Duration,
	) -> Result<String, Error> {
		if let Some(line) = self.take_line()? {
			return Ok(line);
		}
		let original_timeout = backend.read_timeout()?;
		let result = self.fill(backend, Instant::now() + timeout);
		backend.set_read_timeout(original_timeout)?;
		result
	}

	/// Read from the backend until a line is complete or the deadline passes.
	fn fill<B: Backend + ?Sized>(
		&mut self,
		backend: &mut B,
		deadline: Instant,
	) -> Result<String, Error> {
		let mut buf = [0; 64];
		loop {
			let remaining = deadline.saturating_duration_since(Instant::now());
			if remaining.is_zero() {
				return self.take_partial();
			}
			backend.set_read_timeout(Some(remaining))?;
			match io::Read::read(backend, &mut buf) {
				Ok(0) => return self.take_partial(),
				Ok(n) => {
					self.pending.extend_from_slice(&buf[..n]);
					if let Some(line) = self.take_line()? {
						return Ok(line);
					}
				}
				Err(e)
					if matches!(
						e.kind(),
						io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
					) =>
				{
					return self.take_partial()
				}
				Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
				Err(e) => return Err(e.into()),
			}
		}
	}

	/// Remove and decode the first complete line, if there is one.
	fn take_line(&mut self) -> Result<Option<String>, Error> {
		let Some(end) = self.pending.iter().position(|&b| b == LINE_FEED) else {
			return Ok(None);
		};
		let bytes: Vec<u8> = self.pending.drain(..=end).collect();
		decode(&bytes).map(Some)
	}

	/// Remove and decode everything buffered.
	fn take_partial(&mut self) -> Result<String, Error> {
		let bytes = std::mem::take(&mut self.pending);
		decode(&bytes)
	}

	/// Discard any buffered bytes, returning them.
	pub fn take_pending(&mut self) -> Vec<u8> {
		std::mem::take(&mut self.pending)
	}
}

fn decode(bytes: &[u8]) -> Result<String, Error> {
	match std::str::from_utf8(bytes) {
		Ok(line) => Ok(line.trim().to_string()),
		Err(_) => Err(LineDecodeError::new(bytes).into()),
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::backend::Mock;

	const TIMEOUT: Duration = Duration::from_millis(100);

	#[test]
	fn multiple_lines_in_one_read() {
		let mut backend = Mock::new();
		backend.append_data("ok\r\n<Idle>\r\npart");
		let mut reader = LineReader::new();
		assert_eq!(reader.read_line(&mut backend, TIMEOUT).unwrap(), "ok");
		assert_eq!(reader.read_line(&mut backend, TIMEOUT).unwrap(), "<Idle>");
		// The unterminated tail is returned once nothing else arrives.
		assert_eq!(reader.read_line(&mut backend, TIMEOUT).unwrap(), "part");
		assert_eq!(reader.read_line(&mut backend, TIMEOUT).unwrap(), "");
	}

	#[test]
	fn line_split_across_reads() {
		let mut backend = Mock::new();
		let mut reader = LineReader::new();
		backend.append_data("homing mov");
		assert_eq!(reader.read_line(&mut backend, TIMEOUT).unwrap(), "homing mov");

		backend.append_data("ing...");
		backend.append_data("ok\n");
		assert_eq!(reader.read_line(&mut backend, TIMEOUT).unwrap(), "ing...ok");
	}

	#[test]
	fn timeout_returns_empty_line() {
		let mut backend = Mock::new();
		let mut reader = LineReader::new();
		assert_eq!(reader.read_line(&mut backend, TIMEOUT).unwrap(), "");
	}

	#[test]
	fn read_timeout_is_restored() {
		let mut backend = Mock::new();
		backend.set_read_timeout(Some(Duration::from_secs(7))).unwrap();
		backend.append_data("ok\n");
		let mut reader = LineReader::new();
		reader.read_line(&mut backend, TIMEOUT).unwrap();
		assert_eq!(
			backend.read_timeout().unwrap(),
			Some(Duration::from_secs(7))
		);
	}

	#[test]
	fn invalid_utf8_is_an_error() {
		let mut backend = Mock::new();
		backend.append_data(b"o\xffk\n");
		let mut reader = LineReader::new();
		let err = reader.read_line(&mut backend, TIMEOUT).unwrap_err();
		match err {
			Error::LineDecode(e) => assert_eq!(e.as_bytes(), b"o\xffk\n"),
			other => panic!("unexpected error: {other:?}"),
		}
	}

	#[test]
	fn io_errors_propagate() {
		let mut backend = Mock::new();
		backend.read_error(Some(io::Error::new(io::ErrorKind::BrokenPipe, "gone")));
		let mut reader = LineReader::new();
		let err = reader.read_line(&mut backend, TIMEOUT).unwrap_err();
		assert!(matches!(err, Error::Io(e) if e.kind() == io::ErrorKind::BrokenPipe));
	}
}
