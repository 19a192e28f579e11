//! The [`Port`] type and associated types.

mod handlers;
mod options;
#[cfg(test)]
mod test;

#[cfg(any(test, feature = "mock"))]
use crate::backend::Mock;
use crate::{
	backend::{Backend, Serial, UNKNOWN_BACKEND_NAME},
	error::{CancelledError, DeadlineExceededError, Error, NotConnectedError, StatusParseError},
	gcode::{
		command::{is_variable_command, validate_variable_command},
		status::STATUS_QUERY,
		CancelToken, LineReader, ResponseLine, ResponseMatcher, StatusHandle, StatusSnapshot,
	},
	timeout_guard::TimeoutGuard,
};
pub use handlers::{AnomalyHandler, LineHandler};
use handlers::Handlers;
pub use options::{LineEnding, OpenSerialOptions, SessionOptions};
use std::{
	io,
	sync::Arc,
	time::{Duration, Instant},
};

/// The direction a line was sent.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Direction {
	/// The line was transmitted to a device.
	Tx,
	/// The line was received from a device.
	Recv,
}

/// What to wait for after sending a command.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum Wait {
	/// Return as soon as the command is written.
	None,
	/// Wait for the device to acknowledge the command.
	#[default]
	Ack,
	/// Wait for the device to report that it is idle.
	Idle,
}

impl Wait {
	/// Convert a pair of flags into a `Wait`; waiting for idle takes precedence.
	pub fn from_flags(wait_for_ack: bool, wait_for_idle: bool) -> Self {
		if wait_for_idle {
			Wait::Idle
		} else if wait_for_ack {
			Wait::Ack
		} else {
			Wait::None
		}
	}
}

/// The result of [sending](Port::send) a command.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommandOutcome {
	/// The lines received up to and including the acknowledgement.
	Lines(Vec<String>),
	/// The command was written (and, for [`Wait::Idle`], the device is idle).
	Sent,
}

impl CommandOutcome {
	/// The lines received in response, if any were collected.
	pub fn lines(&self) -> &[String] {
		match self {
			CommandOutcome::Lines(lines) => lines,
			CommandOutcome::Sent => &[],
		}
	}
}

/// A port connected to a device speaking the G-code line protocol.
///
/// Exchanges are strictly one at a time: a command is written, then its
/// response is read in full (or the device is polled until it is idle) before
/// the next command may be written. Any stale input is discarded before each
/// command.
///
/// The port owns its backend and closes it when dropped. The most recent
/// status report is published through a [`StatusHandle`] that other threads
/// can read, and waits can be cancelled from other threads through a
/// [`CancelToken`].
///
/// ## Example
///
/// ```rust
/// # use mirobot::gcode::{Port, Wait};
/// # fn wrapper() -> Result<(), Box<dyn std::error::Error>> {
/// let mut port = Port::open_serial("/dev/ttyUSB0")?;
/// port.send("$H", Wait::Idle)?;
/// let status = port.update_status()?;
/// println!("joint 1 is at {:?}", status.angles.joint1);
/// # Ok(())
/// # }
/// ```
pub struct Port<'a, B: Backend> {
	/// The underlying backend
	backend: B,
	/// Frames received bytes into lines
	reader: LineReader,
	/// Session options
	options: SessionOptions,
	/// The most recent status report
	status: StatusHandle,
	/// Cancels blocking waits
	cancel: CancelToken,
	/// If populated, the error that has "poisoned" the port. This error MUST be
	/// reported before the port is used for communication again.
	///
	/// A port becomes "poisoned" when an error occurs in a `Drop`
	/// implementation, such as a [`MotionGuard`](crate::arm::rover::MotionGuard)
	/// failing to stop the device, where it can neither be returned nor should
	/// it panic.
	poison: Option<io::Error>,
	/// User supplied event handlers
	handlers: Handlers<'a>,
}

impl<'a, B: Backend> std::fmt::Debug for Port<'a, B> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Port")
			.field("name", &self.backend.name())
			.field("options", &self.options)
			.field("handlers", &self.handlers)
			.finish_non_exhaustive()
	}
}

impl<'a> Port<'a, Serial> {
	/// Open the serial port at the specified path using the default options.
	///
	/// Alternatively, use [`Port::open_serial_options`] to customize how the port is opened.
	///
	/// ## Example
	///
	/// ```rust
	/// # use mirobot::gcode::Port;
	/// # fn wrapper() -> Result<(), Box<dyn std::error::Error>> {
	/// let mut port = Port::open_serial("/dev/ttyUSB0")?;
	/// // Or equivalently
	/// let mut port = Port::open_serial_options().open("/dev/ttyUSB0")?;
	/// # Ok(())
	/// # }
	/// ```
	pub fn open_serial(path: &str) -> Result<Self, Error> {
		OpenSerialOptions::new().open(path)
	}

	/// Get an [`OpenSerialOptions`] to customize how a serial port is opened.
	pub fn open_serial_options() -> OpenSerialOptions {
		OpenSerialOptions::new()
	}
}

#[cfg(any(test, feature = "mock"))]
#[cfg_attr(all(doc, feature = "doc_cfg"), doc(cfg(feature = "mock")))]
impl<'a> Port<'a, Mock> {
	/// Open a port backed by a [`Mock`], with delays shortened for tests.
	pub fn open_mock() -> Self {
		Port::from_backend(
			Mock::new(),
			SessionOptions::new()
				.poll_interval(Duration::ZERO)
				.status_retry_backoff(Duration::ZERO)
				.ack_deadline(Some(Duration::from_millis(200)))
				.idle_deadline(Some(Duration::from_secs(2))),
		)
	}
}

impl<'a, B: Backend> Port<'a, B> {
	/// Create a port around an already connected backend.
	///
	/// No handshake is performed.
	pub fn from_backend(backend: B, options: &SessionOptions) -> Self {
		Port {
			backend,
			reader: LineReader::new(),
			options: *options,
			status: StatusHandle::default(),
			cancel: CancelToken::new(),
			poison: None,
			handlers: Handlers::default(),
		}
	}

	/// Check if the port is poisoned and report the error if it exists.
	fn check_poisoned(&mut self) -> Result<(), io::Error> {
		if let Some(poison) = self.poison.take() {
			Err(poison)
		} else {
			Ok(())
		}
	}

	/// Poison the port with an error to report on its next use.
	pub(crate) fn poison(&mut self, e: io::Error) {
		self.poison = Some(e);
	}

	/// Report a pending cancellation request, consuming it.
	fn check_cancelled(&self) -> Result<(), CancelledError> {
		if self.cancel.take() {
			Err(CancelledError)
		} else {
			Ok(())
		}
	}

	fn check_open(&self) -> Result<(), NotConnectedError> {
		if self.backend.is_open() {
			Ok(())
		} else {
			Err(NotConnectedError)
		}
	}

	fn backend_name(&self) -> String {
		self.backend
			.name()
			.unwrap_or_else(|| UNKNOWN_BACKEND_NAME.to_string())
	}

	/// Discard any input that has already arrived, returning it.
	///
	/// This is done automatically before every command so that the response
	/// to an earlier command cannot be mistaken for the response to a new one.
	pub fn drain(&mut self) -> Result<Vec<u8>, Error> {
		self.check_open()?;
		let mut stale = self.reader.take_pending();
		let mut buf = [0; 256];
		while self.backend.bytes_to_read()? > 0 {
			match io::Read::read(&mut self.backend, &mut buf) {
				Ok(0) => break,
				Ok(n) => stale.extend_from_slice(&buf[..n]),
				Err(e)
					if matches!(
						e.kind(),
						io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
					) =>
				{
					break
				}
				Err(e) => return Err(e.into()),
			}
		}
		if !stale.is_empty() {
			log::debug!(
				"{} DRAIN: {}",
				self.backend_name(),
				String::from_utf8_lossy(&stale).trim_end()
			);
		}
		Ok(stale)
	}

	/// Transmit a command line without waiting for a response.
	///
	/// Surrounding whitespace is removed and the configured
	/// [`LineEnding`] appended. Variable commands (`$N=value`) must be well
	/// formed; malformed ones are rejected before anything is transmitted.
	pub fn command(&mut self, line: &str) -> Result<(), Error> {
		self.command_terminated(line, self.options.line_ending)
	}

	/// Like [`command`](Port::command) but with an explicit line ending.
	pub fn command_terminated(&mut self, line: &str, line_ending: LineEnding) -> Result<(), Error> {
		self.check_poisoned()?;
		let line = line.trim();
		if is_variable_command(line) {
			validate_variable_command(line)?;
		}
		self.drain()?;

		let mut bytes = Vec::with_capacity(line.len() + 2);
		bytes.extend_from_slice(line.as_bytes());
		bytes.extend_from_slice(line_ending.as_str().as_bytes());

		log::debug!("{} TX:   {}", self.backend_name(), line);
		io::Write::write_all(&mut self.backend, &bytes)?;
		io::Write::flush(&mut self.backend)?;
		if let Some(ref mut callback) = self.handlers.line {
			callback(line, Direction::Tx);
		}
		Ok(())
	}

	/// Transmit a command line and wait as specified by `wait`.
	///
	/// ## Example
	///
	/// ```rust
	/// # use mirobot::{backend::Backend, gcode::{CommandOutcome, Port, Wait}};
	/// # fn wrapper<B: Backend>(mut port: Port<B>) -> Result<(), Box<dyn std::error::Error>> {
	/// if let CommandOutcome::Lines(lines) = port.send("M50", Wait::Ack)? {
	///     println!("{lines:?}");
	/// }
	/// port.send("M21 G90 X10.0 F2000", Wait::Idle)?;
	/// # Ok(())
	/// # }
	/// ```
	pub fn send(&mut self, line: &str, wait: Wait) -> Result<CommandOutcome, Error> {
		self.command(line)?;
		match wait {
			Wait::None => Ok(CommandOutcome::Sent),
			Wait::Ack => self.wait_for_ok().map(CommandOutcome::Lines),
			Wait::Idle => {
				self.wait_until_idle()?;
				Ok(CommandOutcome::Sent)
			}
		}
	}

	/// Transmit a command line and return the lines received up to and
	/// including its acknowledgement.
	pub fn send_wait_ack(&mut self, line: &str) -> Result<Vec<String>, Error> {
		self.command(line)?;
		self.wait_for_ok()
	}

	/// Transmit a command line and wait for the device to become idle,
	/// returning the final status.
	pub fn send_wait_idle(&mut self, line: &str) -> Result<Arc<StatusSnapshot>, Error> {
		self.command(line)?;
		self.wait_until_idle()
	}

	/// Read lines until the device acknowledges the last command.
	///
	/// Error and alarm reports received meanwhile are logged, passed to the
	/// [anomaly handler](Port::set_anomaly_handler), and included in the
	/// returned lines; they do not end the wait. If the device prints its boot
	/// banner, [`UnexpectedResetError`](crate::error::UnexpectedResetError) is
	/// returned.
	///
	/// The wait is bounded by the [acknowledgement
	/// deadline](SessionOptions::ack_deadline) and can be cancelled.
	pub fn wait_for_ok(&mut self) -> Result<Vec<String>, Error> {
		self.collect_response(false, self.options.ack_deadline)
	}

	/// Read lines until the device prints its boot banner or acknowledges a
	/// command.
	///
	/// Used right after connecting, when opening the port resets the device.
	pub fn wait_for_boot(&mut self, deadline: Option<Duration>) -> Result<Vec<String>, Error> {
		self.collect_response(true, deadline)
	}

	fn collect_response(
		&mut self,
		reset_expected: bool,
		deadline: Option<Duration>,
	) -> Result<Vec<String>, Error> {
		self.check_poisoned()?;
		self.check_open()?;
		let started = Instant::now();
		let mut matcher = ResponseMatcher::new(self.options.ack_threshold, reset_expected);
		while !matcher.is_terminal() {
			self.check_cancelled()?;
			check_deadline(started, deadline, "an acknowledgement")?;
			let line = self.read_line()?;
			match matcher.push(&line) {
				Ok(class) if class.is_anomaly() => self.report_anomaly(&class),
				Ok(_) => {}
				Err(e) => {
					log::warn!("{} was reset unexpectedly", self.backend_name());
					return Err(e.into());
				}
			}
		}
		Ok(matcher.into_lines())
	}

	/// Read one line within the configured line timeout.
	fn read_line(&mut self) -> Result<String, Error> {
		let line = self
			.reader
			.read_line(&mut self.backend, self.options.line_timeout)?;
		if !line.is_empty() {
			log::debug!("{} RECV: {}", self.backend_name(), line);
			if let Some(ref mut callback) = self.handlers.line {
				callback(&line, Direction::Recv);
			}
		}
		Ok(line)
	}

	fn report_anomaly(&mut self, class: &ResponseLine) {
		match class {
			ResponseLine::ErrorReport(message) => {
				log::warn!("{} reported an error: {}", self.backend_name(), message);
			}
			ResponseLine::AlarmReport(message) => {
				log::warn!("{} reported an alarm: {}", self.backend_name(), message);
			}
			_ => {}
		}
		if let Some(ref mut callback) = self.handlers.anomaly {
			callback(class);
		}
	}

	/// Query the device's status and publish the result.
	///
	/// Unparsable reports are retried after the [status retry
	/// backoff](SessionOptions::status_retry_backoff) until the
	/// [acknowledgement deadline](SessionOptions::ack_deadline) passes.
	pub fn update_status(&mut self) -> Result<Arc<StatusSnapshot>, Error> {
		self.fetch_status(Instant::now(), self.options.ack_deadline)
	}

	fn fetch_status(
		&mut self,
		started: Instant,
		deadline: Option<Duration>,
	) -> Result<Arc<StatusSnapshot>, Error> {
		loop {
			let lines = self.send_wait_ack(STATUS_QUERY)?;
			match find_status(&lines) {
				Ok(snapshot) => return Ok(self.status.store(snapshot)),
				Err(e) => {
					log::warn!("{}: {}; retrying", self.backend_name(), e);
					check_deadline(started, deadline, "a status report")?;
					if !self.cancel.sleep(self.options.status_retry_backoff) {
						self.check_cancelled()?;
					}
				}
			}
		}
	}

	/// Poll the device's status until it reports that it is idle, pausing
	/// for the configured [poll interval](SessionOptions::poll_interval)
	/// between queries.
	///
	/// The idle status is returned. The wait is bounded by the [idle
	/// deadline](SessionOptions::idle_deadline) and can be cancelled.
	pub fn wait_until_idle(&mut self) -> Result<Arc<StatusSnapshot>, Error> {
		self.wait_until_idle_every(self.options.poll_interval)
	}

	/// Like [`wait_until_idle`](Port::wait_until_idle) but with a custom
	/// poll interval.
	pub fn wait_until_idle_every(
		&mut self,
		poll_interval: Duration,
	) -> Result<Arc<StatusSnapshot>, Error> {
		let started = Instant::now();
		let deadline = self.options.idle_deadline;
		loop {
			let status = self.fetch_status(started, deadline)?;
			if status.is_idle() {
				return Ok(status);
			}
			log::info!("{} is {}, waiting for idle", self.backend_name(), status.state);
			check_deadline(started, deadline, "the idle state")?;
			if !self.cancel.sleep(poll_interval) {
				self.check_cancelled()?;
			}
		}
	}

	/// Get the most recent status report.
	///
	/// This does not communicate with the device. Use
	/// [`update_status`](Port::update_status) for a fresh report.
	pub fn status(&self) -> Arc<StatusSnapshot> {
		self.status.load()
	}

	/// Get a handle to the most recent status report that can be shared with
	/// other threads.
	pub fn status_handle(&self) -> StatusHandle {
		self.status.clone()
	}

	/// Get a token that cancels this port's blocking waits.
	pub fn cancel_token(&self) -> CancelToken {
		self.cancel.clone()
	}

	/// Temporarily override the acknowledgement and idle deadlines and return a
	/// "scope guard" that will restore them when it goes out of scope.
	///
	/// If no deadline is specified, waits are unbounded.
	///
	/// ## Example
	/// ```rust
	/// # use mirobot::{backend::Backend, error::Error, gcode::{Port, Wait}};
	/// # use std::time::Duration;
	/// # fn helper<B: Backend>(mut port: Port<B>) -> Result<(), Error> {
	/// {
	///     let mut guard = port.timeout_guard(Some(Duration::from_secs(600)))?;
	///     // Homing all axes in turn can take a long time.
	///     guard.send("$HH", Wait::Idle)?;
	/// }  // The guard is dropped and the deadlines are restored.
	/// # Ok(())
	/// # }
	/// ```
	pub fn timeout_guard(
		&mut self,
		deadline: Option<Duration>,
	) -> Result<TimeoutGuard<'_, 'a, B>, io::Error> {
		self.check_poisoned()?;

		Ok(TimeoutGuard::new(self, deadline))
	}

	/// Get the session options.
	pub fn options(&self) -> &SessionOptions {
		&self.options
	}

	/// Get a mutable reference to the session options.
	pub fn options_mut(&mut self) -> &mut SessionOptions {
		&mut self.options
	}

	/// Get the "name" of the port's backend.
	///
	/// This is often the path passed to [`Port::open_serial`].
	pub fn name(&self) -> Option<String> {
		self.backend.name()
	}

	/// Get a referenced to the backend.
	pub fn backend(&self) -> &B {
		&self.backend
	}

	/// Get a mutable reference to the backend.
	pub fn backend_mut(&mut self) -> &mut B {
		&mut self.backend
	}

	/// Whether the port is still open.
	pub fn is_open(&self) -> bool {
		self.backend.is_open()
	}

	/// Close the port.
	///
	/// Closing a port that is already closed does nothing. The port is also
	/// closed when it is dropped.
	pub fn close(&mut self) -> Result<(), Error> {
		if self.backend.is_open() {
			log::debug!("{} closing", self.backend_name());
		}
		self.reader.take_pending();
		self.backend.close()?;
		Ok(())
	}

	/// Set a callback that will be called immediately after any line is sent
	/// or received.
	///
	/// If a previous callback was set, it is returned.
	///
	/// Note, the Port already logs lines via the [`log`] crate at the debug
	/// level. This is for callers that want to record the traffic themselves.
	///
	/// ## Example
	///
	/// ```
	/// # use mirobot::{backend::Backend, gcode::{Direction, Port}};
	/// # use std::sync::{Arc, Mutex};
	/// # fn wrapper<B: Backend>(mut port: Port<B>) -> Result<(), Box<dyn std::error::Error>> {
	/// let transcript = Arc::new(Mutex::new(Vec::new()));
	/// let sink = Arc::clone(&transcript);
	/// port.set_line_handler(move |line, direction| {
	///     if let Ok(mut lines) = sink.lock() {
	///         lines.push(format!("{direction:?}: {line}"));
	///     }
	/// });
	/// port.send_wait_ack("M50")?;
	/// # Ok(())
	/// # }
	/// ```
	pub fn set_line_handler<F>(&mut self, callback: F) -> Option<LineHandler<'a>>
	where
		F: FnMut(&str, Direction) + Send + 'a,
	{
		self.handlers.line.replace(Box::new(callback))
	}

	/// Clear any callback registered via [`set_line_handler`](Port::set_line_handler) and return it.
	pub fn clear_line_handler(&mut self) -> Option<LineHandler<'a>> {
		self.handlers.line.take()
	}

	/// Set a callback that will be called whenever the device reports an
	/// error (`error: ...`) or alarm (`ALARM: ...`).
	///
	/// If a previous callback was set, it is returned.
	///
	/// Reports are also logged at the warning level and included in the
	/// lines returned by [`wait_for_ok`](Port::wait_for_ok).
	pub fn set_anomaly_handler<F>(&mut self, callback: F) -> Option<AnomalyHandler<'a>>
	where
		F: FnMut(&ResponseLine) + Send + 'a,
	{
		self.handlers.anomaly.replace(Box::new(callback))
	}

	/// Clear any callback registered via [`set_anomaly_handler`](Port::set_anomaly_handler) and return it.
	pub fn clear_anomaly_handler(&mut self) -> Option<AnomalyHandler<'a>> {
		self.handlers.anomaly.take()
	}
}

impl<'a, B: Backend> Drop for Port<'a, B> {
	fn drop(&mut self) {
		if let Err(e) = self.backend.close() {
			log::warn!("failed to close {}: {}", self.backend_name(), e);
		}
	}
}

/// Fail if `deadline` has elapsed since `started`.
fn check_deadline(
	started: Instant,
	deadline: Option<Duration>,
	waiting_for: &'static str,
) -> Result<(), DeadlineExceededError> {
	match deadline {
		Some(deadline) if started.elapsed() >= deadline => {
			Err(DeadlineExceededError::new(waiting_for, deadline))
		}
		_ => Ok(()),
	}
}

/// Parse the status report among the lines of a response.
fn find_status(lines: &[String]) -> Result<StatusSnapshot, StatusParseError> {
	let report = lines
		.iter()
		.find(|line| line.contains('<') && line.contains('>'))
		.ok_or_else(|| StatusParseError::new(&lines.join(" | "), "no status report in response"))?;
	StatusSnapshot::parse(report)
}
