//! Classification of response lines and detection of when a command's
//! response is complete.

use crate::error::UnexpectedResetError;

/// The token a device sends once it has processed a command.
pub const ACKNOWLEDGEMENT: &str = "ok";

/// The banner a device prints when it (re)boots.
pub const RESET_BANNER: &str = "Using reset pos!";

const ERROR_MARKER: &str = "error";
const ERROR_PREFIX: &str = "error: ";
const ALARM_MARKER: &str = "ALARM";
const ALARM_PREFIX: &str = "ALARM: ";

/// A line received from a device, classified by its content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResponseLine {
	/// The device finished processing a command.
	Acknowledgement,
	/// The device rejected or failed a command.
	ErrorReport(String),
	/// The device reported a fault condition.
	AlarmReport(String),
	/// The device printed its boot banner.
	UnsolicitedReset(String),
	/// A status report, see [`StatusSnapshot`](super::StatusSnapshot).
	StatusReport(String),
	/// Anything else, such as informational output.
	Other(String),
}

impl ResponseLine {
	/// Classify a line.
	///
	/// Only the content of `line` is considered. A line can match more than
	/// one class (an error report may also end with `ok`); the first match in
	/// the order error, alarm, reset, status, acknowledgement is returned. Use
	/// [`is_acknowledgement`] to test for acknowledgement independently.
	pub fn classify(line: &str) -> Self {
		if line.contains(ERROR_MARKER) {
			ResponseLine::ErrorReport(strip_marker(line, ERROR_PREFIX).to_string())
		} else if line.contains(ALARM_MARKER) {
			ResponseLine::AlarmReport(strip_marker(line, ALARM_PREFIX).to_string())
		} else if is_reset_banner(line) {
			ResponseLine::UnsolicitedReset(line.to_string())
		} else if line.contains('<') && line.contains('>') {
			ResponseLine::StatusReport(line.to_string())
		} else if is_acknowledgement(line) {
			ResponseLine::Acknowledgement
		} else {
			ResponseLine::Other(line.to_string())
		}
	}

	/// Whether the line reports a problem on the device.
	pub fn is_anomaly(&self) -> bool {
		matches!(
			self,
			ResponseLine::ErrorReport(_) | ResponseLine::AlarmReport(_)
		)
	}
}

/// The text following `prefix`, or the whole line if `prefix` is absent.
fn strip_marker<'l>(line: &'l str, prefix: &str) -> &'l str {
	line.split_once(prefix).map_or(line, |(_, message)| message)
}

/// Whether `line` acknowledges a command.
///
/// Firmware output can precede the token on the same line (e.g.
/// `homing moving...ok`), so any line containing it counts.
pub fn is_acknowledgement(line: &str) -> bool {
	line.contains(ACKNOWLEDGEMENT)
}

/// Whether `line` is the device's boot banner.
pub fn is_reset_banner(line: &str) -> bool {
	line.contains(RESET_BANNER)
}

/// How a completed response ended.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Terminal {
	/// Enough acknowledgements were received.
	Acknowledged,
	/// The expected boot banner was received.
	ResetDetected,
}

/// The state of a [`ResponseMatcher`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MatchState {
	/// More lines are needed.
	Collecting,
	/// The response is complete.
	Terminal(Terminal),
}

/// Decides when the response to a command is complete.
///
/// Feed it every line read after sending a command with [`push`](Self::push)
/// until [`state`](Self::state) is [`MatchState::Terminal`]. Error and alarm
/// reports do not end the response: the device may still acknowledge the
/// command afterwards.
#[derive(Debug, Clone)]
pub struct ResponseMatcher {
	threshold: usize,
	reset_expected: bool,
	acknowledgements: usize,
	lines: Vec<String>,
	state: MatchState,
}

impl ResponseMatcher {
	/// The number of acknowledgements that complete a response by default.
	pub const DEFAULT_THRESHOLD: usize = 1;

	/// Create a matcher that completes after `threshold` acknowledgements.
	///
	/// A threshold of zero is treated as one. If `reset_expected` is set, the
	/// boot banner also completes the response instead of being an error.
	pub fn new(threshold: usize, reset_expected: bool) -> Self {
		ResponseMatcher {
			threshold: threshold.max(1),
			reset_expected,
			acknowledgements: 0,
			lines: Vec::new(),
			state: MatchState::Collecting,
		}
	}

	/// Consume the next line and return its classification.
	///
	/// Blank lines (reads that timed out with nothing received) are ignored.
	/// Lines pushed after the response is complete are classified but
	/// otherwise ignored.
	pub fn push(&mut self, line: &str) -> Result<ResponseLine, UnexpectedResetError> {
		let class = ResponseLine::classify(line);
		if line.is_empty() || self.is_terminal() {
			return Ok(class);
		}
		self.lines.push(line.to_string());

		if is_reset_banner(line) {
			if !self.reset_expected {
				return Err(UnexpectedResetError::new(std::mem::take(&mut self.lines)));
			}
			self.state = MatchState::Terminal(Terminal::ResetDetected);
		} else if is_acknowledgement(line) {
			self.acknowledgements += 1;
			if self.acknowledgements >= self.threshold {
				self.state = MatchState::Terminal(Terminal::Acknowledged);
			}
		}
		Ok(class)
	}

	/// The current state.
	pub fn state(&self) -> MatchState {
		self.state
	}

	/// Whether the response is complete.
	pub fn is_terminal(&self) -> bool {
		matches!(self.state, MatchState::Terminal(_))
	}

	/// The lines collected so far.
	pub fn lines(&self) -> &[String] {
		&self.lines
	}

	/// Consume the matcher and return the collected lines.
	pub fn into_lines(self) -> Vec<String> {
		self.lines
	}
}

impl Default for ResponseMatcher {
	fn default() -> Self {
		ResponseMatcher::new(ResponseMatcher::DEFAULT_THRESHOLD, false)
	}
}
