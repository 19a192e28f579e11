//! Formatting of command lines.

use crate::error::{InvalidArgumentError, ValidationError, VariableCommandError};
use regex::Regex;
use std::{fmt, fmt::Write as _, sync::OnceLock};

/// The value of a command argument.
///
/// Floats are rounded to two decimal places and always carry a decimal point
/// (`1.0`, `-12.35`). Integers are written as is (`2000`).
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Arg {
	/// A value rounded to two decimal places.
	Float(f64),
	/// An integer value.
	Int(i64),
}

impl fmt::Display for Arg {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Arg::Float(value) => f.write_str(&format_float(*value)),
			Arg::Int(value) => write!(f, "{value}"),
		}
	}
}

impl From<f64> for Arg {
	fn from(value: f64) -> Self {
		Arg::Float(value)
	}
}

impl From<f32> for Arg {
	fn from(value: f32) -> Self {
		Arg::Float(value.into())
	}
}

macro_rules! impl_from_int_for_arg {
	($($t:ty),+) => {
		$(
			impl From<$t> for Arg {
				fn from(value: $t) -> Self {
					Arg::Int(value.into())
				}
			}
		)+
	};
}

impl_from_int_for_arg!(u8, u16, u32, i8, i16, i32, i64);

/// Round `value` to two decimal places (ties to even) and format it with at
/// least one fractional digit.
pub fn format_float(value: f64) -> String {
	let rounded = (value * 100.0).round_ties_even() / 100.0;
	let mut text = rounded.to_string();
	if !text.contains('.') {
		text.push_str(".0");
	}
	text
}

/// Build a command line from an instruction and its arguments.
///
/// Arguments without a value are left out entirely.
///
/// ```
/// # use mirobot::gcode::command::{args_string, Arg};
/// let line = args_string(
///     "M21 G90",
///     [("X", Some(Arg::from(1.0))), ("Y", None), ("F", Some(Arg::from(2000)))],
/// );
/// assert_eq!(line, "M21 G90 X1.0 F2000");
/// ```
pub fn args_string<'k, I>(instruction: &str, pairings: I) -> String
where
	I: IntoIterator<Item = (&'k str, Option<Arg>)>,
{
	let mut line = instruction.to_string();
	for (key, value) in pairings {
		if let Some(value) = value {
			// Writing to a String cannot fail.
			let _ = write!(line, " {key}{value}");
		}
	}
	line
}

/// Build a command line like [`args_string`], rejecting arguments that are
/// not finite numbers.
///
/// ```
/// # use mirobot::gcode::command::{checked_args_string, Arg};
/// assert!(checked_args_string("M21 G90", [("X", Some(Arg::from(f64::NAN)))]).is_err());
/// ```
pub fn checked_args_string<'k, I>(instruction: &str, pairings: I) -> Result<String, ValidationError>
where
	I: IntoIterator<Item = (&'k str, Option<Arg>)>,
{
	let pairings: Vec<_> = pairings.into_iter().collect();
	for (key, value) in &pairings {
		if let Some(Arg::Float(value)) = value {
			if !value.is_finite() {
				return Err(InvalidArgumentError::new(format!(
					"{key} must be a finite number, got {value}"
				))
				.into());
			}
		}
	}
	Ok(args_string(instruction, pairings))
}

fn variable_pattern() -> &'static Regex {
	static PATTERN: OnceLock<Regex> = OnceLock::new();
	PATTERN.get_or_init(|| Regex::new(r"^\$\d+=[\d.]+$").expect("the variable pattern is valid"))
}

/// Whether `line` is a variable command (`$N=value`).
pub fn is_variable_command(line: &str) -> bool {
	line.starts_with('$') && line.contains('=')
}

/// Check that a variable command is well formed: `$`, a number, `=`, and a
/// non-negative number.
pub fn validate_variable_command(line: &str) -> Result<(), VariableCommandError> {
	if variable_pattern().is_match(line) {
		Ok(())
	} else {
		Err(VariableCommandError::new(line))
	}
}

/// Build a variable command that sets variable `id` to `value`.
pub fn variable_command<A: Into<Arg>>(id: u32, value: A) -> String {
	format!("${id}={}", value.into())
}
