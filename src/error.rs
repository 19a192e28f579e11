//! Error types.
//!
//! Each error is represented by a unique type that implements [`std::error::Error`].
//! However, most APIs return more than one kind of error and so will return one
//! of the higher level [enums](#enums), such as [`ValidationError`] or
//! [`Error`]. Where appropriate, the error types are convertible to the
//! higher level enums, allowing them to be used with `?`:
//!
//! ```
//! use mirobot::error::{ValidationError, Error};
//!
//! fn foo() -> Result<(), ValidationError> {
//!     // ...
//! # unimplemented!();
//! }
//!
//! fn bar() -> Result<(), Error> {
//!     foo()?;
//!     // ...
//! # Ok(())
//! }
//! ```
//!
//! Errors that carry device output give access to it, so nothing the device
//! reported is lost when an error propagates:
//!
//! ```
//! # use mirobot::error::UnexpectedResetError;
//! #
//! # fn wrapper() {
//! let error: UnexpectedResetError = //...
//! # todo!();
//! let lines: &[String] = error.lines();
//! # }
//! ```

use std::{io, path::PathBuf, time::Duration};

/// Implement Error and Display traits for the specified type.
///
/// If type is generic, define the trait bounds before the type as you normally
/// would, but omitting the impl keyword (for brevity). After the type define
/// the format string and any arguments it should reference after `self =>` (to
/// abide by macro hygiene rules).
macro_rules! impl_error_display {
    (
        $( <$($t:tt : $bound:path),+> )?
        $name:path,
        $self:ident =>
        $display:literal
        $(,
            $($arg:expr),+
        )?
    ) => {
        impl$(<$($t : $bound),+>)? std::error::Error for $name {}

        impl$(<$($t : $bound),+>)? std::fmt::Display for $name {
            fn fmt(&$self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(
                    f,
                    $display
                    $(,
                        $($arg),+
                    )?
                )
            }
        }
    };
}

macro_rules! impl_is_timeout {
    ($name:ident) => {
        impl $name {
            /// A convenience function for determining if the error is due to the
            /// port timing out.
            pub fn is_timeout(&self) -> bool {
                matches!(self, $name::Io(e) if e.kind() == std::io::ErrorKind::TimedOut)
            }
        }
    };
}

macro_rules! impl_from_serialport_error {
    ($name:ident) => {
        impl From<serialport::Error> for $name {
            fn from(other: serialport::Error) -> Self {
                match other.kind() {
                    serialport::ErrorKind::NoDevice => $name::SerialDeviceInUseOrDisconnected(
                        SerialDeviceInUseOrDisconnectedError(other.description.into_boxed_str()),
                    ),
                    serialport::ErrorKind::InvalidInput => $name::Io(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        other.description,
                    )),
                    serialport::ErrorKind::Unknown => {
                        $name::Io(io::Error::new(io::ErrorKind::Other, other.description))
                    }
                    serialport::ErrorKind::Io(kind) => {
                        $name::Io(io::Error::new(kind, other.description))
                    }
                }
            }
        }
    };
}

/// Define error enums that contain concrete error types (not other error enums).
///
/// From and TryFrom traits will be implemented for the enum and it's underlying
/// errors. The enum's Display implementation will defer to the underlying errors'
/// Display implementations.
///
/// Simple implementations of From and TryFrom with other error enums can be
/// added by appending a succinct impl block, which assumes that:
///   * it is being implemented for this error enum,
///   * each variant has a single tuple value, and can be converted to the value
///     in this enum with its own From implementation.
///
/// ```compile_fail
/// # // This fails to compile because the macro is not exported.
/// error_enum!{
///     // This defines the enum and From/TryFrom between ThisError and A and B.
///     #[non_exhaustive]
///     pub enum ThisError {
///         VariantA(A),
///         VariantB(B),
///         // ...
///     }
///
///     // This implements a simple From/TryFrom between ThisError and OtherType.
///     impl From<OtherType> {
///         FromVariantA => VariantA,
///         // ...
///     }
/// }
/// ```
macro_rules! error_enum {
    (
        $(#[$attr:meta])*
        pub enum $name:ident {
            $(
                $variant:ident($inner:path)
            ),+
            $(,)?
        }
        // Additional information for From/TryFrom impl blocks.
        $(
            impl From<$from_t:ident>
            {
                $($from_variant:ident => $to_variant:ident),+
                $(,)?
            }
        )*
    ) => {
        // Define the error enum itself
        $(
            #[$attr]
        )*
        #[allow(missing_docs)]
        pub enum $name {
            $(
                $variant($inner)
            ),+
        }

        impl std::error::Error for $name {}

        // Defer the display to the inner error type
        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        $name::$variant(e) => e.fmt(f)
                    ),+
                }
            }
        }

        // Allow the enum to be convertible from an infallible error
        impl From<std::convert::Infallible> for $name {
            fn from(_: std::convert::Infallible) -> Self {
                unreachable!();
            }
        }

        // Conversions with underlying errors
        $(
            impl From<$inner> for $name {
                fn from(other: $inner) -> Self {
                    $name::$variant(other)
                }
            }

            impl TryFrom<$name> for $inner {
                type Error = $name;
                fn try_from(other: $name) -> Result<Self, Self::Error> {
                    match other {
                        $name::$variant(value) => Ok(value),
                        value => Err(value)
                    }
                }
            }
        )+

        // Conversions from other enum errors
        $(
            impl From<$from_t> for $name {
                fn from(other: $from_t) -> Self {
                    match other {
                        $($from_t::$from_variant(e) => $name::$to_variant(From::from(e))),+
                    }
                }
            }

            impl TryFrom<$name> for $from_t {
                type Error = $name;
                fn try_from(other: $name) -> Result<Self, Self::Error> {
                    match other {
                        $(
                            $name::$to_variant(e) => Ok($from_t::$from_variant(From::from(e)))
                        ),+
                        ,
                        _ => Err(other)
                    }
                }
            }
        )*
    };
}

/// The specified device is either disconnected or already in use by another process.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct SerialDeviceInUseOrDisconnectedError(Box<str>);

impl_error_display! {
    SerialDeviceInUseOrDisconnectedError,
    self =>
    "the specified device is either disconnected or already in use by another process: {}", self.0
}

/// A line received from the device was not valid UTF-8.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct LineDecodeError(Box<[u8]>);

impl LineDecodeError {
    /// Create an instance of the error.
    pub(crate) fn new<R: AsRef<[u8]>>(bytes: R) -> Self {
        LineDecodeError(Box::from(bytes.as_ref()))
    }

    /// Get the bytes of the undecodable line.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl_error_display! {
    LineDecodeError,
    self =>
    "received a line that is not valid UTF-8: {:?}", String::from_utf8_lossy(&self.0)
}

/// The device reported that it was reset while no reset was expected.
///
/// The device has rebooted mid-session and the connection must be
/// re-established. The lines collected before the reset banner, including the
/// banner itself, are retained.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct UnexpectedResetError(Vec<String>);

impl UnexpectedResetError {
    pub(crate) fn new(lines: Vec<String>) -> Self {
        UnexpectedResetError(lines)
    }

    /// The lines received before and including the reset banner.
    pub fn lines(&self) -> &[String] {
        &self.0
    }
}

impl From<UnexpectedResetError> for Vec<String> {
    fn from(other: UnexpectedResetError) -> Self {
        other.0
    }
}

impl_error_display! {
    UnexpectedResetError,
    self =>
    "the device was unexpectedly reset (received {} line(s))", self.0.len()
}

/// A line did not match the status report grammar.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatusParseError {
    line: Box<str>,
    reason: &'static str,
}

impl StatusParseError {
    pub(crate) fn new(line: &str, reason: &'static str) -> Self {
        StatusParseError {
            line: line.into(),
            reason,
        }
    }

    /// The line that could not be parsed.
    pub fn line(&self) -> &str {
        &self.line
    }
}

impl_error_display! {
    StatusParseError,
    self =>
    "cannot parse status report ({}): {:?}", self.reason, self.line
}

/// A variable command (`$N=value`) is malformed and was not transmitted.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct VariableCommandError(Box<str>);

impl VariableCommandError {
    pub(crate) fn new(command: &str) -> Self {
        VariableCommandError(command.into())
    }

    /// The rejected command.
    pub fn command(&self) -> &str {
        &self.0
    }
}

impl_error_display! {
    VariableCommandError,
    self =>
    "malformed variable command {:?}: expected `$<number>=<number>`", self.0
}

/// An argument to a command was out of range and was not transmitted.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct InvalidArgumentError(Box<str>);

impl InvalidArgumentError {
    pub(crate) fn new<S: Into<Box<str>>>(message: S) -> Self {
        InvalidArgumentError(message.into())
    }
}

impl_error_display! {
    InvalidArgumentError,
    self =>
    "invalid argument: {}", self.0
}

/// A configuration reset file could not be read.
#[derive(Debug)]
pub struct ResetFileError {
    path: PathBuf,
    source: io::Error,
}

impl ResetFileError {
    pub(crate) fn new(path: PathBuf, source: io::Error) -> Self {
        ResetFileError { path, source }
    }

    /// The path of the reset file.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// The underlying I/O error.
    pub fn io_error(&self) -> &io::Error {
        &self.source
    }
}

impl_error_display! {
    ResetFileError,
    self =>
    "cannot read reset file {}: {}", self.path.display(), self.source
}

/// No serial port suitable for a device could be found.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct NoPortFoundError(Box<str>);

impl NoPortFoundError {
    pub(crate) fn new<S: Into<Box<str>>>(reason: S) -> Self {
        NoPortFoundError(reason.into())
    }
}

impl_error_display! {
    NoPortFoundError,
    self =>
    "no port found: {}", self.0
}

/// The port was used after being closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotConnectedError;

impl_error_display! {
    NotConnectedError,
    self =>
    "the port is not connected"
}

/// A blocking wait was cancelled via its [`CancelToken`](crate::gcode::CancelToken).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CancelledError;

impl_error_display! {
    CancelledError,
    self =>
    "the operation was cancelled"
}

/// A blocking wait did not complete before its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeadlineExceededError {
    waiting_for: &'static str,
    deadline: Duration,
}

impl DeadlineExceededError {
    pub(crate) fn new(waiting_for: &'static str, deadline: Duration) -> Self {
        DeadlineExceededError {
            waiting_for,
            deadline,
        }
    }

    /// The deadline that elapsed.
    pub fn deadline(&self) -> Duration {
        self.deadline
    }
}

impl_error_display! {
    DeadlineExceededError,
    self =>
    "gave up waiting for {} after {:?}", self.waiting_for, self.deadline
}

error_enum! {
    /// A command was rejected before being transmitted.
    #[derive(Debug)]
    #[non_exhaustive]
    pub enum ValidationError {
        VariableCommand(VariableCommandError),
        InvalidArgument(InvalidArgumentError),
    }
}

error_enum! {
    /// Any error returned while communicating with a device.
    #[derive(Debug)]
    #[non_exhaustive]
    pub enum Error {
        Io(io::Error),
        SerialDeviceInUseOrDisconnected(SerialDeviceInUseOrDisconnectedError),
        LineDecode(LineDecodeError),
        UnexpectedReset(UnexpectedResetError),
        StatusParse(StatusParseError),
        VariableCommand(VariableCommandError),
        InvalidArgument(InvalidArgumentError),
        ResetFile(ResetFileError),
        NoPortFound(NoPortFoundError),
        NotConnected(NotConnectedError),
        Cancelled(CancelledError),
        DeadlineExceeded(DeadlineExceededError),
    }

    impl From<ValidationError> {
        VariableCommand => VariableCommand,
        InvalidArgument => InvalidArgument,
    }
}

impl_is_timeout!(Error);
impl_from_serialport_error!(Error);

impl Error {
    /// Whether the device reported an unexpected reset, after which the
    /// connection must be re-established.
    pub fn is_unexpected_reset(&self) -> bool {
        matches!(self, Error::UnexpectedReset(_))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn validation_errors_convert_both_ways() {
        let err: Error = ValidationError::from(VariableCommandError::new("$21=true")).into();
        assert!(matches!(err, Error::VariableCommand(_)));
        let back = ValidationError::try_from(err).unwrap();
        assert!(matches!(back, ValidationError::VariableCommand(_)));

        let err = Error::from(CancelledError);
        assert!(ValidationError::try_from(err).is_err());
    }

    #[test]
    fn is_timeout() {
        let err = Error::from(io::Error::new(io::ErrorKind::TimedOut, "boom"));
        assert!(err.is_timeout());
        let err = Error::from(io::Error::new(io::ErrorKind::Other, "boom"));
        assert!(!err.is_timeout());
        assert!(!Error::from(CancelledError).is_timeout());
    }

    #[test]
    fn serialport_no_device_is_in_use_or_disconnected() {
        let err = Error::from(serialport::Error::new(
            serialport::ErrorKind::NoDevice,
            "busy",
        ));
        assert!(matches!(err, Error::SerialDeviceInUseOrDisconnected(_)));
    }

    #[test]
    fn reset_error_keeps_lines() {
        let lines = vec!["ok".to_string(), "Using reset pos!".to_string()];
        let err = UnexpectedResetError::new(lines.clone());
        assert_eq!(err.lines(), lines.as_slice());
        assert!(Error::from(err).is_unexpected_reset());
    }
}
