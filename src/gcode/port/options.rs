//! Types defining the different options when opening a port.

use super::Port;
use crate::{
    backend::{Backend, Serial},
    error::Error,
    gcode::{discover, ResponseMatcher},
};
use serialport as sp;
use std::time::Duration;

/// The terminator appended to every command line.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum LineEnding {
    /// `\n`
    Lf,
    /// `\r\n`
    CrLf,
}

impl LineEnding {
    /// The terminator's text.
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }
}

impl Default for LineEnding {
    /// The platform's native line ending.
    fn default() -> Self {
        if cfg!(windows) {
            LineEnding::CrLf
        } else {
            LineEnding::Lf
        }
    }
}

/// Options controlling how a [`Port`] exchanges commands and responses.
///
/// ## Example
///
/// ```rust
/// # use mirobot::{backend::Backend, gcode::{Port, SessionOptions}};
/// # use std::time::Duration;
/// # fn wrapper<B: Backend>(backend: B) {
/// let port = Port::from_backend(
///     backend,
///     SessionOptions::new()
///         .ack_threshold(2)
///         .idle_deadline(Some(Duration::from_secs(30))),
/// );
/// # }
/// ```
#[derive(Debug, Copy, Clone)]
pub struct SessionOptions {
    pub(crate) ack_threshold: usize,
    pub(crate) line_ending: LineEnding,
    pub(crate) line_timeout: Duration,
    pub(crate) poll_interval: Duration,
    pub(crate) status_retry_backoff: Duration,
    pub(crate) ack_deadline: Option<Duration>,
    pub(crate) idle_deadline: Option<Duration>,
}

impl SessionOptions {
    /// The default time to wait for an acknowledgement: 60 seconds.
    pub const DEFAULT_ACK_DEADLINE: Duration = Duration::from_secs(60);
    /// The default time to wait for a device to become idle: 5 minutes.
    pub const DEFAULT_IDLE_DEADLINE: Duration = Duration::from_secs(300);

    /// Create the default set of options.
    ///
    /// Equivalent to [`default`](SessionOptions::default).
    pub fn new() -> Self {
        SessionOptions {
            ack_threshold: ResponseMatcher::DEFAULT_THRESHOLD,
            line_ending: LineEnding::default(),
            line_timeout: Duration::from_millis(100),
            poll_interval: Duration::from_millis(100),
            status_retry_backoff: Duration::from_millis(100),
            ack_deadline: Some(SessionOptions::DEFAULT_ACK_DEADLINE),
            idle_deadline: Some(SessionOptions::DEFAULT_IDLE_DEADLINE),
        }
    }

    /// Set how many acknowledgements complete a response.
    ///
    /// The default is 1. Zero is treated as 1.
    pub fn ack_threshold(&mut self, threshold: usize) -> &mut Self {
        self.ack_threshold = threshold.max(1);
        self
    }

    /// Set the terminator appended to commands.
    ///
    /// The default is the platform's native line ending.
    pub fn line_ending(&mut self, line_ending: LineEnding) -> &mut Self {
        self.line_ending = line_ending;
        self
    }

    /// Set how long a single line read may take.
    ///
    /// The default is 100 ms.
    pub fn line_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.line_timeout = timeout;
        self
    }

    /// Set the pause between status queries while waiting for the idle state.
    ///
    /// The default is 100 ms.
    pub fn poll_interval(&mut self, interval: Duration) -> &mut Self {
        self.poll_interval = interval;
        self
    }

    /// Set the pause before re-querying after an unparsable status report.
    ///
    /// The default is 100 ms.
    pub fn status_retry_backoff(&mut self, backoff: Duration) -> &mut Self {
        self.status_retry_backoff = backoff;
        self
    }

    /// Set how long to wait for a command to be acknowledged.
    ///
    /// If `None`, the wait is unbounded. The default is
    /// [`DEFAULT_ACK_DEADLINE`](Self::DEFAULT_ACK_DEADLINE).
    pub fn ack_deadline(&mut self, deadline: Option<Duration>) -> &mut Self {
        self.ack_deadline = deadline;
        self
    }

    /// Set how long to wait for the device to become idle.
    ///
    /// If `None`, the wait is unbounded. The default is
    /// [`DEFAULT_IDLE_DEADLINE`](Self::DEFAULT_IDLE_DEADLINE).
    pub fn idle_deadline(&mut self, deadline: Option<Duration>) -> &mut Self {
        self.idle_deadline = deadline;
        self
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions::new()
    }
}

/// Options for configuring and opening a serial port.
///
/// ## Example
///
/// ```rust
/// # use mirobot::gcode::OpenSerialOptions;
/// # use std::time::Duration;
/// # fn wrapper() -> Result<(), Box<dyn std::error::Error>> {
/// let mut port = OpenSerialOptions::new()
///     .timeout(Some(Duration::from_millis(50)))
///     .open("/dev/ttyUSB0")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct OpenSerialOptions {
    /// The custom baud rate
    baud_rate: u32,
    /// The number of stop bits
    stop_bits: sp::StopBits,
    /// Whether to request exclusive access to the port
    exclusive: bool,
    /// The custom timeout
    timeout: Option<Duration>,
    /// Whether to wait for the device's boot banner after opening
    handshake: bool,
    /// How long to wait for the boot banner
    handshake_deadline: Option<Duration>,
    /// Options for the session on the opened port
    session: SessionOptions,
}

impl OpenSerialOptions {
    /// The default baud rate: 115,200.
    pub const DEFAULT_BAUD_RATE: u32 = 115_200;

    /// Create a blank set of options ready for configuration.
    ///
    /// The default baud rate and read timeout are 115,200 and 100 ms,
    /// respectively, with one stop bit and exclusive access. After opening,
    /// the port waits up to 10 seconds for the device's boot banner.
    ///
    /// Equivalent to [`default`](OpenSerialOptions::default).
    pub fn new() -> Self {
        OpenSerialOptions {
            baud_rate: OpenSerialOptions::DEFAULT_BAUD_RATE,
            stop_bits: sp::StopBits::One,
            exclusive: true,
            timeout: Some(Duration::from_millis(100)),
            handshake: true,
            handshake_deadline: Some(Duration::from_secs(10)),
            session: SessionOptions::new(),
        }
    }

    /// Set a custom baud rate.
    ///
    /// The default is 115,200.
    pub fn baud_rate(&mut self, baud_rate: u32) -> &mut Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the number of stop bits.
    ///
    /// The default is one.
    pub fn stop_bits(&mut self, stop_bits: sp::StopBits) -> &mut Self {
        self.stop_bits = stop_bits;
        self
    }

    /// Set whether to request exclusive access to the port.
    ///
    /// Only honoured on Unix; ports are always exclusive on Windows. The
    /// default is `true`.
    pub fn exclusive(&mut self, exclusive: bool) -> &mut Self {
        self.exclusive = exclusive;
        self
    }

    /// Set a custom read timeout.
    ///
    /// If duration is `None`, reads will block indefinitely. The default is 100 ms.
    pub fn timeout(&mut self, duration: Option<Duration>) -> &mut Self {
        self.timeout = duration;
        self
    }

    /// Set whether to wait for the device's boot banner (or an
    /// acknowledgement) after opening the port, and for how long.
    ///
    /// Opening the port normally resets the device, which then prints its
    /// banner. The default is to wait up to 10 seconds.
    pub fn handshake(&mut self, handshake: bool, deadline: Option<Duration>) -> &mut Self {
        self.handshake = handshake;
        self.handshake_deadline = deadline;
        self
    }

    /// Set the options for the session on the opened port.
    pub fn session(&mut self, session: &SessionOptions) -> &mut Self {
        self.session = *session;
        self
    }

    /// Open a [`Serial`] port at the specified path.
    fn open_serial_port(&self, path: &str) -> Result<Serial, Error> {
        // The baud rate passed to `new` is ignored, so define it with the
        // `baud_rate` method below.
        #[allow(unused_mut)]
        let mut port = sp::new(path, OpenSerialOptions::DEFAULT_BAUD_RATE)
            .data_bits(sp::DataBits::Eight)
            .parity(sp::Parity::None)
            .flow_control(sp::FlowControl::None)
            .stop_bits(self.stop_bits)
            // The serialport API does not support infinite timeouts, so simply
            // set the timeout to the largest possible duration if `timeout` is
            // `None`, which is practically infinite.
            .timeout(self.timeout.unwrap_or(Duration::MAX))
            .baud_rate(self.baud_rate)
            .open_native()?;
        #[cfg(unix)]
        port.set_exclusive(self.exclusive)?;
        Ok(Serial::new(port))
    }

    /// Perform the configured handshake on a freshly opened port.
    fn connect<'a, B: Backend>(&self, mut port: Port<'a, B>) -> Result<Port<'a, B>, Error> {
        if self.handshake {
            let lines = port.wait_for_boot(self.handshake_deadline)?;
            log::debug!(
                "{} connected after {} line(s)",
                port.name().as_deref().unwrap_or(crate::backend::UNKNOWN_BACKEND_NAME),
                lines.len()
            );
        }
        Ok(port)
    }

    /// Open the port at the specified path with the custom options.
    pub fn open<'a>(&self, path: &str) -> Result<Port<'a, Serial>, Error> {
        self.connect(Port::from_backend(self.open_serial_port(path)?, &self.session))
    }

    /// Open the first port a device appears to be connected to.
    ///
    /// See [`discover::find_port`] for how the port is chosen.
    pub fn open_auto<'a>(&self) -> Result<Port<'a, Serial>, Error> {
        let path = discover::find_port(self.baud_rate)?;
        self.open(&path)
    }

    /// Open the port at the specified path with the custom options.
    ///
    /// The type of the underlying backend is erased via dynamic dispatch,
    /// which does have runtime overhead. [`OpenSerialOptions::open`] should
    /// generally be used instead, except when the type of the underlying
    /// backend may not be known at compile time.
    pub fn open_dyn<'a>(&self, path: &str) -> Result<Port<'a, Box<dyn Backend>>, Error> {
        let backend: Box<dyn Backend> = Box::new(self.open_serial_port(path)?);
        self.connect(Port::from_backend(backend, &self.session))
    }
}

impl Default for OpenSerialOptions {
    fn default() -> Self {
        OpenSerialOptions::new()
    }
}
