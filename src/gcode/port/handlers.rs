//! Handlers for events on a port.
#[cfg(doc)]
use super::Port;
use super::Direction;
use crate::gcode::ResponseLine;

/// A callback that is called after a line is either transmitted or received.
///
/// See [`Port::set_line_handler`] for more details.
pub type LineHandler<'a> = Box<dyn FnMut(&str, Direction) + Send + 'a>;

/// A callback that is called when the device reports an error or alarm.
///
/// See [`Port::set_anomaly_handler`] for more details.
pub type AnomalyHandler<'a> = Box<dyn FnMut(&ResponseLine) + Send + 'a>;

/// The event handlers registered on a port.
#[derive(Default)]
pub(super) struct Handlers<'a> {
    pub(super) line: Option<LineHandler<'a>>,
    pub(super) anomaly: Option<AnomalyHandler<'a>>,
}

impl std::fmt::Debug for Handlers<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handlers")
            .field("line", &self.line.is_some())
            .field("anomaly", &self.anomaly.is_some())
            .finish()
    }
}
