//! A "scope guard" that will reset a port's deadlines when it is goes out of scope.

use crate::{backend::Backend, gcode::Port};
use std::time::Duration;

/// A "scope guard" that will update the port's acknowledgement and idle
/// deadlines and then reset them when it goes out of scope.
///
/// To create a guard, use the port's [`timeout_guard`](crate::gcode::Port::timeout_guard) method.
///
/// While the guard is in scope, the port can only be accessed through the guard.
/// However, because the guard implements [`Deref`](std::ops::Deref) and
/// [`DerefMut`](std::ops::DerefMut) callers can treat the guard as the port.
#[derive(Debug)]
pub struct TimeoutGuard<'p, 'a, B: Backend> {
    /// The underlying port.
    port: &'p mut Port<'a, B>,
    /// The original deadlines that will be restored when the guard is dropped.
    original_ack_deadline: Option<Duration>,
    original_idle_deadline: Option<Duration>,
}

impl<'p, 'a, B: Backend> TimeoutGuard<'p, 'a, B> {
    /// Update the port's deadlines and return a [`TimeoutGuard`] wrapping the port.
    pub(crate) fn new(port: &'p mut Port<'a, B>, deadline: Option<Duration>) -> Self {
        let options = port.options_mut();
        let original_ack_deadline = options.ack_deadline;
        let original_idle_deadline = options.idle_deadline;
        options.ack_deadline(deadline).idle_deadline(deadline);
        TimeoutGuard {
            port,
            original_ack_deadline,
            original_idle_deadline,
        }
    }
}

impl<'a, B: Backend> std::ops::Deref for TimeoutGuard<'_, 'a, B> {
    type Target = Port<'a, B>;
    /// Get a shared reference to the underlying port.
    fn deref(&self) -> &Self::Target {
        self.port
    }
}

impl<B: Backend> std::ops::DerefMut for TimeoutGuard<'_, '_, B> {
    /// Get an exclusive reference to the underlying port.
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.port
    }
}

impl<B: Backend> std::ops::Drop for TimeoutGuard<'_, '_, B> {
    fn drop(&mut self) {
        self.port
            .options_mut()
            .ack_deadline(self.original_ack_deadline)
            .idle_deadline(self.original_idle_deadline);
    }
}
