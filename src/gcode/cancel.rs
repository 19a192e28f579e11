//! Cancellation of blocking waits from another thread.

use std::{
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
	time::{Duration, Instant},
};

/// How often a cancellable sleep checks for cancellation.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A handle for cancelling a port's blocking waits.
///
/// Get one from [`Port::cancel_token`](super::Port::cancel_token) and move it
/// to another thread. Calling [`cancel`](Self::cancel) makes the port's
/// current (or next) wait for an acknowledgement or for the idle state return
/// [`CancelledError`](crate::error::CancelledError). The request is consumed
/// when it is reported.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
	cancelled: Arc<AtomicBool>,
}

impl CancelToken {
	/// Create a token that has not been cancelled.
	pub fn new() -> Self {
		CancelToken::default()
	}

	/// Request cancellation.
	pub fn cancel(&self) {
		self.cancelled.store(true, Ordering::SeqCst);
	}

	/// Whether cancellation has been requested.
	pub fn is_cancelled(&self) -> bool {
		self.cancelled.load(Ordering::SeqCst)
	}

	/// Clear the request, returning whether there was one.
	pub(crate) fn take(&self) -> bool {
		self.cancelled.swap(false, Ordering::SeqCst)
	}

	/// Sleep for `duration`, waking early if cancellation is requested.
	///
	/// Returns `false` if the sleep was cut short.
	pub(crate) fn sleep(&self, duration: Duration) -> bool {
		let deadline = Instant::now() + duration;
		loop {
			if self.is_cancelled() {
				return false;
			}
			let remaining = deadline.saturating_duration_since(Instant::now());
			if remaining.is_zero() {
				return true;
			}
			std::thread::sleep(remaining.min(CANCEL_POLL_INTERVAL));
		}
	}
}
