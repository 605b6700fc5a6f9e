//! The seam between nested transport layers.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::MutexGuard;

use crate::config::TransporterConfig;
use crate::group::Group;
use crate::poller::PollWaiter;

/// In-process publish/subscribe surface an outer layer builds on.
///
/// Handlers run on the subscribing thread, inside that thread's
/// `poll`; payloads are shared read-only handles. Subscribe is
/// idempotent per (thread, type, group): a second subscribe replaces
/// the handler and never produces a second invocation per message.
pub trait Transporter {
	/// The waiter signalled when data arrives for the calling thread.
	/// Outer layers share it so one `poll` sleeps on every source.
	fn waiter(&self) -> &Arc<PollWaiter>;

	/// Publishes a value to every matching subscriber.
	fn publish<T: Send + Sync + 'static>(&self, value: T, group: &Group, cfg: &TransporterConfig) {
		self.publish_shared(Arc::new(value), group, cfg);
	}

	/// Publishes an already-shared handle without copying the payload.
	fn publish_shared<T: Send + Sync + 'static>(
		&self,
		value: Arc<T>,
		group: &Group,
		cfg: &TransporterConfig,
	);

	/// Registers `handler` for `(T, group)` on the calling thread.
	fn subscribe<T, F>(&self, group: &Group, handler: F)
	where
		T: Send + Sync + 'static,
		F: Fn(Arc<T>) + Send + Sync + 'static;

	/// Removes the calling thread's `(T, group)` subscription.
	fn unsubscribe<T: Send + Sync + 'static>(&self, group: &Group);

	/// Removes every subscription owned by the calling thread.
	fn unsubscribe_all(&self);

	/// One non-blocking sweep over the calling thread's queues.
	///
	/// `guard` holds the thread's poll mutex; implementations must
	/// `take` it before invoking the first handler so handlers can
	/// publish without deadlocking.
	fn poll_once(&self, guard: &mut Option<MutexGuard<'_, ()>>) -> usize;

	/// Drains the calling thread's queues, invoking each pending
	/// handler exactly once, and returns the number of invocations.
	///
	/// Waits up to `timeout` for data; zero polls without blocking and
	/// `None` waits indefinitely.
	fn poll(&self, timeout: Option<Duration>) -> usize {
		let waiter = Arc::clone(self.waiter());
		waiter.poll_loop(timeout, |guard| self.poll_once(guard))
	}
}

/// Innermost terminator of a transporter stack: accepts everything,
/// delivers nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTransporter;

impl Transporter for NullTransporter {
	fn waiter(&self) -> &Arc<PollWaiter> {
		static WAITER: OnceLock<Arc<PollWaiter>> = OnceLock::new();
		WAITER.get_or_init(|| Arc::new(PollWaiter::new()))
	}

	fn publish_shared<T: Send + Sync + 'static>(
		&self,
		_value: Arc<T>,
		_group: &Group,
		_cfg: &TransporterConfig,
	) {
	}

	fn subscribe<T, F>(&self, _group: &Group, _handler: F)
	where
		T: Send + Sync + 'static,
		F: Fn(Arc<T>) + Send + Sync + 'static,
	{
	}

	fn unsubscribe<T: Send + Sync + 'static>(&self, _group: &Group) {}

	fn unsubscribe_all(&self) {}

	fn poll_once(&self, _guard: &mut Option<MutexGuard<'_, ()>>) -> usize {
		0
	}
}
