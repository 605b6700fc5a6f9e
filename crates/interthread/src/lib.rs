//! Interthread publish/subscribe broker.
//!
//! # Mental model
//!
//! - The broker is a process-wide registry mapping (payload type,
//!   group) to per-thread FIFO queues of shared handles; publishing
//!   copies nothing, it clones `Arc`s.
//! - Every subscriber owns its handlers: they run on the subscribing
//!   thread, inside that thread's `poll`, never on a publisher's
//!   thread.
//! - A thread sleeps in `poll(timeout)` on its own condition variable;
//!   publishers signal it through the poll-mutex handshake so a wakeup
//!   can never fall into the gap between the empty check and `wait`.
//! - State lives in a [`Hub`]; [`Hub::global`] is the process-wide
//!   instance, and tests build private hubs for isolation.
//!
//! # Invariants
//!
//! 1. Per-edge FIFO: for a fixed (publisher thread, subscriber thread,
//!    type, group), delivery order equals publish order.
//!    - Enforced in: `Store::publish` (append under the queue mutex),
//!      `Store::poll` (front-to-back drain).
//!    - Tested by: `scenarios::fan_out_preserves_per_edge_order`.
//! 2. Self-delivery happens iff `TransporterConfig::echo` is set.
//!    - Enforced in: `Store::publish`.
//!    - Tested by: `scenarios::echo_controls_self_delivery`.
//! 3. Handlers are invoked exactly once per queued handle, with no
//!    broker lock held.
//!    - Enforced in: `Store::poll` (drain under lock, dispatch after).
//!    - Tested by: `store::tests::release_fires_once_at_first_handle`.
//! 4. Subscribe is idempotent per (thread, type, group); unsubscribe
//!    of the last local subscriber drops the queue.
//!    - Enforced in: `Store::subscribe`, `Store::unsubscribe`.
//!    - Tested by: `store::tests::duplicate_subscribe_replaces_the_handler`.
//!
//! Threads must call [`Transporter::unsubscribe_all`] before exiting;
//! dropping the thread's transporter does it as a scope guard.

mod hub;
mod store;

use std::sync::Arc;

use parking_lot::MutexGuard;

use nerite_core::{Group, PollWaiter, Transporter, TransporterConfig, current_thread_id};

pub use hub::Hub;

/// Per-thread facade over a [`Hub`].
///
/// Cheap to construct; a thread typically keeps one for its lifetime.
/// Dropping it unsubscribes the current thread from the hub.
pub struct InterThreadTransporter {
	hub: Arc<Hub>,
	waiter: Arc<PollWaiter>,
}

impl InterThreadTransporter {
	/// A transporter on the process-global hub.
	#[must_use]
	pub fn new() -> Self {
		Self::on(Hub::global())
	}

	/// A transporter on an explicit hub.
	#[must_use]
	pub fn on(hub: Arc<Hub>) -> Self {
		Self::with_waiter(hub, Arc::new(PollWaiter::new()))
	}

	/// A transporter sharing an outer layer's waiter, so one `poll`
	/// sleeps on both the broker and the outer source.
	#[must_use]
	pub fn with_waiter(hub: Arc<Hub>, waiter: Arc<PollWaiter>) -> Self {
		Self { hub, waiter }
	}

	/// The hub this transporter publishes into.
	#[must_use]
	pub fn hub(&self) -> &Arc<Hub> {
		&self.hub
	}
}

impl Default for InterThreadTransporter {
	fn default() -> Self {
		Self::new()
	}
}

impl Transporter for InterThreadTransporter {
	fn waiter(&self) -> &Arc<PollWaiter> {
		&self.waiter
	}

	fn publish_shared<T: Send + Sync + 'static>(
		&self,
		value: Arc<T>,
		group: &Group,
		cfg: &TransporterConfig,
	) {
		self.hub.publish_shared(value, group, cfg);
	}

	fn subscribe<T, F>(&self, group: &Group, handler: F)
	where
		T: Send + Sync + 'static,
		F: Fn(Arc<T>) + Send + Sync + 'static,
	{
		self.hub
			.store::<T>()
			.subscribe(group, current_thread_id(), &self.waiter, Arc::new(handler));
	}

	fn unsubscribe<T: Send + Sync + 'static>(&self, group: &Group) {
		if let Some(store) = self.hub.try_store::<T>() {
			store.unsubscribe(group, current_thread_id());
		}
	}

	fn unsubscribe_all(&self) {
		self.hub.unsubscribe_all(current_thread_id());
	}

	fn poll_once(&self, guard: &mut Option<MutexGuard<'_, ()>>) -> usize {
		let mut release = || {
			let _ = guard.take();
		};
		self.hub.poll_all(current_thread_id(), &mut release)
	}
}

impl Drop for InterThreadTransporter {
	fn drop(&mut self) {
		self.hub.unsubscribe_all(current_thread_id());
	}
}
