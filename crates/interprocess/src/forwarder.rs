//! The interprocess forwarder.
//!
//! A thread that wants interprocess reach without owning sockets
//! relays through the portal over the inner forwarding channel: its
//! publishes become [`ForwardedPublication`] records, its subscribes
//! become subscription records the portal reference-counts into socket
//! filters. Data arriving for a forwarded subscription is parsed on
//! the portal's thread and re-published into the interthread hub, so
//! the forwarder's own `poll` delivers it like any local publication.

use std::sync::Arc;

use nerite_core::{
	FORWARD_GROUP, ForwardedUnsubscribeAll, Group, MarshalError, RegexSubscription,
	SubscriptionAction, Transporter, TransporterConfig, TypedSubscription, current_thread_id,
};
use nerite_interthread::{Hub, InterThreadTransporter};
use nerite_marshal::Marshallable;

/// Per-thread facade that reaches the interprocess layer through a
/// co-resident portal instead of its own sockets.
pub struct InterProcessForwarder {
	inner: InterThreadTransporter,
}

impl InterProcessForwarder {
	/// A forwarder over the process-global hub.
	#[must_use]
	pub fn new() -> Self {
		Self::on(Hub::global())
	}

	/// A forwarder over an explicit hub. The portal bridging to the
	/// sockets must share it.
	#[must_use]
	pub fn on(hub: Arc<Hub>) -> Self {
		Self {
			inner: InterThreadTransporter::on(hub),
		}
	}

	/// The interthread transporter deliveries arrive through.
	#[must_use]
	pub fn inner(&self) -> &InterThreadTransporter {
		&self.inner
	}

	/// Serializes `value` for the portal to transmit, and delivers it
	/// locally through the hub in parallel.
	pub fn publish<T: Marshallable>(
		&self,
		value: T,
		group: &Group,
		cfg: &TransporterConfig,
	) -> Result<(), MarshalError> {
		self.publish_shared(Arc::new(value), group, cfg)
	}

	/// [`publish`](Self::publish) for an already-shared handle.
	pub fn publish_shared<T: Marshallable>(
		&self,
		value: Arc<T>,
		group: &Group,
		cfg: &TransporterConfig,
	) -> Result<(), MarshalError> {
		let record = nerite_marshal::forwarded_publication(value.as_ref(), group)?;
		self.inner.publish(record, &FORWARD_GROUP, &TransporterConfig::default());
		self.inner.publish_shared(value, group, cfg);
		Ok(())
	}

	/// Subscribes `(T, group)` on the calling thread, both locally and
	/// through the portal's socket filter.
	///
	/// The forwarded record's dispatch parses incoming payloads and
	/// re-publishes them onto the hub, where the local subscription
	/// (and any other interested thread) picks them up.
	pub fn subscribe<T, F>(&self, group: &Group, handler: F)
	where
		T: Marshallable,
		F: Fn(Arc<T>) + Send + Sync + 'static,
	{
		self.inner.subscribe::<T, _>(group, handler);

		let hub = Arc::clone(self.inner.hub());
		let deliver_group = group.clone();
		let dispatch: Arc<dyn Fn(&[u8]) + Send + Sync> = Arc::new(move |bytes| {
			match T::from_bytes(bytes) {
				Ok(value) => {
					hub.publish_shared(Arc::new(value), &deliver_group, &TransporterConfig::default());
				}
				Err(error) => {
					tracing::warn!(%error, type_name = T::TYPE_NAME, "dropping undecodable payload");
				}
			}
		});
		let record = TypedSubscription::new(
			group.clone(),
			T::SCHEME,
			T::TYPE_NAME,
			SubscriptionAction::Subscribe,
			dispatch,
		);
		self.inner.publish(record, &FORWARD_GROUP, &TransporterConfig::default());
	}

	/// Removes the calling thread's hold on `(T, group)`.
	pub fn unsubscribe<T: Marshallable>(&self, group: &Group) {
		self.inner.unsubscribe::<T>(group);

		let record = TypedSubscription::new(
			group.clone(),
			T::SCHEME,
			T::TYPE_NAME,
			SubscriptionAction::Unsubscribe,
			Arc::new(|_| {}),
		);
		self.inner.publish(record, &FORWARD_GROUP, &TransporterConfig::default());
	}

	/// Forwards a regex subscription to the portal.
	pub fn subscribe_regex(
		&self,
		schemes: impl Into<Vec<nerite_core::MarshalScheme>>,
		type_regex: &str,
		group_regex: &str,
		handler: impl Fn(&[u8], nerite_core::MarshalScheme, &str, &str) + Send + Sync + 'static,
	) -> Result<(), regex::Error> {
		let record = RegexSubscription::new(schemes, type_regex, group_regex, Arc::new(handler))?;
		self.inner.publish(record, &FORWARD_GROUP, &TransporterConfig::default());
		Ok(())
	}

	/// Releases every key this thread forwarded, and its local
	/// subscriptions with them.
	pub fn unsubscribe_all(&self) {
		self.inner.publish(
			ForwardedUnsubscribeAll {
				thread: current_thread_id(),
			},
			&FORWARD_GROUP,
			&TransporterConfig::default(),
		);
		self.inner.unsubscribe_all();
	}

	/// Drains locally delivered data, invoking handlers on the calling
	/// thread.
	pub fn poll(&self, timeout: Option<std::time::Duration>) -> usize {
		self.inner.poll(timeout)
	}
}

impl Default for InterProcessForwarder {
	fn default() -> Self {
		Self::new()
	}
}

impl Drop for InterProcessForwarder {
	fn drop(&mut self) {
		self.inner.publish(
			ForwardedUnsubscribeAll {
				thread: current_thread_id(),
			},
			&FORWARD_GROUP,
			&TransporterConfig::default(),
		);
	}
}
