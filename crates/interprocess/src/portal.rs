//! The interprocess portal, main side.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};
use tokio::sync::mpsc::UnboundedSender;

use nerite_core::{
	ConfigurationError, FORWARD_GROUP, ForwardedPublication, ForwardedUnsubscribeAll, Group,
	Identifier, MarshalScheme, PollWaiter, PortalConfig, RegexSubscription, SubscriptionAction,
	Transporter, TransporterConfig, TypedSubscription, current_thread_id,
};
use nerite_interthread::{Hub, InterThreadTransporter};
use nerite_marshal::Marshallable;
use nerite_marshal::pool::DynamicMessage;
use nerite_proto::{encode_publication, split_publication};

use crate::control::ControlMsg;
use crate::error::PortalError;
use crate::reader;
use crate::tables::{PortalRemoval, SubTables};

/// State shared between the portal facade and the closures it installs
/// on the inner transporter.
struct PortalShared {
	to_reader: UnboundedSender<ControlMsg>,
	tables: Mutex<SubTables>,
	shutdown: AtomicBool,
	process: u32,
	echo: bool,
}

impl PortalShared {
	fn send(&self, msg: ControlMsg) -> Result<(), PortalError> {
		self.to_reader.send(msg).map_err(|_| PortalError::ChannelClosed)
	}

	/// Inner-layer callback: relay an outer layer's serialized
	/// publication onto the publish socket.
	fn forward_publication(&self, data: &ForwardedPublication) {
		let identifier = Identifier {
			group: data.group.name().to_string(),
			scheme: data.scheme,
			type_name: data.type_name.clone(),
			process: self.process,
			thread: current_thread_id(),
		}
		.to_wire();
		let frame = encode_publication(&identifier, &data.bytes);
		if self.send(ControlMsg::Publish { frame }).is_err() {
			tracing::warn!("dropping forwarded publication, reader is gone");
		}
	}

	/// Inner-layer callback: install or remove a forwarder
	/// subscription.
	fn forwarded_subscription(&self, sub: &TypedSubscription) {
		let key = Identifier::process_thread_wildcard(&sub.group, sub.scheme, &sub.type_name);
		match sub.action {
			SubscriptionAction::Subscribe => {
				let install = self.tables.lock().add_forwarder(key.clone(), sub.clone());
				if install {
					let _ = self.send(ControlMsg::Subscribe {
						filter: key.into_bytes(),
					});
				}
			}
			SubscriptionAction::Unsubscribe => {
				let release = self.tables.lock().remove_forwarder(sub.thread, &key);
				if release {
					let _ = self.send(ControlMsg::Unsubscribe {
						filter: key.into_bytes(),
					});
				}
			}
		}
	}

	/// Inner-layer callback: install a forwarded regex subscription.
	fn forwarded_regex(&self, sub: &RegexSubscription) {
		let install = self.tables.lock().add_regex(sub.clone());
		if install {
			let _ = self.send(ControlMsg::Subscribe {
				filter: b"/".to_vec(),
			});
		}
	}

	/// Inner-layer callback: drop every key held by one outer thread.
	fn forwarded_unsubscribe_all(&self, thread: u64) {
		let released = {
			let mut tables = self.tables.lock();
			let mut released = Vec::new();
			for key in tables.forwarder_keys(thread) {
				if tables.remove_forwarder(thread, &key) {
					released.push(key.into_bytes());
				}
			}
			if tables.remove_regex_thread(thread) {
				released.push(b"/".to_vec());
			}
			released
		};
		for filter in released {
			let _ = self.send(ControlMsg::Unsubscribe { filter });
		}
	}
}

/// Per-process facade bridging the inner transporter and the
/// interprocess sockets.
///
/// Construction requires a running router and manager; it blocks until
/// the reader reports the manager handshake complete, failing with
/// [`ConfigurationError`] after the configured manager timeout.
pub struct InterProcessPortal<I: Transporter = InterThreadTransporter> {
	inner: I,
	shared: Arc<PortalShared>,
	from_reader: Mutex<Receiver<ControlMsg>>,
	reader: Option<std::thread::JoinHandle<()>>,
	waiter: Arc<PollWaiter>,
}

impl InterProcessPortal<InterThreadTransporter> {
	/// A portal over the process-global interthread hub.
	pub fn new(cfg: PortalConfig) -> Result<Self, PortalError> {
		Self::with_hub(Hub::global(), cfg)
	}

	/// A portal over an explicit hub.
	pub fn with_hub(hub: Arc<Hub>, cfg: PortalConfig) -> Result<Self, PortalError> {
		Self::with_inner(InterThreadTransporter::on(hub), cfg)
	}
}

impl<I: Transporter> InterProcessPortal<I> {
	/// A portal over an arbitrary inner transporter.
	///
	/// The portal adopts the inner transporter's waiter, so a single
	/// [`poll`](Self::poll) sleeps on both local deliveries and
	/// incoming wire frames.
	pub fn with_inner(inner: I, cfg: PortalConfig) -> Result<Self, PortalError> {
		let waiter = Arc::clone(inner.waiter());
		let (to_reader, reader_ctrl) = tokio::sync::mpsc::unbounded_channel();
		let (to_main, from_reader) = std::sync::mpsc::sync_channel(cfg.receive_queue_size);

		let shared = Arc::new(PortalShared {
			to_reader,
			tables: Mutex::new(SubTables::default()),
			shutdown: AtomicBool::new(false),
			process: cfg.effective_process_id(),
			echo: cfg.echo,
		});

		let manager_timeout = cfg.manager_timeout;
		let reader = reader::spawn(cfg, reader_ctrl, to_main, Arc::clone(&waiter))
			.map_err(|e| ConfigurationError::Handshake(format!("cannot spawn reader: {e}")))?;

		let portal = Self {
			inner,
			shared,
			from_reader: Mutex::new(from_reader),
			reader: Some(reader),
			waiter,
		};
		portal.install_forward_handlers();

		match portal.await_configuration(manager_timeout) {
			Ok(()) => Ok(portal),
			Err(error) => {
				// Constructor failed: portal's Drop still shuts the
				// reader down cleanly.
				Err(error)
			}
		}
	}

	/// Subscribes the portal to the inner forwarding channel, through
	/// which outer layers publish and subscribe across the process
	/// boundary.
	fn install_forward_handlers(&self) {
		let shared = Arc::clone(&self.shared);
		self.inner
			.subscribe(&FORWARD_GROUP, move |data: Arc<ForwardedPublication>| {
				shared.forward_publication(&data);
			});

		let shared = Arc::clone(&self.shared);
		self.inner
			.subscribe(&FORWARD_GROUP, move |sub: Arc<TypedSubscription>| {
				shared.forwarded_subscription(&sub);
			});

		let shared = Arc::clone(&self.shared);
		self.inner
			.subscribe(&FORWARD_GROUP, move |sub: Arc<RegexSubscription>| {
				shared.forwarded_regex(&sub);
			});

		let shared = Arc::clone(&self.shared);
		self.inner
			.subscribe(&FORWARD_GROUP, move |record: Arc<ForwardedUnsubscribeAll>| {
				shared.forwarded_unsubscribe_all(record.thread);
			});
	}

	fn await_configuration(&self, timeout: Duration) -> Result<(), PortalError> {
		let deadline = Instant::now() + timeout;
		let receiver = self.from_reader.lock();
		loop {
			let remaining = deadline
				.checked_duration_since(Instant::now())
				.unwrap_or(Duration::ZERO);
			match receiver.recv_timeout(remaining) {
				Ok(ControlMsg::PubConfiguration { publish, subscribe }) => {
					tracing::info!(?publish, ?subscribe, "portal configured");
					return Ok(());
				}
				Ok(ControlMsg::Error { message }) => {
					return Err(ConfigurationError::Handshake(message).into());
				}
				Ok(_) => {}
				Err(RecvTimeoutError::Timeout) => {
					return Err(ConfigurationError::ManagerTimeout(timeout).into());
				}
				Err(RecvTimeoutError::Disconnected) => {
					return Err(
						ConfigurationError::Handshake("reader thread exited".to_string()).into()
					);
				}
			}
		}
	}

	fn ensure_running(&self) -> Result<(), PortalError> {
		if self.shared.shutdown.load(Ordering::SeqCst) {
			return Err(PortalError::ShutdownInProgress);
		}
		Ok(())
	}

	/// The inner transporter this portal delivers locally through.
	pub fn inner(&self) -> &I {
		&self.inner
	}

	/// Serializes and transmits `value`, and delivers it locally
	/// through the inner transporter in parallel.
	pub fn publish<T: Marshallable>(
		&self,
		value: T,
		group: &Group,
		cfg: &TransporterConfig,
	) -> Result<(), PortalError> {
		self.publish_shared(Arc::new(value), group, cfg)
	}

	/// [`publish`](Self::publish) for an already-shared handle.
	pub fn publish_shared<T: Marshallable>(
		&self,
		value: Arc<T>,
		group: &Group,
		cfg: &TransporterConfig,
	) -> Result<(), PortalError> {
		self.ensure_running()?;
		let bytes = value.to_bytes()?;
		let identifier = Identifier {
			group: group.name().to_string(),
			scheme: T::SCHEME,
			type_name: T::TYPE_NAME.to_string(),
			process: self.shared.process,
			thread: current_thread_id(),
		}
		.to_wire();
		self.shared.send(ControlMsg::Publish {
			frame: encode_publication(&identifier, &bytes),
		})?;

		self.inner.publish_shared(value, group, cfg);
		Ok(())
	}

	/// Transmits a runtime-reflected message through its registered
	/// descriptor. There is no typed local delivery; in-process
	/// consumers of dynamic data subscribe to the concrete type.
	pub fn publish_dynamic(
		&self,
		message: &DynamicMessage,
		group: &Group,
	) -> Result<(), PortalError> {
		self.ensure_running()?;
		let bytes = nerite_marshal::pool::serialize_dynamic(message)?;
		let identifier = Identifier {
			group: group.name().to_string(),
			scheme: message.scheme,
			type_name: message.type_name.clone(),
			process: self.shared.process,
			thread: current_thread_id(),
		}
		.to_wire();
		self.shared.send(ControlMsg::Publish {
			frame: encode_publication(&identifier, &bytes),
		})
	}

	/// Installs a portal subscription for `(T, group)` on the calling
	/// thread and applies the socket filter if this is the first
	/// holder of the key.
	pub fn subscribe<T, F>(&self, group: &Group, handler: F) -> Result<(), PortalError>
	where
		T: Marshallable,
		F: Fn(Arc<T>) + Send + Sync + 'static,
	{
		self.ensure_running()?;
		let record =
			nerite_marshal::typed_subscription::<T, _>(group.clone(), SubscriptionAction::Subscribe, handler);
		let key = Identifier::process_thread_wildcard(group, T::SCHEME, T::TYPE_NAME);

		let install = self.shared.tables.lock().add_portal(key.clone(), record);
		if install {
			self.shared.send(ControlMsg::Subscribe {
				filter: key.into_bytes(),
			})?;
		}
		Ok(())
	}

	/// Installs a regex subscription matching on scheme set, type-name
	/// regex, and group regex. The first regex subscription applies
	/// the catch-all `"/"` filter.
	pub fn subscribe_regex(
		&self,
		schemes: impl Into<Vec<MarshalScheme>>,
		type_regex: &str,
		group_regex: &str,
		handler: impl Fn(&[u8], MarshalScheme, &str, &str) + Send + Sync + 'static,
	) -> Result<(), PortalError> {
		self.ensure_running()?;
		let record = RegexSubscription::new(schemes, type_regex, group_regex, Arc::new(handler))?;

		let install = self.shared.tables.lock().add_regex(record);
		if install {
			self.shared.send(ControlMsg::Subscribe {
				filter: b"/".to_vec(),
			})?;
		}
		Ok(())
	}

	/// Removes the calling thread's portal subscription for
	/// `(T, group)`. The socket filter is released only when no portal
	/// or forwarder subscription for the key remains.
	pub fn unsubscribe<T: Marshallable>(&self, group: &Group) -> Result<(), PortalError> {
		self.ensure_running()?;
		let key = Identifier::process_thread_wildcard(group, T::SCHEME, T::TYPE_NAME);

		let removal = self.shared.tables.lock().remove_portal(&key, current_thread_id());
		match removal {
			PortalRemoval::ReleaseFilter => self.shared.send(ControlMsg::Unsubscribe {
				filter: key.into_bytes(),
			}),
			PortalRemoval::NotOwner => Err(PortalError::SubscriptionMisuse { key }),
			PortalRemoval::Kept | PortalRemoval::Absent => Ok(()),
		}
	}

	/// Removes every subscription owned by the calling thread,
	/// releasing socket filters that lost their last holder.
	pub fn unsubscribe_all(&self) -> Result<(), PortalError> {
		self.ensure_running()?;
		let released = self
			.shared
			.tables
			.lock()
			.unsubscribe_all_local(current_thread_id());
		for filter in released {
			self.shared.send(ControlMsg::Unsubscribe { filter })?;
		}
		Ok(())
	}

	/// Drains received frames and the inner transporter's queues,
	/// invoking matching handlers on the calling thread.
	///
	/// Returns the number of handlers invoked, `Ok(0)` on timeout. A
	/// reader socket failure surfaces here as an error.
	pub fn poll(&self, timeout: Option<Duration>) -> Result<usize, PortalError> {
		self.ensure_running()?;
		let deadline = timeout.map(|t| Instant::now() + t);
		let receiver = self.from_reader.lock();

		loop {
			let mut guard = Some(self.waiter.lock());
			let mut items = self.drain_control(&receiver, &mut guard)?;
			items += self.inner.poll_once(&mut guard);
			if items > 0 {
				return Ok(items);
			}

			let mut held = match guard {
				Some(held) => held,
				None => self.waiter.lock(),
			};
			match deadline {
				None => self.waiter.wait(&mut held),
				Some(deadline) => {
					if Instant::now() >= deadline || self.waiter.wait_until(&mut held, deadline) {
						return Ok(0);
					}
				}
			}
			drop(held);
		}
	}

	/// Signals the reader to shut down. Subsequent operations return
	/// [`PortalError::ShutdownInProgress`].
	pub fn shutdown(&self) {
		if !self.shared.shutdown.swap(true, Ordering::SeqCst) {
			let _ = self.shared.to_reader.send(ControlMsg::Shutdown);
		}
	}

	fn drain_control(
		&self,
		receiver: &Receiver<ControlMsg>,
		guard: &mut Option<MutexGuard<'_, ()>>,
	) -> Result<usize, PortalError> {
		let mut invoked = 0;
		loop {
			match receiver.try_recv() {
				Ok(ControlMsg::Receive { frame }) => {
					invoked += self.dispatch_frame(&frame, guard);
				}
				Ok(ControlMsg::Error { message }) => return Err(PortalError::Reader(message)),
				Ok(_) => {}
				Err(TryRecvError::Empty) => break,
				Err(TryRecvError::Disconnected) => {
					if invoked == 0 {
						return Err(PortalError::ChannelClosed);
					}
					break;
				}
			}
		}
		Ok(invoked)
	}

	/// Parses one received frame and offers it to the matching typed,
	/// forwarder, and regex subscriptions. Malformed frames are logged
	/// and dropped; the middleware never fails on peer data.
	fn dispatch_frame(&self, frame: &[u8], guard: &mut Option<MutexGuard<'_, ()>>) -> usize {
		let Some((identifier, payload)) = split_publication(frame) else {
			tracing::warn!("dropping frame without identifier separator");
			return 0;
		};
		let identifier = match Identifier::parse(identifier) {
			Ok(identifier) => identifier,
			Err(error) => {
				tracing::warn!(%error, "dropping frame with malformed identifier");
				return 0;
			}
		};

		// Never hand a publication back to the process that produced
		// it: local subscribers already received the shared handle.
		if identifier.process == self.shared.process && !self.shared.echo {
			return 0;
		}

		let key = identifier.wildcard_key();
		let (typed, regex) = {
			let tables = self.shared.tables.lock();
			(
				tables.typed_for(&key),
				tables.regex_for(identifier.scheme, &identifier.type_name, &identifier.group),
			)
		};
		if typed.is_empty() && regex.is_empty() {
			return 0;
		}

		// First dispatch of this poll: release the poll mutex so
		// handlers may publish.
		if guard.is_some() {
			let _ = guard.take();
		}

		let mut invoked = 0;
		for sub in &typed {
			sub.post(payload);
			invoked += 1;
		}
		for sub in &regex {
			if sub.post(payload, identifier.scheme, &identifier.type_name, &identifier.group) {
				invoked += 1;
			}
		}
		invoked
	}
}

impl<I: Transporter> Drop for InterProcessPortal<I> {
	fn drop(&mut self) {
		self.shutdown();
		if let Some(handle) = self.reader.take() {
			let _ = handle.join();
		}
	}
}
