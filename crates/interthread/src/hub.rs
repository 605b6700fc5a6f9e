//! The type-indexed store registry.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use nerite_core::{Group, TransporterConfig};

use crate::store::Store;

/// Scheme-erased store surface used for hub-wide sweeps.
trait AnyStore: Send + Sync {
	fn poll(&self, thread: u64, release: &mut dyn FnMut()) -> usize;
	fn unsubscribe_all(&self, thread: u64);
	fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Send + Sync + 'static> AnyStore for Store<T> {
	fn poll(&self, thread: u64, release: &mut dyn FnMut()) -> usize {
		Store::poll(self, thread, release)
	}

	fn unsubscribe_all(&self, thread: u64) {
		Store::unsubscribe_all(self, thread);
	}

	fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
		self
	}
}

/// The broker state: one store per payload type.
///
/// The process-global hub ([`Hub::global`]) initializes on first use
/// and lives until process exit. Independent hubs can be constructed
/// for isolation (tests, embedded brokers); a transporter binds to
/// exactly one hub.
pub struct Hub {
	stores: RwLock<HashMap<TypeId, Arc<dyn AnyStore>>>,
}

impl Hub {
	/// A fresh, empty hub.
	#[must_use]
	pub fn new() -> Arc<Self> {
		Arc::new(Self {
			stores: RwLock::new(HashMap::new()),
		})
	}

	/// The process-wide hub.
	#[must_use]
	pub fn global() -> Arc<Self> {
		static GLOBAL: OnceLock<Arc<Hub>> = OnceLock::new();
		Arc::clone(GLOBAL.get_or_init(Hub::new))
	}

	/// The store for `T`, created on first subscribe.
	pub(crate) fn store<T: Send + Sync + 'static>(&self) -> Arc<Store<T>> {
		let key = TypeId::of::<T>();
		if let Some(store) = self.stores.read().get(&key) {
			return downcast(Arc::clone(store));
		}
		let mut stores = self.stores.write();
		let store = stores
			.entry(key)
			.or_insert_with(|| Arc::new(Store::<T>::default()) as Arc<dyn AnyStore>);
		downcast(Arc::clone(store))
	}

	/// The store for `T`, if any subscriber ever created it.
	pub(crate) fn try_store<T: Send + Sync + 'static>(&self) -> Option<Arc<Store<T>>> {
		self.stores
			.read()
			.get(&TypeId::of::<T>())
			.map(|store| downcast(Arc::clone(store)))
	}

	/// Publishes a shared handle directly into the hub, without a
	/// transporter facade. Used by dispatch closures that run on a
	/// thread other than the one that owns them.
	pub fn publish_shared<T: Send + Sync + 'static>(
		&self,
		value: Arc<T>,
		group: &Group,
		cfg: &TransporterConfig,
	) {
		if let Some(store) = self.try_store::<T>() {
			store.publish(&value, group, cfg);
		}
	}

	/// Sweeps every store for `thread`'s pending data.
	///
	/// Stores are snapshotted first so handlers can subscribe to new
	/// types from inside their callbacks.
	pub(crate) fn poll_all(&self, thread: u64, release: &mut dyn FnMut()) -> usize {
		let stores: Vec<Arc<dyn AnyStore>> = self.stores.read().values().cloned().collect();
		stores.iter().map(|store| store.poll(thread, release)).sum()
	}

	/// Removes every subscription, queue, and waiter owned by `thread`.
	pub(crate) fn unsubscribe_all(&self, thread: u64) {
		let stores: Vec<Arc<dyn AnyStore>> = self.stores.read().values().cloned().collect();
		for store in stores {
			store.unsubscribe_all(thread);
		}
	}
}

fn downcast<T: Send + Sync + 'static>(store: Arc<dyn AnyStore>) -> Arc<Store<T>> {
	match store.into_any().downcast::<Store<T>>() {
		Ok(store) => store,
		Err(_) => unreachable!("store registry keyed by TypeId"),
	}
}
