//! Per-type subscription stores.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use nerite_core::{Group, PollWaiter, TransporterConfig, current_thread_id};

pub(crate) type Handler<T> = Arc<dyn Fn(Arc<T>) + Send + Sync>;

/// Subscriptions, queues, and wake state for one payload type.
///
/// The outer `RwLock` guards the table topology (readers: publish,
/// poll; writers: subscribe, unsubscribe). Queue contents are guarded
/// only by the owning thread's queue mutex, held just long enough to
/// append or drain.
pub(crate) struct Store<T> {
	state: RwLock<StoreState<T>>,
}

struct StoreState<T> {
	/// group -> owning thread -> handler. One handler per (thread,
	/// group): a duplicate subscribe replaces it.
	subscribers: HashMap<Group, HashMap<u64, Handler<T>>>,
	/// Per-thread queues and wake state, created on first subscribe.
	threads: HashMap<u64, Arc<ThreadQueues<T>>>,
}

struct ThreadQueues<T> {
	queues: Mutex<HashMap<Group, VecDeque<Arc<T>>>>,
	/// The waiter registered when this thread first subscribed; every
	/// publish for the thread signals it.
	waiter: Arc<PollWaiter>,
}

impl<T> Default for Store<T> {
	fn default() -> Self {
		Self {
			state: RwLock::new(StoreState {
				subscribers: HashMap::new(),
				threads: HashMap::new(),
			}),
		}
	}
}

impl<T: Send + Sync + 'static> Store<T> {
	pub(crate) fn subscribe(
		&self,
		group: &Group,
		thread: u64,
		waiter: &Arc<PollWaiter>,
		handler: Handler<T>,
	) {
		// Displaced handlers drop after the write lock: a handler may
		// own a transporter whose teardown reenters this store.
		let displaced;
		{
			let mut state = self.state.write();
			displaced = state
				.subscribers
				.entry(group.clone())
				.or_default()
				.insert(thread, handler);

			let entry = state.threads.entry(thread).or_insert_with(|| {
				Arc::new(ThreadQueues {
					queues: Mutex::new(HashMap::new()),
					waiter: Arc::clone(waiter),
				})
			});
			entry.queues.lock().entry(group.clone()).or_default();
		}
		drop(displaced);
	}

	pub(crate) fn unsubscribe(&self, group: &Group, thread: u64) {
		let mut removed = None;
		{
			let mut state = self.state.write();
			if let Some(threads) = state.subscribers.get_mut(group) {
				removed = threads.remove(&thread);
				if threads.is_empty() {
					state.subscribers.remove(group);
				}
			}
			if let Some(entry) = state.threads.get(&thread) {
				entry.queues.lock().remove(group);
			}
		}
		drop(removed);
	}

	pub(crate) fn unsubscribe_all(&self, thread: u64) {
		let mut displaced: Vec<Handler<T>> = Vec::new();
		let removed_thread;
		{
			let mut state = self.state.write();
			state.subscribers.retain(|_, threads| {
				if let Some(handler) = threads.remove(&thread) {
					displaced.push(handler);
				}
				!threads.is_empty()
			});
			removed_thread = state.threads.remove(&thread);
		}
		drop(removed_thread);
		drop(displaced);
	}

	/// Enqueues one shared handle per matching subscriber thread, then
	/// signals their waiters after all queue mutexes are released.
	pub(crate) fn publish(&self, data: &Arc<T>, group: &Group, cfg: &TransporterConfig) {
		let publisher = current_thread_id();
		let mut to_notify = Vec::new();
		{
			let state = self.state.read();
			let Some(subscribed) = state.subscribers.get(group) else {
				return;
			};
			for &thread in subscribed.keys() {
				// The publisher does not queue to itself unless echo is set.
				if thread == publisher && !cfg.echo {
					continue;
				}
				let Some(entry) = state.threads.get(&thread) else {
					continue;
				};
				entry
					.queues
					.lock()
					.entry(group.clone())
					.or_default()
					.push_back(Arc::clone(data));
				to_notify.push(Arc::clone(&entry.waiter));
			}
		}
		for waiter in to_notify {
			waiter.notify();
		}
	}

	/// Drains `thread`'s queues and invokes the matching handlers.
	///
	/// `release` is called once, at the first drained handle, to drop
	/// the caller's poll mutex; handlers then run with no locks held so
	/// they may publish or change subscriptions.
	pub(crate) fn poll(&self, thread: u64, release: &mut dyn FnMut()) -> usize {
		let mut pending: Vec<(Handler<T>, Arc<T>)> = Vec::new();
		{
			let state = self.state.read();
			let Some(entry) = state.threads.get(&thread) else {
				return 0;
			};
			let mut queues = entry.queues.lock();
			for (group, queue) in queues.iter_mut() {
				if queue.is_empty() {
					continue;
				}
				let handler = state.subscribers.get(group).and_then(|m| m.get(&thread));
				for datum in queue.drain(..) {
					let Some(handler) = handler else { continue };
					if pending.is_empty() {
						release();
					}
					pending.push((Arc::clone(handler), datum));
				}
			}
		}

		let invoked = pending.len();
		for (handler, datum) in pending {
			handler(datum);
		}
		invoked
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use super::*;

	fn waiter() -> Arc<PollWaiter> {
		Arc::new(PollWaiter::new())
	}

	fn no_release() -> impl FnMut() {
		|| {}
	}

	#[test]
	fn duplicate_subscribe_replaces_the_handler() {
		let store = Store::<u32>::default();
		let group = Group::new("g");
		let thread = current_thread_id();
		let first = Arc::new(AtomicUsize::new(0));
		let second = Arc::new(AtomicUsize::new(0));

		{
			let first = Arc::clone(&first);
			store.subscribe(&group, thread, &waiter(), Arc::new(move |_| {
				first.fetch_add(1, Ordering::SeqCst);
			}));
		}
		{
			let second = Arc::clone(&second);
			store.subscribe(&group, thread, &waiter(), Arc::new(move |_| {
				second.fetch_add(1, Ordering::SeqCst);
			}));
		}

		store.publish(&Arc::new(1), &group, &TransporterConfig::with_echo());
		assert_eq!(store.poll(thread, &mut no_release()), 1);
		assert_eq!(first.load(Ordering::SeqCst), 0);
		assert_eq!(second.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn unsubscribe_drops_the_queue() {
		let store = Store::<u32>::default();
		let group = Group::new("g");
		let thread = current_thread_id();

		store.subscribe(&group, thread, &waiter(), Arc::new(|_| {}));
		store.publish(&Arc::new(1), &group, &TransporterConfig::with_echo());
		store.unsubscribe(&group, thread);
		assert_eq!(store.poll(thread, &mut no_release()), 0);
	}

	#[test]
	fn publish_without_subscribers_is_a_no_op() {
		let store = Store::<u32>::default();
		store.publish(&Arc::new(1), &Group::new("empty"), &TransporterConfig::default());
	}

	#[test]
	fn release_fires_once_at_first_handle() {
		let store = Store::<u32>::default();
		let group = Group::new("g");
		let thread = current_thread_id();
		store.subscribe(&group, thread, &waiter(), Arc::new(|_| {}));
		for i in 0..3 {
			store.publish(&Arc::new(i), &group, &TransporterConfig::with_echo());
		}

		let mut releases = 0;
		assert_eq!(store.poll(thread, &mut || releases += 1), 3);
		assert_eq!(releases, 1);
	}
}
