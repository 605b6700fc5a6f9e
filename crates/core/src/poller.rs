//! Poll/wake primitives shared across nested transporters.
//!
//! A subscriber thread owns one [`PollWaiter`] for its whole
//! transporter stack: the interthread broker and the interprocess
//! reader both signal the same condition variable, so a single
//! `poll(timeout)` can sleep on every source at once.
//!
//! The poll mutex closes the race where a subscriber has checked its
//! queues, found them empty, and is about to wait, while a publisher
//! enqueues and signals in between. Publishers momentarily acquire and
//! release the poll mutex before notifying; the subscriber holds it
//! from the empty check until `wait` releases it.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

/// Condition variable and poll mutex for one polling thread.
#[derive(Default)]
pub struct PollWaiter {
	cv: Condvar,
	poll_mutex: Mutex<()>,
}

impl PollWaiter {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Wakes the owning thread if it is inside `wait`.
	///
	/// The momentary lock ensures the waiter is either already waiting
	/// or has not yet re-checked its queues; either way the new datum
	/// is observed.
	pub fn notify(&self) {
		drop(self.poll_mutex.lock());
		self.cv.notify_all();
	}

	/// Acquires the poll mutex, for callers that drive their own poll
	/// loop.
	#[must_use]
	pub fn lock(&self) -> MutexGuard<'_, ()> {
		self.poll_mutex.lock()
	}

	/// Waits for a notification. The guard must come from
	/// [`PollWaiter::lock`] on this waiter.
	pub fn wait(&self, guard: &mut MutexGuard<'_, ()>) {
		self.cv.wait(guard);
	}

	/// Waits for a notification until `deadline`; returns true on
	/// timeout.
	pub fn wait_until(&self, guard: &mut MutexGuard<'_, ()>, deadline: Instant) -> bool {
		self.cv.wait_until(guard, deadline).timed_out()
	}

	/// Runs poll passes until one reports progress or the timeout
	/// elapses.
	///
	/// `pass` performs one non-blocking sweep over every data source
	/// and returns the number of handlers invoked; it receives the held
	/// poll-mutex guard and must release it (via `Option::take`) before
	/// invoking the first handler, so that handlers may themselves
	/// publish without deadlocking.
	///
	/// A `timeout` of zero makes the call non-blocking; `None` waits
	/// indefinitely.
	pub fn poll_loop<F>(&self, timeout: Option<Duration>, mut pass: F) -> usize
	where
		F: FnMut(&mut Option<MutexGuard<'_, ()>>) -> usize,
	{
		let deadline = timeout.map(|t| Instant::now() + t);
		loop {
			let mut guard = Some(self.poll_mutex.lock());
			let items = pass(&mut guard);
			if items > 0 {
				return items;
			}

			// Nothing pending: wait while still holding the poll mutex
			// from the empty check.
			let mut held = match guard {
				Some(held) => held,
				None => self.poll_mutex.lock(),
			};
			match deadline {
				None => self.cv.wait(&mut held),
				Some(deadline) => {
					if Instant::now() >= deadline
						|| self.cv.wait_until(&mut held, deadline).timed_out()
					{
						return 0;
					}
				}
			}
			drop(held);
		}
	}
}
