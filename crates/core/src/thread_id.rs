//! Process-stable numeric thread identifiers.
//!
//! Wire identifiers and forward records need an integer id per thread
//! that is stable for the life of the process. The standard library's
//! `ThreadId` exposes no stable integer, so ids are assigned from an
//! atomic counter on first use and cached in a thread local.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
	static THREAD_ID: u64 = NEXT_ID.fetch_add(1, Ordering::Relaxed);
}

/// Returns the calling thread's process-stable numeric id.
#[must_use]
pub fn current_thread_id() -> u64 {
	THREAD_ID.with(|id| *id)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn stable_within_a_thread() {
		assert_eq!(current_thread_id(), current_thread_id());
	}

	#[test]
	fn distinct_across_threads() {
		let here = current_thread_id();
		let there = std::thread::spawn(current_thread_id).join().unwrap();
		assert_ne!(here, there);
	}
}
