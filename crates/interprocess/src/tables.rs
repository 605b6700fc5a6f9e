//! Portal, forwarder, and regex subscription tables.
//!
//! All socket-filter reference counting lives here, away from any
//! socket: a filter for key K is held exactly while some portal or
//! forwarder subscription for K exists, and the catch-all `"/"` filter
//! exactly while any regex subscription exists.

use std::collections::{HashMap, HashSet};

use nerite_core::{MarshalScheme, RegexSubscription, TypedSubscription};

/// Outcome of removing a portal subscription.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum PortalRemoval {
	/// Nothing was subscribed under the key.
	Absent,
	/// The key exists but the calling thread owns no subscription.
	NotOwner,
	/// Removed; other subscriptions still hold the filter.
	Kept,
	/// Removed the last holder; release the socket filter.
	ReleaseFilter,
}

#[derive(Default)]
pub(crate) struct SubTables {
	/// key -> portal subscriptions, at most one per owning thread.
	portal: HashMap<String, Vec<TypedSubscription>>,
	/// key -> the single forwarder subscription record.
	forwarder: HashMap<String, TypedSubscription>,
	/// outer thread -> keys it holds.
	forwarder_ids: HashMap<u64, HashSet<String>>,
	/// Regex subscriptions in installation order.
	regex: Vec<RegexSubscription>,
}

impl SubTables {
	fn key_held(&self, key: &str) -> bool {
		self.portal.get(key).is_some_and(|subs| !subs.is_empty())
			|| self.forwarder.contains_key(key)
	}

	/// Installs a portal subscription; a duplicate from the same thread
	/// replaces the handler. Returns true when the socket filter must
	/// be applied.
	pub(crate) fn add_portal(&mut self, key: String, sub: TypedSubscription) -> bool {
		let fresh = !self.key_held(&key);
		let subs = self.portal.entry(key).or_default();
		match subs.iter_mut().find(|existing| existing.thread == sub.thread) {
			Some(existing) => *existing = sub,
			None => subs.push(sub),
		}
		fresh
	}

	/// Removes the calling thread's portal subscription for `key`.
	pub(crate) fn remove_portal(&mut self, key: &str, thread: u64) -> PortalRemoval {
		let Some(subs) = self.portal.get_mut(key) else {
			return PortalRemoval::Absent;
		};
		let before = subs.len();
		subs.retain(|sub| sub.thread != thread);
		if subs.len() == before {
			return PortalRemoval::NotOwner;
		}
		if subs.is_empty() {
			self.portal.remove(key);
			if !self.forwarder.contains_key(key) {
				return PortalRemoval::ReleaseFilter;
			}
		}
		PortalRemoval::Kept
	}

	/// Removes every subscription owned by `thread` on the portal
	/// side, including its regex subscriptions. Returns the filters to
	/// release.
	pub(crate) fn unsubscribe_all_local(&mut self, thread: u64) -> Vec<Vec<u8>> {
		let mut released = Vec::new();
		let forwarder = &self.forwarder;
		self.portal.retain(|key, subs| {
			subs.retain(|sub| sub.thread != thread);
			if subs.is_empty() {
				if !forwarder.contains_key(key) {
					released.push(key.clone().into_bytes());
				}
				false
			} else {
				true
			}
		});
		if self.remove_regex_thread(thread) {
			released.push(b"/".to_vec());
		}
		released
	}

	/// Installs a forwarder subscription for its owning thread.
	/// Idempotent per (thread, key). Returns true when the socket
	/// filter must be applied.
	pub(crate) fn add_forwarder(&mut self, key: String, sub: TypedSubscription) -> bool {
		let ids = self.forwarder_ids.entry(sub.thread).or_default();
		if !ids.insert(key.clone()) {
			return false;
		}
		let fresh = !self.key_held(&key);
		self.forwarder.entry(key).or_insert(sub);
		fresh
	}

	/// Removes `thread`'s hold on a forwarder key. Returns true when
	/// the socket filter must be released: the last forwarder is gone
	/// and no portal subscription remains.
	pub(crate) fn remove_forwarder(&mut self, thread: u64, key: &str) -> bool {
		let Some(ids) = self.forwarder_ids.get_mut(&thread) else {
			return false;
		};
		if !ids.remove(key) {
			return false;
		}
		if ids.is_empty() {
			self.forwarder_ids.remove(&thread);
		}

		if self.forwarder_ids.values().any(|keys| keys.contains(key)) {
			return false;
		}
		self.forwarder.remove(key);
		!self.portal.get(key).is_some_and(|subs| !subs.is_empty())
	}

	/// The keys currently held by one outer thread.
	pub(crate) fn forwarder_keys(&self, thread: u64) -> Vec<String> {
		self.forwarder_ids
			.get(&thread)
			.map(|keys| keys.iter().cloned().collect())
			.unwrap_or_default()
	}

	/// Installs a regex subscription. Returns true when this is the
	/// first one and the catch-all filter must be applied.
	pub(crate) fn add_regex(&mut self, sub: RegexSubscription) -> bool {
		let first = self.regex.is_empty();
		self.regex.push(sub);
		first
	}

	/// Removes `thread`'s regex subscriptions. Returns true when the
	/// catch-all filter must be released.
	pub(crate) fn remove_regex_thread(&mut self, thread: u64) -> bool {
		if self.regex.is_empty() {
			return false;
		}
		self.regex.retain(|sub| sub.thread != thread);
		self.regex.is_empty()
	}

	/// Subscriptions to offer an incoming frame: every matching portal
	/// subscription for `key`, plus the forwarder record if present.
	pub(crate) fn typed_for(&self, key: &str) -> Vec<TypedSubscription> {
		let mut subs: Vec<TypedSubscription> =
			self.portal.get(key).cloned().unwrap_or_default();
		if let Some(forwarded) = self.forwarder.get(key) {
			subs.push(forwarded.clone());
		}
		subs
	}

	/// Regex subscriptions to offer a frame: the first match per
	/// owning thread, in installation order.
	pub(crate) fn regex_for(
		&self,
		scheme: MarshalScheme,
		type_name: &str,
		group: &str,
	) -> Vec<RegexSubscription> {
		let mut chosen: Vec<RegexSubscription> = Vec::new();
		let mut threads_done: HashSet<u64> = HashSet::new();
		for sub in &self.regex {
			if threads_done.contains(&sub.thread) {
				continue;
			}
			if sub.matches(scheme, type_name, group) {
				threads_done.insert(sub.thread);
				chosen.push(sub.clone());
			}
		}
		chosen
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use nerite_core::{Group, MarshalScheme, SubscriptionAction};

	use super::*;

	fn sub(thread: u64) -> TypedSubscription {
		let mut record = TypedSubscription::new(
			Group::new("k"),
			MarshalScheme::Structured,
			"T",
			SubscriptionAction::Subscribe,
			Arc::new(|_| {}),
		);
		record.thread = thread;
		record
	}

	const KEY: &str = "/k/1/T/";

	#[test]
	fn filter_refcounting_across_tables() {
		let mut tables = SubTables::default();

		// First holder (portal side) installs the filter.
		assert!(tables.add_portal(KEY.to_string(), sub(1)));
		// Forwarder arrives second: no second install.
		assert!(!tables.add_forwarder(KEY.to_string(), sub(2)));

		// Portal leaves; the forwarder still holds the key.
		assert_eq!(tables.remove_portal(KEY, 1), PortalRemoval::Kept);
		// Last forwarder leaves: release.
		assert!(tables.remove_forwarder(2, KEY));
	}

	#[test]
	fn forwarder_keys_are_per_thread() {
		let mut tables = SubTables::default();
		assert!(tables.add_forwarder(KEY.to_string(), sub(7)));
		// Same thread again: idempotent, no install.
		assert!(!tables.add_forwarder(KEY.to_string(), sub(7)));
		// A second thread holds the same key.
		assert!(!tables.add_forwarder(KEY.to_string(), sub(8)));

		// Releasing one thread keeps the filter for the other.
		assert!(!tables.remove_forwarder(7, KEY));
		assert!(tables.remove_forwarder(8, KEY));
		assert!(tables.forwarder_keys(7).is_empty());
	}

	#[test]
	fn duplicate_portal_subscribe_replaces() {
		let mut tables = SubTables::default();
		assert!(tables.add_portal(KEY.to_string(), sub(1)));
		assert!(!tables.add_portal(KEY.to_string(), sub(1)));
		assert_eq!(tables.typed_for(KEY).len(), 1);
	}

	#[test]
	fn cross_thread_unsubscribe_is_refused() {
		let mut tables = SubTables::default();
		tables.add_portal(KEY.to_string(), sub(1));
		assert_eq!(tables.remove_portal(KEY, 99), PortalRemoval::NotOwner);
		assert_eq!(tables.remove_portal("/other/1/T/", 1), PortalRemoval::Absent);
	}

	#[test]
	fn unsubscribe_all_releases_only_unheld_keys() {
		let mut tables = SubTables::default();
		tables.add_portal(KEY.to_string(), sub(1));
		tables.add_portal("/k2/1/T/".to_string(), sub(1));
		tables.add_forwarder("/k2/1/T/".to_string(), sub(9));

		let mut released = tables.unsubscribe_all_local(1);
		released.sort();
		// k2 stays held by the forwarder; only the first key releases.
		assert_eq!(released, vec![KEY.as_bytes().to_vec()]);
	}

	#[test]
	fn regex_catch_all_lifecycle() {
		let mut tables = SubTables::default();
		let record = |thread: u64| {
			let mut r = RegexSubscription::new(
				vec![MarshalScheme::AllSchemes],
				".*",
				".*",
				Arc::new(|_, _, _, _| {}),
			)
			.unwrap();
			r.thread = thread;
			r
		};

		assert!(tables.add_regex(record(1)));
		assert!(!tables.add_regex(record(2)));
		assert!(!tables.remove_regex_thread(1));
		assert!(tables.remove_regex_thread(2));
	}

	#[test]
	fn regex_selection_is_once_per_thread() {
		let mut tables = SubTables::default();
		let record = |thread: u64, type_re: &str| {
			let mut r = RegexSubscription::new(
				vec![MarshalScheme::AllSchemes],
				type_re,
				".*",
				Arc::new(|_, _, _, _| {}),
			)
			.unwrap();
			r.thread = thread;
			r
		};

		// Two matching records on thread 1, one on thread 2.
		tables.add_regex(record(1, "Sam.*"));
		tables.add_regex(record(1, ".*ple"));
		tables.add_regex(record(2, "Sample"));

		let chosen = tables.regex_for(MarshalScheme::Structured, "Sample", "g");
		assert_eq!(chosen.len(), 2);
		assert_eq!(chosen[0].thread, 1);
		assert_eq!(chosen[1].thread, 2);
	}
}
