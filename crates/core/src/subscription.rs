//! Subscription records.
//!
//! Records are the polymorphic handles that travel between layers: a
//! typed record names one (group, scheme, type) key; a regex record
//! matches over scheme sets and name patterns. Dispatch is a uniform
//! bytes-in closure that owns the scheme-specific parse, so the tables
//! holding records never see concrete payload types.

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::group::Group;
use crate::scheme::MarshalScheme;
use crate::thread_id::current_thread_id;

/// Whether a forwarded record installs or removes a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionAction {
	Subscribe,
	Unsubscribe,
}

/// A subscription to one (group, scheme, type) key.
#[derive(Clone)]
pub struct TypedSubscription {
	pub group: Group,
	pub scheme: MarshalScheme,
	pub type_name: String,
	/// Numeric id of the owning thread.
	pub thread: u64,
	pub action: SubscriptionAction,
	dispatch: Arc<dyn Fn(&[u8]) + Send + Sync>,
}

impl TypedSubscription {
	/// Builds a record owned by the calling thread.
	pub fn new(
		group: Group,
		scheme: MarshalScheme,
		type_name: impl Into<String>,
		action: SubscriptionAction,
		dispatch: Arc<dyn Fn(&[u8]) + Send + Sync>,
	) -> Self {
		Self {
			group,
			scheme,
			type_name: type_name.into(),
			thread: current_thread_id(),
			action,
			dispatch,
		}
	}

	/// Hands a received payload to the owning parse/dispatch closure.
	pub fn post(&self, payload: &[u8]) {
		(self.dispatch)(payload);
	}
}

impl fmt::Debug for TypedSubscription {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TypedSubscription")
			.field("group", &self.group)
			.field("scheme", &self.scheme)
			.field("type_name", &self.type_name)
			.field("thread", &self.thread)
			.field("action", &self.action)
			.finish_non_exhaustive()
	}
}

/// A subscription over scheme sets and name patterns.
#[derive(Clone)]
pub struct RegexSubscription {
	schemes: Vec<MarshalScheme>,
	type_regex: Regex,
	group_regex: Regex,
	/// Numeric id of the owning thread.
	pub thread: u64,
	dispatch: Arc<dyn Fn(&[u8], MarshalScheme, &str, &str) + Send + Sync>,
}

impl RegexSubscription {
	/// Builds a record owned by the calling thread.
	///
	/// `schemes` may contain [`MarshalScheme::AllSchemes`] to match any
	/// wire family.
	pub fn new(
		schemes: impl Into<Vec<MarshalScheme>>,
		type_regex: &str,
		group_regex: &str,
		dispatch: Arc<dyn Fn(&[u8], MarshalScheme, &str, &str) + Send + Sync>,
	) -> Result<Self, regex::Error> {
		Ok(Self {
			schemes: schemes.into(),
			type_regex: Regex::new(type_regex)?,
			group_regex: Regex::new(group_regex)?,
			thread: current_thread_id(),
			dispatch,
		})
	}

	/// Whether this record selects the given frame metadata.
	#[must_use]
	pub fn matches(&self, scheme: MarshalScheme, type_name: &str, group: &str) -> bool {
		let scheme_ok = self
			.schemes
			.iter()
			.any(|s| *s == MarshalScheme::AllSchemes || *s == scheme);
		scheme_ok && self.type_regex.is_match(type_name) && self.group_regex.is_match(group)
	}

	/// Dispatches the frame if it matches; reports whether it did.
	pub fn post(&self, payload: &[u8], scheme: MarshalScheme, type_name: &str, group: &str) -> bool {
		if !self.matches(scheme, type_name, group) {
			return false;
		}
		(self.dispatch)(payload, scheme, type_name, group);
		true
	}
}

impl fmt::Debug for RegexSubscription {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RegexSubscription")
			.field("schemes", &self.schemes)
			.field("type_regex", &self.type_regex.as_str())
			.field("group_regex", &self.group_regex.as_str())
			.field("thread", &self.thread)
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn nop_regex() -> Arc<dyn Fn(&[u8], MarshalScheme, &str, &str) + Send + Sync> {
		Arc::new(|_, _, _, _| {})
	}

	#[test]
	fn regex_matches_scheme_set_and_patterns() {
		let sub = RegexSubscription::new(
			vec![MarshalScheme::Structured],
			"Sample",
			"Sample1|Sample2",
			nop_regex(),
		)
		.unwrap();

		assert!(sub.matches(MarshalScheme::Structured, "Sample", "Sample1"));
		assert!(sub.matches(MarshalScheme::Structured, "Sample", "Sample2"));
		assert!(!sub.matches(MarshalScheme::Structured, "Widget", "Sample1"));
		assert!(!sub.matches(MarshalScheme::Compact, "Sample", "Sample1"));
	}

	#[test]
	fn all_schemes_sentinel_matches_everything() {
		let sub =
			RegexSubscription::new(vec![MarshalScheme::AllSchemes], ".*", ".*", nop_regex()).unwrap();
		assert!(sub.matches(MarshalScheme::CStr, "anything", "anywhere"));
		assert!(sub.matches(MarshalScheme::Compact, "x", "y"));
	}

	#[test]
	fn post_reports_dispatch() {
		use std::sync::atomic::{AtomicUsize, Ordering};
		let hits = Arc::new(AtomicUsize::new(0));
		let sub = {
			let hits = Arc::clone(&hits);
			RegexSubscription::new(
				vec![MarshalScheme::AllSchemes],
				"Sample",
				".*",
				Arc::new(move |_, _, _, _| {
					hits.fetch_add(1, Ordering::SeqCst);
				}),
			)
			.unwrap()
		};

		assert!(sub.post(b"", MarshalScheme::Structured, "Sample", "g"));
		assert!(!sub.post(b"", MarshalScheme::Structured, "Widget", "g"));
		assert_eq!(hits.load(Ordering::SeqCst), 1);
	}
}
