//! Cross-layer forwarding records.
//!
//! An outer transporter (the intervehicle layer, or any relay) drives
//! this layer by publishing records on the well-known inner
//! [`FORWARD_GROUP`]: a [`ForwardedPublication`] becomes an outgoing
//! wire frame; a [`TypedSubscription`](crate::TypedSubscription) or
//! [`RegexSubscription`](crate::RegexSubscription) installs or removes
//! a forwarder subscription; a [`ForwardedUnsubscribeAll`] drops every
//! key owned by one outer thread.

use crate::group::Group;
use crate::scheme::MarshalScheme;

/// Inner group on which forwarding records are published.
pub static FORWARD_GROUP: Group = Group::new_static("nerite::interprocess::forward");

/// A byte-serialized publication relayed from an outer layer.
#[derive(Debug, Clone)]
pub struct ForwardedPublication {
	pub scheme: MarshalScheme,
	pub type_name: String,
	pub group: Group,
	pub bytes: Vec<u8>,
}

/// Drops every forwarder subscription owned by `thread`.
#[derive(Debug, Clone, Copy)]
pub struct ForwardedUnsubscribeAll {
	pub thread: u64,
}
