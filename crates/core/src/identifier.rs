//! Wire routing identifiers.
//!
//! Every interprocess publication is keyed by a hierarchical identifier
//! `"/<group>/<scheme>/<type>/<process>/<thread>/"`. Each segment ends
//! in `/`, so every wildcard form is a pure prefix truncation and
//! subscription filtering reduces to a byte-prefix match on the frame.

use crate::error::MarshalError;
use crate::group::Group;
use crate::scheme::MarshalScheme;

/// A fully-qualified routing identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
	pub group: String,
	pub scheme: MarshalScheme,
	pub type_name: String,
	pub process: u32,
	pub thread: u64,
}

impl Identifier {
	/// Renders the identifier with no wildcards, trailing slash
	/// included.
	#[must_use]
	pub fn to_wire(&self) -> String {
		format!(
			"/{}/{}/{}/{}/{}/",
			self.group,
			self.scheme.tag(),
			self.type_name,
			self.process,
			self.thread
		)
	}

	/// Prefix covering every process and thread for a key:
	/// `"/<group>/<scheme>/<type>/"`.
	#[must_use]
	pub fn process_thread_wildcard(group: &Group, scheme: MarshalScheme, type_name: &str) -> String {
		format!("/{}/{}/{}/", group.name(), scheme.tag(), type_name)
	}

	/// Prefix covering every thread of one process:
	/// `"/<group>/<scheme>/<type>/<process>/"`.
	#[must_use]
	pub fn thread_wildcard(
		group: &Group,
		scheme: MarshalScheme,
		type_name: &str,
		process: u32,
	) -> String {
		format!("/{}/{}/{}/{}/", group.name(), scheme.tag(), type_name, process)
	}

	/// The process/thread-wildcard prefix of this identifier, used as
	/// the subscription table key.
	#[must_use]
	pub fn wildcard_key(&self) -> String {
		format!("/{}/{}/{}/", self.group, self.scheme.tag(), self.type_name)
	}

	/// Parses a wire identifier back into its fields.
	pub fn parse(wire: &str) -> Result<Self, MarshalError> {
		let malformed = || MarshalError::Parse(format!("malformed identifier: {wire:?}"));

		let rest = wire.strip_prefix('/').ok_or_else(malformed)?;
		let mut segments = rest.split('/');
		let group = segments.next().ok_or_else(malformed)?;
		let scheme = segments.next().ok_or_else(malformed)?;
		let type_name = segments.next().ok_or_else(malformed)?;
		let process = segments.next().ok_or_else(malformed)?;
		let thread = segments.next().ok_or_else(malformed)?;
		if group.is_empty() || type_name.is_empty() {
			return Err(malformed());
		}

		let scheme = scheme
			.parse::<i16>()
			.ok()
			.and_then(MarshalScheme::from_tag)
			.ok_or_else(malformed)?;
		Ok(Self {
			group: group.to_string(),
			scheme,
			type_name: type_name.to_string(),
			process: process.parse().map_err(|_| malformed())?,
			thread: thread.parse().map_err(|_| malformed())?,
		})
	}
}
