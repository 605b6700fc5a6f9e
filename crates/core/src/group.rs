//! Named publish/subscribe topics.

use std::borrow::Cow;
use std::fmt;

/// A lightweight named topic.
///
/// Two groups compare equal iff their names are equal; the name is the
/// only identity. Groups are cheap value types and may be declared
/// `static` with [`Group::new_static`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Group(Cow<'static, str>);

impl Group {
	/// Creates a group from a static name, usable in `static` tables.
	#[must_use]
	pub const fn new_static(name: &'static str) -> Self {
		Self(Cow::Borrowed(name))
	}

	/// Creates a group from an owned name.
	#[must_use]
	pub fn new(name: impl Into<String>) -> Self {
		Self(Cow::Owned(name.into()))
	}

	/// The topic name.
	#[must_use]
	pub fn name(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for Group {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for Group {
	fn from(name: &str) -> Self {
		Self::new(name)
	}
}

impl From<String> for Group {
	fn from(name: String) -> Self {
		Self(Cow::Owned(name))
	}
}
