//! Wire family tags.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Numeric tag selecting a codec family.
///
/// Tags are stable across runs and processes; the decimal form appears
/// inside wire identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i16)]
pub enum MarshalScheme {
	/// Sentinel matching every scheme (regex subscriptions only).
	AllSchemes = -2,
	/// Sentinel matching no scheme.
	NullScheme = -1,
	/// NUL-terminated byte strings.
	CStr = 0,
	/// Schema-described structured data (serde, JSON encoded).
	Structured = 1,
	/// Wire-compact encoded data (serde, postcard encoded).
	Compact = 2,
	/// Columnar data. Reserved tag; no built-in codec.
	Columnar = 3,
	/// Runtime-reflected data dispatched through the descriptor pool.
	Runtime = 4,
	/// Native in-process objects. Shared-handle delivery only; never
	/// crosses a socket.
	Native = 5,
}

impl MarshalScheme {
	/// The stable numeric tag.
	#[must_use]
	pub const fn tag(self) -> i16 {
		self as i16
	}

	/// Parses a numeric tag back into a scheme.
	#[must_use]
	pub fn from_tag(tag: i16) -> Option<Self> {
		match tag {
			-2 => Some(Self::AllSchemes),
			-1 => Some(Self::NullScheme),
			0 => Some(Self::CStr),
			1 => Some(Self::Structured),
			2 => Some(Self::Compact),
			3 => Some(Self::Columnar),
			4 => Some(Self::Runtime),
			5 => Some(Self::Native),
			_ => None,
		}
	}

	/// Human-readable name for diagnostics.
	#[must_use]
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::AllSchemes => "ALL_SCHEMES",
			Self::NullScheme => "NULL_SCHEME",
			Self::CStr => "CSTR",
			Self::Structured => "STRUCTURED",
			Self::Compact => "COMPACT",
			Self::Columnar => "COLUMNAR",
			Self::Runtime => "RUNTIME",
			Self::Native => "NATIVE",
		}
	}
}

impl fmt::Display for MarshalScheme {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn tags_round_trip() {
		for scheme in [
			MarshalScheme::AllSchemes,
			MarshalScheme::NullScheme,
			MarshalScheme::CStr,
			MarshalScheme::Structured,
			MarshalScheme::Compact,
			MarshalScheme::Columnar,
			MarshalScheme::Runtime,
			MarshalScheme::Native,
		] {
			assert_eq!(MarshalScheme::from_tag(scheme.tag()), Some(scheme));
		}
		assert_eq!(MarshalScheme::from_tag(42), None);
	}
}
