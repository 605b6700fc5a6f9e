//! Process-wide runtime descriptor pool.
//!
//! The dynamic codec path: callers that only know a type-name string at
//! runtime look the name up here and get an opaque value whose further
//! access goes back through the pool. Descriptors are erased parse and
//! encode functions registered per concrete type.

use std::collections::HashMap;
use std::sync::OnceLock;

use parking_lot::Mutex;

use nerite_core::{MarshalError, MarshalScheme};

use crate::Marshallable;

/// An opaque runtime-reflected value.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicMessage {
	pub type_name: String,
	pub scheme: MarshalScheme,
	pub value: serde_json::Value,
}

struct Descriptor {
	scheme: MarshalScheme,
	parse: fn(&[u8]) -> Result<serde_json::Value, MarshalError>,
	encode: fn(&serde_json::Value) -> Result<Vec<u8>, MarshalError>,
}

// All pool state behind one mutex; every public call is serialized.
fn pool() -> &'static Mutex<HashMap<&'static str, Descriptor>> {
	static POOL: OnceLock<Mutex<HashMap<&'static str, Descriptor>>> = OnceLock::new();
	POOL.get_or_init(|| Mutex::new(HashMap::new()))
}

fn parse_erased<T: Marshallable>(bytes: &[u8]) -> Result<serde_json::Value, MarshalError> {
	let value = T::from_bytes(bytes)?;
	serde_json::to_value(&value).map_err(|e| MarshalError::Encode(e.to_string()))
}

fn encode_erased<T: Marshallable>(value: &serde_json::Value) -> Result<Vec<u8>, MarshalError> {
	let typed: T = serde_json::from_value(value.clone())
		.map_err(|e| MarshalError::Encode(e.to_string()))?;
	typed.to_bytes()
}

/// Adds `T`'s descriptor to the pool. Idempotent.
pub fn register<T: Marshallable>() {
	pool().lock().entry(T::TYPE_NAME).or_insert(Descriptor {
		scheme: T::SCHEME,
		parse: parse_erased::<T>,
		encode: encode_erased::<T>,
	});
}

/// Whether a descriptor exists for `type_name`.
#[must_use]
pub fn is_registered(type_name: &str) -> bool {
	pool().lock().contains_key(type_name)
}

/// Parses `bytes` as the named type.
///
/// Fails with [`MarshalError::UnknownType`] when no descriptor is
/// registered under `type_name`.
pub fn parse_dynamic(type_name: &str, bytes: &[u8]) -> Result<DynamicMessage, MarshalError> {
	let guard = pool().lock();
	let descriptor = guard
		.get(type_name)
		.ok_or_else(|| MarshalError::UnknownType(type_name.to_string()))?;
	Ok(DynamicMessage {
		type_name: type_name.to_string(),
		scheme: descriptor.scheme,
		value: (descriptor.parse)(bytes)?,
	})
}

/// Serializes a dynamic message through its registered descriptor.
pub fn serialize_dynamic(message: &DynamicMessage) -> Result<Vec<u8>, MarshalError> {
	let guard = pool().lock();
	let descriptor = guard
		.get(message.type_name.as_str())
		.ok_or_else(|| MarshalError::UnknownType(message.type_name.clone()))?;
	(descriptor.encode)(&message.value)
}

#[cfg(test)]
mod tests {
	use serde::{Deserialize, Serialize};

	use super::*;

	#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
	struct Status {
		depth: f32,
		ok: bool,
	}

	impl Marshallable for Status {
		const TYPE_NAME: &'static str = "Status";
		const SCHEME: MarshalScheme = MarshalScheme::Compact;
	}

	#[test]
	fn dynamic_round_trip() {
		register::<Status>();
		let original = Status { depth: 12.5, ok: true };
		let bytes = original.to_bytes().unwrap();

		let dynamic = parse_dynamic("Status", &bytes).unwrap();
		assert_eq!(dynamic.scheme, MarshalScheme::Compact);
		assert_eq!(dynamic.value["depth"], 12.5);

		let rewired = serialize_dynamic(&dynamic).unwrap();
		assert_eq!(Status::from_bytes(&rewired).unwrap(), original);
	}

	#[test]
	fn unknown_type_is_reported() {
		assert!(matches!(
			parse_dynamic("NoSuchType", b""),
			Err(MarshalError::UnknownType(name)) if name == "NoSuchType"
		));
	}

	#[test]
	fn register_is_idempotent() {
		register::<Status>();
		register::<Status>();
		assert!(is_registered("Status"));
	}
}
