//! Serialization registry.
//!
//! For any (user type, scheme) pair the system understands, this crate
//! provides serialize, parse, and the canonical type name. The static
//! path is the [`Marshallable`] trait, resolved at the call site; the
//! dynamic path goes through the process-wide [`pool`] of runtime
//! descriptors and dispatches on a type-name string.
//!
//! Contract: `parse(serialize(v)) == v` for every supported pair.

pub mod pool;

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use nerite_core::{
	ForwardedPublication, Group, MarshalError, MarshalScheme, SubscriptionAction, TypedSubscription,
};

/// A type the registry can carry across process boundaries.
///
/// The associated scheme is the type's default wire family, selected by
/// its capabilities: schema-described types are `Structured`, types
/// additionally marked for compact encoding set `Compact`. Types using
/// the built-in families only declare the canonical name:
///
/// ```
/// use nerite_marshal::Marshallable;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Sample {
/// 	a: i32,
/// }
///
/// impl Marshallable for Sample {
/// 	const TYPE_NAME: &'static str = "Sample";
/// }
/// ```
pub trait Marshallable: Serialize + DeserializeOwned + Send + Sync + 'static {
	/// Canonical identifier of this type, stable across processes.
	const TYPE_NAME: &'static str;

	/// Default wire family.
	const SCHEME: MarshalScheme = MarshalScheme::Structured;

	/// Serializes the value under [`Self::SCHEME`].
	fn to_bytes(&self) -> Result<Vec<u8>, MarshalError> {
		match Self::SCHEME {
			MarshalScheme::Structured => {
				serde_json::to_vec(self).map_err(|e| MarshalError::Encode(e.to_string()))
			}
			MarshalScheme::Compact => {
				postcard::to_allocvec(self).map_err(|e| MarshalError::Encode(e.to_string()))
			}
			other => Err(MarshalError::UnsupportedScheme(other)),
		}
	}

	/// Parses a value serialized under [`Self::SCHEME`].
	fn from_bytes(bytes: &[u8]) -> Result<Self, MarshalError> {
		match Self::SCHEME {
			MarshalScheme::Structured => {
				serde_json::from_slice(bytes).map_err(|e| MarshalError::Parse(e.to_string()))
			}
			MarshalScheme::Compact => {
				postcard::from_bytes(bytes).map_err(|e| MarshalError::Parse(e.to_string()))
			}
			other => Err(MarshalError::UnsupportedScheme(other)),
		}
	}
}

/// NUL-terminated byte strings.
impl Marshallable for String {
	const TYPE_NAME: &'static str = "CSTR";
	const SCHEME: MarshalScheme = MarshalScheme::CStr;

	fn to_bytes(&self) -> Result<Vec<u8>, MarshalError> {
		let mut bytes = self.as_bytes().to_vec();
		bytes.push(0);
		Ok(bytes)
	}

	fn from_bytes(bytes: &[u8]) -> Result<Self, MarshalError> {
		let body = bytes.strip_suffix(&[0]).unwrap_or(bytes);
		Self::from_utf8(body.to_vec()).map_err(|e| MarshalError::Parse(e.to_string()))
	}
}

/// Raw byte payloads, carried verbatim.
impl Marshallable for Vec<u8> {
	const TYPE_NAME: &'static str = "BYTES";
	const SCHEME: MarshalScheme = MarshalScheme::CStr;

	fn to_bytes(&self) -> Result<Vec<u8>, MarshalError> {
		Ok(self.clone())
	}

	fn from_bytes(bytes: &[u8]) -> Result<Self, MarshalError> {
		Ok(bytes.to_vec())
	}
}

/// The default scheme tag for `T`.
#[must_use]
pub fn scheme_of<T: Marshallable>() -> MarshalScheme {
	T::SCHEME
}

/// The canonical type name for `T`.
#[must_use]
pub fn type_name_of<T: Marshallable>() -> &'static str {
	T::TYPE_NAME
}

/// Builds a typed subscription record whose dispatch closure parses
/// under `T`'s scheme and hands the value to `handler`.
///
/// Payloads that fail to parse are logged and dropped; malformed peer
/// data must never propagate past the dispatch boundary.
pub fn typed_subscription<T, F>(group: Group, action: SubscriptionAction, handler: F) -> TypedSubscription
where
	T: Marshallable,
	F: Fn(Arc<T>) + Send + Sync + 'static,
{
	let dispatch: Arc<dyn Fn(&[u8]) + Send + Sync> =
		Arc::new(move |bytes| match T::from_bytes(bytes) {
			Ok(value) => handler(Arc::new(value)),
			Err(error) => {
				tracing::warn!(%error, type_name = T::TYPE_NAME, "dropping undecodable payload");
			}
		});
	TypedSubscription::new(group, T::SCHEME, T::TYPE_NAME, action, dispatch)
}

/// Serializes `value` into a forwarding record for the inner
/// `FORWARD_GROUP` channel.
pub fn forwarded_publication<T: Marshallable>(
	value: &T,
	group: &Group,
) -> Result<ForwardedPublication, MarshalError> {
	Ok(ForwardedPublication {
		scheme: T::SCHEME,
		type_name: T::TYPE_NAME.to_string(),
		group: group.clone(),
		bytes: value.to_bytes()?,
	})
}
