//! Shared error taxonomy for the transport stack.

use std::time::Duration;

use thiserror::Error;

use crate::config::Transport;
use crate::scheme::MarshalScheme;

/// Serialization and parsing failures.
#[derive(Debug, Error)]
pub enum MarshalError {
	#[error("malformed payload: {0}")]
	Parse(String),

	#[error("cannot encode value: {0}")]
	Encode(String),

	#[error("unknown dynamic type: {0}")]
	UnknownType(String),

	#[error("scheme {0} has no codec")]
	UnsupportedScheme(MarshalScheme),
}

/// Startup and socket configuration failures. Fatal to the component
/// that raises them.
#[derive(Debug, Error)]
pub enum ConfigurationError {
	#[error("transport {0:?} is not available on stream sockets")]
	UnsupportedTransport(Transport),

	#[error("manager did not reply within {0:?}")]
	ManagerTimeout(Duration),

	#[error("manager handshake failed: {0}")]
	Handshake(String),

	#[error("cannot bind {endpoint}: {source}")]
	Bind {
		endpoint: String,
		source: std::io::Error,
	},

	#[error("cannot connect to {endpoint}: {source}")]
	Connect {
		endpoint: String,
		source: std::io::Error,
	},
}
