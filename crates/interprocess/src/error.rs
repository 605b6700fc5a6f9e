//! Portal error taxonomy.

use thiserror::Error;

use nerite_core::{ConfigurationError, MarshalError};

/// Errors surfaced by portal operations.
#[derive(Debug, Error)]
pub enum PortalError {
	#[error(transparent)]
	Configuration(#[from] ConfigurationError),

	#[error(transparent)]
	Marshal(#[from] MarshalError),

	#[error("invalid subscription regex: {0}")]
	Regex(#[from] regex::Error),

	/// Unsubscribing a key owned by another thread is refused.
	#[error("subscription for {key} is not owned by the calling thread")]
	SubscriptionMisuse { key: String },

	/// The reader reported an asynchronous socket failure.
	#[error("reader: {0}")]
	Reader(String),

	/// The reader thread is gone and the control channel with it.
	#[error("control channel closed")]
	ChannelClosed,

	/// Raised by any operation after shutdown has been requested.
	#[error("portal is shutting down")]
	ShutdownInProgress,
}
