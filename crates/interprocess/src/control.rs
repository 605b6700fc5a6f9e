//! The in-process control channel between portal and reader.

use nerite_proto::SocketDescriptor;

/// One control frame.
///
/// Each direction has a single producer: the portal main side sends
/// `Publish`, `Subscribe`, `Unsubscribe`, and `Shutdown`; the reader
/// sends `PubConfiguration`, `Receive`, and `Error`.
#[derive(Debug)]
pub enum ControlMsg {
	/// The manager handshake completed; publish credentials are
	/// available and the sockets are connected.
	PubConfiguration {
		publish: SocketDescriptor,
		subscribe: SocketDescriptor,
	},
	/// Apply a byte-prefix filter on the subscribe socket.
	Subscribe { filter: Vec<u8> },
	/// Release a byte-prefix filter on the subscribe socket.
	Unsubscribe { filter: Vec<u8> },
	/// Transmit a framed publication on the publish socket.
	Publish { frame: Vec<u8> },
	/// A publication frame arrived on the subscribe socket.
	Receive { frame: Vec<u8> },
	/// An asynchronous socket failure.
	Error { message: String },
	/// Close the sockets and end the reader thread.
	Shutdown,
}
