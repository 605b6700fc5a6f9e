//! Wire framing and the manager discovery protocol.
//!
//! Stream sockets carry discrete messages via a 4-byte little-endian
//! length prefix. Inside a frame, a publication body is the routing
//! identifier, a NUL separator, and the payload; subscription control
//! bodies use a one-byte tag followed by the filter prefix.

pub mod frame;
pub mod manager;
pub mod net;

pub use frame::{
	MAX_FRAME_LEN, SubControl, encode_publication, encode_subscribe, encode_unsubscribe,
	is_disconnect, parse_sub_control, read_frame, split_publication, write_frame,
};
pub use manager::{
	ManagerRequest, ManagerResponse, SocketDescriptor, decode_manager_request,
	decode_manager_response, encode_manager_request, encode_manager_response,
};
pub use net::NetStream;
