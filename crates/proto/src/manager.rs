//! Manager request/reply protocol.
//!
//! Bodies are framed with a 5-byte header: four bytes carrying the
//! marshalling-scheme sentinel big-endian, then a NUL, then the
//! postcard-encoded message.

use std::io::{Error as IoError, ErrorKind};

use serde::{Deserialize, Serialize};

use nerite_core::{ConfigurationError, Endpoint, MarshalScheme, Transport};

/// Scheme sentinel stamped on every manager frame.
pub const SCHEME_SENTINEL: i32 = MarshalScheme::Compact.tag() as i32;

const HEADER_LEN: usize = 5;

/// A request to the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManagerRequest {
	/// Ask for the pub/sub connection parameters of the local router.
	ProvidePubSubSockets,
}

/// Connection parameters for one socket a portal must open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketDescriptor {
	pub transport: Transport,
	/// ipc socket path.
	pub socket_name: Option<String>,
	/// tcp host.
	pub address: Option<String>,
	/// tcp port.
	pub port: Option<u16>,
	/// pgm/epgm multicast group, for peers that speak those carriers.
	pub multicast_address: Option<String>,
}

impl SocketDescriptor {
	/// Descriptor for a Unix domain socket.
	#[must_use]
	pub fn ipc(path: impl Into<String>) -> Self {
		Self {
			transport: Transport::Ipc,
			socket_name: Some(path.into()),
			address: None,
			port: None,
			multicast_address: None,
		}
	}

	/// Descriptor for a TCP endpoint.
	#[must_use]
	pub fn tcp(address: impl Into<String>, port: u16) -> Self {
		Self {
			transport: Transport::Tcp,
			socket_name: None,
			address: Some(address.into()),
			port: Some(port),
			multicast_address: None,
		}
	}

	/// Resolves the descriptor to a connectable endpoint.
	pub fn endpoint(&self) -> Result<Endpoint, ConfigurationError> {
		match self.transport {
			Transport::Ipc => Ok(Endpoint::Ipc(
				self.socket_name.clone().unwrap_or_default().into(),
			)),
			Transport::Tcp => Ok(Endpoint::Tcp(
				self.address.clone().unwrap_or_else(|| "127.0.0.1".to_string()),
				self.port.unwrap_or(0),
			)),
			other => Err(ConfigurationError::UnsupportedTransport(other)),
		}
	}
}

/// The manager's reply: where to publish and where to subscribe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerResponse {
	pub publish_socket: SocketDescriptor,
	pub subscribe_socket: SocketDescriptor,
}

fn encode_body<T: Serialize>(message: &T) -> std::io::Result<Vec<u8>> {
	let body =
		postcard::to_allocvec(message).map_err(|e| IoError::new(ErrorKind::InvalidData, e))?;
	let mut framed = Vec::with_capacity(HEADER_LEN + body.len());
	framed.extend_from_slice(&SCHEME_SENTINEL.to_be_bytes());
	framed.push(0);
	framed.extend_from_slice(&body);
	Ok(framed)
}

fn decode_body<T: for<'de> Deserialize<'de>>(framed: &[u8]) -> std::io::Result<T> {
	if framed.len() < HEADER_LEN {
		return Err(IoError::new(ErrorKind::InvalidData, "manager frame too short"));
	}
	let sentinel = i32::from_be_bytes([framed[0], framed[1], framed[2], framed[3]]);
	if sentinel != SCHEME_SENTINEL || framed[4] != 0 {
		return Err(IoError::new(
			ErrorKind::InvalidData,
			format!("bad manager header: sentinel {sentinel}"),
		));
	}
	postcard::from_bytes(&framed[HEADER_LEN..]).map_err(|e| IoError::new(ErrorKind::InvalidData, e))
}

/// Encodes a manager request with its 5-byte header.
pub fn encode_manager_request(request: &ManagerRequest) -> std::io::Result<Vec<u8>> {
	encode_body(request)
}

/// Decodes a manager request, validating the header.
pub fn decode_manager_request(framed: &[u8]) -> std::io::Result<ManagerRequest> {
	decode_body(framed)
}

/// Encodes a manager response with its 5-byte header.
pub fn encode_manager_response(response: &ManagerResponse) -> std::io::Result<Vec<u8>> {
	encode_body(response)
}

/// Decodes a manager response, validating the header.
pub fn decode_manager_response(framed: &[u8]) -> std::io::Result<ManagerResponse> {
	decode_body(framed)
}
