//! Bound listeners over the supported carriers.

use tokio::net::{TcpListener, UnixListener};

use nerite_core::{ConfigurationError, Endpoint};
use nerite_proto::NetStream;

pub(crate) enum Listener {
	Unix(UnixListener),
	Tcp(TcpListener),
}

impl Listener {
	/// Binds an endpoint, unlinking a stale socket file first.
	pub(crate) async fn bind(endpoint: &Endpoint) -> Result<Self, ConfigurationError> {
		let map_err = |source| ConfigurationError::Bind {
			endpoint: endpoint.to_string(),
			source,
		};
		match endpoint {
			Endpoint::Ipc(path) => {
				if path.exists() {
					let _ = std::fs::remove_file(path);
				}
				Ok(Self::Unix(UnixListener::bind(path).map_err(map_err)?))
			}
			Endpoint::Tcp(addr, port) => Ok(Self::Tcp(
				TcpListener::bind((addr.as_str(), *port)).await.map_err(map_err)?,
			)),
		}
	}

	pub(crate) async fn accept(&self) -> std::io::Result<NetStream> {
		match self {
			Self::Unix(listener) => Ok(NetStream::Unix(listener.accept().await?.0)),
			Self::Tcp(listener) => Ok(NetStream::Tcp(listener.accept().await?.0)),
		}
	}

	/// The actually-bound port, for ephemeral tcp binds.
	pub(crate) fn local_port(&self) -> Option<u16> {
		match self {
			Self::Unix(_) => None,
			Self::Tcp(listener) => listener.local_addr().ok().map(|addr| addr.port()),
		}
	}
}
