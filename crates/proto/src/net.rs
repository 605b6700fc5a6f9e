//! Stream connections over the supported carriers.

use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpStream, UnixStream};

use nerite_core::{ConfigurationError, Endpoint};

/// A connected stream over either carrier.
#[derive(Debug)]
pub enum NetStream {
	Unix(UnixStream),
	Tcp(TcpStream),
}

impl NetStream {
	/// Connects to a resolved endpoint.
	pub async fn connect(endpoint: &Endpoint) -> Result<Self, ConfigurationError> {
		let map_err = |source| ConfigurationError::Connect {
			endpoint: endpoint.to_string(),
			source,
		};
		match endpoint {
			Endpoint::Ipc(path) => Ok(Self::Unix(UnixStream::connect(path).await.map_err(map_err)?)),
			Endpoint::Tcp(addr, port) => Ok(Self::Tcp(
				TcpStream::connect((addr.as_str(), *port)).await.map_err(map_err)?,
			)),
		}
	}
}

impl AsyncRead for NetStream {
	fn poll_read(
		self: Pin<&mut Self>,
		cx: &mut Context<'_>,
		buf: &mut ReadBuf<'_>,
	) -> Poll<std::io::Result<()>> {
		match self.get_mut() {
			Self::Unix(s) => Pin::new(s).poll_read(cx, buf),
			Self::Tcp(s) => Pin::new(s).poll_read(cx, buf),
		}
	}
}

impl AsyncWrite for NetStream {
	fn poll_write(
		self: Pin<&mut Self>,
		cx: &mut Context<'_>,
		buf: &[u8],
	) -> Poll<std::io::Result<usize>> {
		match self.get_mut() {
			Self::Unix(s) => Pin::new(s).poll_write(cx, buf),
			Self::Tcp(s) => Pin::new(s).poll_write(cx, buf),
		}
	}

	fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
		match self.get_mut() {
			Self::Unix(s) => Pin::new(s).poll_flush(cx),
			Self::Tcp(s) => Pin::new(s).poll_flush(cx),
		}
	}

	fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
		match self.get_mut() {
			Self::Unix(s) => Pin::new(s).poll_shutdown(cx),
			Self::Tcp(s) => Pin::new(s).poll_shutdown(cx),
		}
	}
}
