//! The discovery endpoint.

use tokio::sync::watch;

use nerite_core::{ConfigurationError, Endpoint, RouterConfig, Transport};
use nerite_proto::{
	ManagerRequest, ManagerResponse, NetStream, SocketDescriptor, decode_manager_request,
	encode_manager_response, read_frame, write_frame,
};

use crate::listener::Listener;
use crate::router::RouterPorts;

/// Request/reply endpoint co-located with the router.
///
/// Answers [`ManagerRequest::ProvidePubSubSockets`] with the socket
/// descriptors a portal must connect to. For tcp transports it waits
/// until the router has reported its ephemeral bound ports.
pub struct Manager {
	cfg: RouterConfig,
	ports: watch::Receiver<RouterPorts>,
}

impl Manager {
	#[must_use]
	pub fn new(cfg: RouterConfig, ports: watch::Receiver<RouterPorts>) -> Self {
		Self { cfg, ports }
	}

	/// Binds the manager socket and serves requests forever.
	pub async fn run(self) -> Result<(), ConfigurationError> {
		let endpoint = self.cfg.manager_endpoint()?;
		let listener = Listener::bind(&endpoint).await?;
		tracing::info!(%endpoint, "manager listening");

		loop {
			match listener.accept().await {
				Ok(stream) => {
					tokio::spawn(serve(self.cfg.clone(), self.ports.clone(), stream));
				}
				Err(error) => {
					tracing::error!(%error, "manager accept failed");
				}
			}
		}
	}
}

async fn serve(cfg: RouterConfig, mut ports: watch::Receiver<RouterPorts>, mut stream: NetStream) {
	loop {
		let framed = match read_frame(&mut stream).await {
			Ok(framed) => framed,
			Err(_) => return,
		};
		let request = match decode_manager_request(&framed) {
			Ok(request) => request,
			Err(error) => {
				tracing::warn!(%error, "dropping malformed manager request");
				return;
			}
		};

		match request {
			ManagerRequest::ProvidePubSubSockets => {
				if cfg.transport == Transport::Tcp
					&& ports.wait_for(RouterPorts::ready).await.is_err()
				{
					return;
				}
				let response = build_response(&cfg, *ports.borrow());
				tracing::debug!(?response, "answering socket request");

				let framed = match encode_manager_response(&response) {
					Ok(framed) => framed,
					Err(error) => {
						tracing::error!(%error, "cannot encode manager response");
						return;
					}
				};
				if write_frame(&mut stream, &framed).await.is_err() {
					return;
				}
			}
		}
	}
}

/// The portal's publish socket connects to the router's subscribe
/// backend and vice versa.
fn build_response(cfg: &RouterConfig, ports: RouterPorts) -> ManagerResponse {
	match cfg.transport {
		Transport::Tcp => ManagerResponse {
			publish_socket: SocketDescriptor {
				address: None,
				..SocketDescriptor::tcp("", ports.sub_port)
			},
			subscribe_socket: SocketDescriptor {
				address: None,
				..SocketDescriptor::tcp("", ports.pub_port)
			},
		},
		// Endpoint derivation cannot fail for the transports that
		// reach here; run() already rejected the rest.
		_ => ManagerResponse {
			publish_socket: descriptor(cfg.xsub_endpoint().ok()),
			subscribe_socket: descriptor(cfg.xpub_endpoint().ok()),
		},
	}
}

fn descriptor(endpoint: Option<Endpoint>) -> SocketDescriptor {
	match endpoint {
		Some(Endpoint::Ipc(path)) => SocketDescriptor::ipc(path.display().to_string()),
		Some(Endpoint::Tcp(addr, port)) => SocketDescriptor::tcp(addr, port),
		None => SocketDescriptor::ipc(String::new()),
	}
}
